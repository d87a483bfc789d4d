use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record store request failed: {0}")]
    Transport(String),
    #[error("record store rejected the request ({status} {code}): {message}")]
    Api { status: u16, code: String, message: String },
    #[error("record store response could not be decoded: {0}")]
    Decode(String),
    #[error("record store is misconfigured: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Human-readable reason shown to the submitting user.
    pub fn reason(&self) -> String {
        match self {
            Self::Api { message, .. } if !message.trim().is_empty() => message.clone(),
            Self::Api { status, code, .. } => format!("request rejected ({status} {code})"),
            Self::Transport(message) | Self::Decode(message) | Self::Configuration(message) => {
                message.clone()
            }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }
}
