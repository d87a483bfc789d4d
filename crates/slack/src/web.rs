use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::blocks::{MessageTemplate, ModalView};

const WEB_API_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack web api unreachable: {0}")]
    Transport(String),
    #[error("slack web api `{method}` returned `{code}`")]
    Api { method: &'static str, code: String },
    #[error("slack web api response could not be decoded: {0}")]
    Decode(String),
}

/// The two Web API calls the intake flow makes.
#[async_trait]
pub trait SlackWebApi: Send + Sync {
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError>;
    async fn post_message(
        &self,
        channel: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    blocks: &'a [crate::blocks::Block],
}

pub struct SlackWebClient {
    client: Client,
    api_base_url: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(
        api_base_url: impl Into<String>,
        bot_token: SecretString,
    ) -> Result<Self, SlackApiError> {
        let client = Client::builder()
            .timeout(WEB_API_TIMEOUT)
            .build()
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;
        let api_base_url = api_base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { client, api_base_url, bot_token })
    }

    async fn call<B>(&self, method: &'static str, body: &B) -> Result<(), SlackApiError>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(format!("{}/{method}", self.api_base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;

        let status = response.status();
        let payload = response
            .json::<ApiResponse>()
            .await
            .map_err(|error| SlackApiError::Decode(format!("{method} ({status}): {error}")))?;

        if payload.ok {
            debug!(event_name = "egress.slack.web_api_ok", method, "slack web api call succeeded");
            return Ok(());
        }

        let code = payload.error.unwrap_or_else(|| "unknown_error".to_owned());
        warn!(
            event_name = "egress.slack.web_api_error",
            method,
            status = status.as_u16(),
            code = %code,
            "slack web api call rejected"
        );
        Err(SlackApiError::Api { method, code })
    }
}

#[async_trait]
impl SlackWebApi for SlackWebClient {
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError> {
        self.call("views.open", &json!({ "trigger_id": trigger_id, "view": view })).await
    }

    async fn post_message(
        &self,
        channel: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        let request = PostMessageRequest {
            channel,
            text: &message.fallback_text,
            blocks: &message.blocks,
        };
        self.call("chat.postMessage", &request).await
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{SlackApiError, SlackWebApi, SlackWebClient};
    use crate::blocks::confirmation_message;

    fn client(server: &MockServer) -> SlackWebClient {
        SlackWebClient::new(server.uri(), SecretString::from("xoxb-test".to_owned()))
            .expect("client")
    }

    #[tokio::test]
    async fn post_message_sends_fallback_text_and_blocks_with_bot_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_partial_json(json!({
                "channel": "U123",
                "text": "Your *Bug* request \"Login broken\" has been added to the Notion database."
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .post_message("U123", &confirmation_message("Bug", "Login broken"))
            .await
            .expect("message posted");
    }

    #[tokio::test]
    async fn ok_false_maps_to_api_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/views.open"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "expired_trigger_id" })),
            )
            .mount(&server)
            .await;

        let view = crate::blocks::ModalView {
            kind: "modal",
            callback_id: "ticket_modal_submit".to_owned(),
            title: crate::blocks::TextObject::plain("New Internal Request"),
            submit: crate::blocks::TextObject::plain("Submit"),
            close: crate::blocks::TextObject::plain("Cancel"),
            blocks: Vec::new(),
        };
        let error = client(&server).open_view("trigger-1", &view).await.expect_err("rejected");

        assert_eq!(
            error,
            SlackApiError::Api { method: "views.open", code: "expired_trigger_id".to_owned() }
        );
    }
}
