//! Live Socket Mode transport.
//!
//! `connect` asks `apps.connections.open` for a fresh WebSocket URL using the
//! app-level token, then opens it with tokio-tungstenite. Slack sends a
//! `disconnect` frame before it recycles a connection; that frame and a closed
//! socket both surface as [`TransportError::Closed`] so the runner reconnects.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::events::SlackEnvelope;
use crate::socket::{decode_frame, SocketFrame, SocketTransport, TransportError};

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Deserialize)]
struct ConnectionsOpenResponse {
    ok: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct WebSocketTransport {
    http: Client,
    api_base_url: String,
    app_token: SecretString,
    stream: Mutex<Option<SocketStream>>,
}

impl WebSocketTransport {
    pub fn new(
        api_base_url: impl Into<String>,
        app_token: SecretString,
    ) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        Ok(Self {
            http,
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            app_token,
            stream: Mutex::new(None),
        })
    }

    async fn open_url(&self) -> Result<String, TransportError> {
        let response = self
            .http
            .post(format!("{}/apps.connections.open", self.api_base_url))
            .bearer_auth(self.app_token.expose_secret())
            .send()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?
            .json::<ConnectionsOpenResponse>()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        match response {
            ConnectionsOpenResponse { ok: true, url: Some(url), .. } => Ok(url),
            ConnectionsOpenResponse { error, .. } => Err(TransportError::Connect(format!(
                "apps.connections.open rejected: {}",
                error.unwrap_or_else(|| "missing url".to_owned())
            ))),
        }
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self.open_url().await?;
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream =
            guard.as_mut().ok_or_else(|| TransportError::Receive("not connected".to_owned()))?;

        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                None => return Err(TransportError::Closed("stream ended".to_owned())),
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    let reason = frame.map(|frame| frame.reason.to_string()).unwrap_or_default();
                    return Err(TransportError::Closed(format!("close frame {reason}")));
                }
                _ => continue,
            };

            match decode_frame(&text) {
                Ok(SocketFrame::Hello) => {
                    info!(event_name = "ingress.slack.socket_ready", "socket mode hello received");
                }
                Ok(SocketFrame::Disconnect { reason }) => {
                    info!(
                        event_name = "ingress.slack.socket_disconnect",
                        reason = %reason,
                        "slack requested reconnect"
                    );
                    return Err(TransportError::Closed(reason));
                }
                Ok(SocketFrame::Envelope(envelope)) => return Ok(Some(envelope)),
                Err(error) => {
                    warn!(
                        event_name = "ingress.slack.frame_rejected",
                        error = %error,
                        "skipping undecodable socket mode frame"
                    );
                }
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        let stream =
            guard.as_mut().ok_or_else(|| TransportError::Acknowledge("not connected".to_owned()))?;
        let ack = json!({ "envelope_id": envelope_id }).to_string();
        stream
            .send(Message::Text(ack))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        debug!(event_name = "ingress.slack.socket_closing", "closing socket mode connection");
        stream.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}
