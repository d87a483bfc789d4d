use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::commands::SlashCommandPayload;
use crate::events::{
    EventContext, EventDispatcher, SlackEnvelope, SlackEvent, ViewSubmissionEvent,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
    #[error("connection closed by slack: {0}")]
    Closed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        if attempt >= self.max_retries {
            return Duration::from_millis(self.max_delay_ms);
        }
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` ends the runner; a dropped or refreshed connection should
    /// surface as an error so the runner reconnects.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

struct PumpFailure {
    error: TransportError,
    connected: bool,
}

/// Reads envelopes off one Socket Mode connection at a time. Each envelope is
/// acknowledged inline and then dispatched on its own task, so a slow handler
/// never holds back the acknowledgement of the next envelope.
pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_policy: ReconnectPolicy,
    connected: watch::Sender<bool>,
    in_flight: Mutex<JoinSet<()>>,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self {
            transport,
            dispatcher: Arc::new(dispatcher),
            reconnect_policy,
            connected: watch::Sender::new(false),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    /// `true` while a Socket Mode connection is open.
    pub fn connection(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Runs until the transport reports end of stream. Connection failures are
    /// never fatal: once `max_retries` consecutive attempts have failed the
    /// runner keeps retrying at `max_delay_ms`. The attempt counter resets after
    /// every connection that succeeded.
    pub async fn start(&self) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = self.connect_and_pump(attempt).await;
            self.connected.send_replace(false);
            let Err(failure) = outcome else {
                return Ok(());
            };
            if failure.connected {
                attempt = 0;
            }

            if attempt < self.reconnect_policy.max_retries {
                warn!(
                    event_name = "ingress.slack.connection_lost",
                    attempt,
                    max_retries = self.reconnect_policy.max_retries,
                    error = %failure.error,
                    "socket mode transport failed"
                );
            } else {
                error!(
                    event_name = "ingress.slack.retries_exhausted",
                    attempt,
                    max_retries = self.reconnect_policy.max_retries,
                    retry_delay_ms = self.reconnect_policy.max_delay_ms,
                    error = %failure.error,
                    "socket mode still unreachable; retrying at max delay"
                );
            }

            let delay = self.reconnect_policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt = attempt.saturating_add(1);
        }
    }

    /// Closes the live connection, if any, then waits for in-flight handlers.
    /// Used after `start` is cancelled; callers bound it with a timeout.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let disconnected = self.transport.disconnect().await;
        self.connected.send_replace(false);

        let mut in_flight = self.in_flight.lock().await;
        while let Some(joined) = in_flight.join_next().await {
            log_join_failure(joined);
        }

        disconnected
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), PumpFailure> {
        info!(attempt, "opening socket mode transport connection");
        self.transport
            .connect()
            .await
            .map_err(|error| PumpFailure { error, connected: false })?;
        self.connected.send_replace(true);
        info!(attempt, "socket mode transport connected");

        loop {
            let next = self
                .transport
                .next_envelope()
                .await
                .map_err(|error| PumpFailure { error, connected: true })?;
            let Some(envelope) = next else {
                info!(attempt, "socket mode transport stream closed");
                self.transport
                    .disconnect()
                    .await
                    .map_err(|error| PumpFailure { error, connected: true })?;
                return Ok(());
            };
            self.handle_envelope(envelope).await;
        }
    }

    async fn handle_envelope(&self, envelope: SlackEnvelope) {
        let (user_id, callback_id) = correlation_fields(&envelope);

        info!(
            event_name = "ingress.slack.envelope_received",
            envelope_id = %envelope.envelope_id,
            event_type = ?envelope.event.event_type(),
            correlation_id = %envelope.envelope_id,
            user_id = user_id.unwrap_or("unknown"),
            callback_id = callback_id.unwrap_or("none"),
            "received slack envelope"
        );

        if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
            warn!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                error = %error,
                "failed to acknowledge slack envelope"
            );
        } else {
            debug!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                "acknowledged slack envelope"
            );
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let mut in_flight = self.in_flight.lock().await;
        while let Some(joined) = in_flight.try_join_next() {
            log_join_failure(joined);
        }
        in_flight.spawn(async move { dispatch_envelope(&dispatcher, &envelope).await });
    }
}

async fn dispatch_envelope(dispatcher: &EventDispatcher, envelope: &SlackEnvelope) {
    let context = EventContext { correlation_id: envelope.envelope_id.clone() };
    if let Err(error) = dispatcher.dispatch(envelope, &context).await {
        let (user_id, _) = correlation_fields(envelope);
        warn!(
            envelope_id = %envelope.envelope_id,
            correlation_id = %envelope.envelope_id,
            user_id = user_id.unwrap_or("unknown"),
            error = %error,
            "event dispatch failed"
        );
    }
}

fn log_join_failure(joined: Result<(), JoinError>) {
    if let Err(error) = joined {
        error!(
            event_name = "ingress.slack.handler_aborted",
            error = %error,
            "slack event handler task did not complete"
        );
    }
}

fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        SlackEvent::SlashCommand(payload) => (Some(payload.user_id.as_str()), None),
        SlackEvent::ViewSubmission(event) => {
            (Some(event.user_id.as_str()), Some(event.callback_id.as_str()))
        }
        SlackEvent::Unsupported { .. } => (None, None),
    }
}

/// One text frame received over a Socket Mode connection.
#[derive(Clone, Debug, PartialEq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is not valid json: {0}")]
    Json(String),
    #[error("`{0}` frame has no envelope id")]
    MissingEnvelopeId(String),
    #[error("`{kind}` payload is malformed: {reason}")]
    Payload { kind: String, reason: String },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct RawSlashCommand {
    command: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    channel_id: String,
    user_id: String,
    #[serde(default)]
    user_name: String,
    #[serde(default)]
    trigger_id: String,
}

#[derive(Deserialize)]
struct RawInteraction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    user: RawUser,
    #[serde(default)]
    view: Option<RawView>,
}

#[derive(Default, Deserialize)]
struct RawUser {
    #[serde(default)]
    id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawView {
    #[serde(default)]
    id: String,
    #[serde(default)]
    callback_id: String,
    #[serde(default)]
    state: RawViewState,
}

#[derive(Default, Deserialize)]
struct RawViewState {
    #[serde(default)]
    values: Value,
}

pub fn decode_frame(text: &str) -> Result<SocketFrame, FrameError> {
    let frame: RawFrame =
        serde_json::from_str(text).map_err(|error| FrameError::Json(error.to_string()))?;

    match frame.kind.as_str() {
        "hello" => return Ok(SocketFrame::Hello),
        "disconnect" => {
            return Ok(SocketFrame::Disconnect {
                reason: frame.reason.unwrap_or_else(|| "unspecified".to_owned()),
            })
        }
        _ => {}
    }

    let envelope_id = frame
        .envelope_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| FrameError::MissingEnvelopeId(frame.kind.clone()))?;
    let payload_error = |kind: &str, error: serde_json::Error| FrameError::Payload {
        kind: kind.to_owned(),
        reason: error.to_string(),
    };

    let event = match frame.kind.as_str() {
        "slash_commands" => {
            let raw: RawSlashCommand = serde_json::from_value(frame.payload)
                .map_err(|error| payload_error("slash_commands", error))?;
            SlackEvent::SlashCommand(SlashCommandPayload {
                command: raw.command,
                text: raw.text,
                channel_id: raw.channel_id,
                user_id: raw.user_id,
                user_name: raw.user_name,
                trigger_id: raw.trigger_id,
            })
        }
        "interactive" => {
            let raw: RawInteraction = serde_json::from_value(frame.payload)
                .map_err(|error| payload_error("interactive", error))?;
            match (raw.kind.as_str(), raw.view) {
                ("view_submission", Some(view)) => SlackEvent::ViewSubmission(ViewSubmissionEvent {
                    view_id: view.id,
                    callback_id: view.callback_id,
                    user_name: raw.user.username.or(raw.user.name).unwrap_or_default(),
                    user_id: raw.user.id,
                    state_values: view.state.values,
                }),
                _ => SlackEvent::Unsupported { event_type: format!("interactive:{}", raw.kind) },
            }
        }
        other => SlackEvent::Unsupported { event_type: other.to_owned() },
    };

    Ok(SocketFrame::Envelope(SlackEnvelope { envelope_id, event }))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::{
        decode_frame, FrameError, ReconnectPolicy, SocketFrame, SocketModeRunner, SocketTransport,
        TransportError,
    };
    use crate::events::{
        EventContext, EventDispatcher, EventHandler, EventHandlerError, HandlerResult,
        SlackEnvelope, SlackEvent, SlackEventType,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::{Mutex, Semaphore};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            Ok(())
        }
    }

    fn unsupported(envelope_id: &str) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(Some(SlackEnvelope {
            envelope_id: envelope_id.to_owned(),
            event: SlackEvent::Unsupported { event_type: "events_api".to_owned() },
        }))
    }

    fn runner(transport: Arc<ScriptedTransport>, max_retries: u32) -> SocketModeRunner {
        SocketModeRunner::new(
            transport,
            EventDispatcher::default(),
            ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 },
        )
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![unsupported("env-1"), Ok(None)],
        ));

        runner(transport.clone(), 2).start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn keeps_reconnecting_after_retry_budget_is_spent() {
        let failures = (1..=6)
            .map(|n| Err(TransportError::Connect(format!("fail-{n}"))))
            .collect::<Vec<_>>();
        let transport =
            Arc::new(ScriptedTransport::with_script(failures, vec![unsupported("env-1"), Ok(None)]));

        let runner = runner(transport.clone(), 2);
        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 7);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
        assert!(!*runner.connection().borrow());
    }

    #[test]
    fn backoff_caps_at_max_delay_once_retries_are_spent() {
        let policy = ReconnectPolicy { max_retries: 3, base_delay_ms: 100, max_delay_ms: 5_000 };

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(5_000));
        assert_eq!(policy.backoff(40), Duration::from_millis(5_000));
    }

    /// Holds every dispatch until the test releases permits.
    struct GatedHandler {
        gate: Arc<Semaphore>,
        completed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for GatedHandler {
        fn event_type(&self) -> SlackEventType {
            SlackEventType::Unsupported
        }

        async fn handle(
            &self,
            _envelope: &SlackEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            let _permit = self.gate.acquire().await.expect("gate stays open");
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerResult::Ignored)
        }
    }

    #[tokio::test]
    async fn slow_handlers_do_not_delay_later_acknowledgements() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![],
            vec![unsupported("env-1"), unsupported("env-2"), Ok(None)],
        ));
        let gate = Arc::new(Semaphore::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(GatedHandler { gate: gate.clone(), completed: completed.clone() });
        let runner = SocketModeRunner::new(
            transport.clone(),
            dispatcher,
            ReconnectPolicy { max_retries: 1, base_delay_ms: 0, max_delay_ms: 0 },
        );

        tokio::time::timeout(Duration::from_secs(1), runner.start())
            .await
            .expect("pump must not wait for handlers")
            .expect("runner should not fail");

        assert_eq!(transport.acknowledgements().await, vec!["env-1", "env-2"]);
        assert_eq!(completed.load(Ordering::SeqCst), 0);

        gate.add_permits(2);
        runner.shutdown().await.expect("shutdown");

        assert_eq!(completed.load(Ordering::SeqCst), 2);
        assert_eq!(transport.disconnect_calls().await, 2);
    }

    #[tokio::test]
    async fn refreshed_connections_do_not_consume_retry_budget() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![],
            vec![
                unsupported("env-1"),
                Err(TransportError::Closed("refresh_requested".to_owned())),
                unsupported("env-2"),
                Err(TransportError::Closed("refresh_requested".to_owned())),
                unsupported("env-3"),
                Err(TransportError::Closed("refresh_requested".to_owned())),
                Ok(None),
            ],
        ));

        runner(transport.clone(), 1).start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 4);
        assert_eq!(transport.acknowledgements().await, vec!["env-1", "env-2", "env-3"]);
    }

    #[test]
    fn decodes_control_frames() {
        assert_eq!(decode_frame(r#"{"type":"hello","num_connections":1}"#), Ok(SocketFrame::Hello));
        assert_eq!(
            decode_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#),
            Ok(SocketFrame::Disconnect { reason: "refresh_requested".to_owned() })
        );
    }

    #[test]
    fn decodes_slash_command_envelope() {
        let frame = json!({
            "envelope_id": "env-1",
            "type": "slash_commands",
            "accepts_response_payload": true,
            "payload": {
                "command": "/hubspot-ticket",
                "text": "",
                "channel_id": "C1",
                "user_id": "U123",
                "user_name": "dana",
                "trigger_id": "trigger-1"
            }
        });

        let Ok(SocketFrame::Envelope(envelope)) = decode_frame(&frame.to_string()) else {
            panic!("expected envelope");
        };
        assert_eq!(envelope.envelope_id, "env-1");
        let SlackEvent::SlashCommand(payload) = envelope.event else {
            panic!("expected slash command");
        };
        assert_eq!(payload.trigger_id, "trigger-1");
        assert_eq!(payload.user_name, "dana");
    }

    #[test]
    fn decodes_view_submission_with_state_values() {
        let frame = json!({
            "envelope_id": "env-2",
            "type": "interactive",
            "payload": {
                "type": "view_submission",
                "user": { "id": "U123", "username": "dana", "name": "dana" },
                "view": {
                    "id": "V1",
                    "callback_id": "ticket_modal_submit",
                    "state": { "values": {
                        "type_block": { "type_select": { "selected_option": { "value": "Bug" } } }
                    } }
                }
            }
        });

        let Ok(SocketFrame::Envelope(envelope)) = decode_frame(&frame.to_string()) else {
            panic!("expected envelope");
        };
        let SlackEvent::ViewSubmission(event) = envelope.event else {
            panic!("expected view submission");
        };
        assert_eq!(event.callback_id, "ticket_modal_submit");
        assert_eq!(event.user_id, "U123");
        assert_eq!(event.state_values["type_block"]["type_select"]["selected_option"]["value"], "Bug");
    }

    #[test]
    fn other_envelopes_are_unsupported_and_malformed_frames_are_rejected() {
        let block_action = json!({
            "envelope_id": "env-3",
            "type": "interactive",
            "payload": { "type": "block_actions", "user": { "id": "U1" } }
        });
        assert!(matches!(
            decode_frame(&block_action.to_string()),
            Ok(SocketFrame::Envelope(SlackEnvelope {
                event: SlackEvent::Unsupported { ref event_type },
                ..
            })) if event_type == "interactive:block_actions"
        ));

        assert!(matches!(decode_frame("not json"), Err(FrameError::Json(_))));
        assert_eq!(
            decode_frame(r#"{"type":"events_api","payload":{}}"#),
            Err(FrameError::MissingEnvelopeId("events_api".to_owned()))
        );
    }
}
