use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use intake_core::{transition, IntakeEvent, IntakeState, IntakeTransitionError, SubmittingUser};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    commands::{CommandRouteError, FormCommandService, SlashCommandPayload},
    submission::{submission_values, SubmissionHandler},
};

#[derive(Clone, Debug, PartialEq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    ViewSubmission(ViewSubmissionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::ViewSubmission(_) => SlackEventType::ViewSubmission,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    ViewSubmission,
    Unsupported,
}

/// A submitted modal. `state_values` is the raw `view.state.values` object.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewSubmissionEvent {
    pub view_id: String,
    pub callback_id: String,
    pub user_id: String,
    pub user_name: String,
    pub state_values: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Completed(IntakeState),
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Route(#[from] CommandRouteError),
    #[error(transparent)]
    Transition(#[from] IntakeTransitionError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            debug!(
                event_name = "ingress.slack.event_ignored",
                correlation_id = %ctx.correlation_id,
                event_type = ?envelope.event.event_type(),
                "no handler registered for slack event"
            );
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher wired with the slash command and modal submission handlers.
pub fn intake_dispatcher(
    commands: FormCommandService,
    submissions: SubmissionHandler,
) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(commands));
    dispatcher.register(ViewSubmissionHandler::new(submissions));
    dispatcher
}

pub struct SlashCommandHandler {
    service: FormCommandService,
}

impl SlashCommandHandler {
    pub fn new(service: FormCommandService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for SlashCommandHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let state = self.service.route(payload, ctx).await?;
        Ok(HandlerResult::Completed(state))
    }
}

pub struct ViewSubmissionHandler {
    handler: SubmissionHandler,
}

impl ViewSubmissionHandler {
    pub fn new(handler: SubmissionHandler) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl EventHandler for ViewSubmissionHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ViewSubmission
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ViewSubmission(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let definition = self.handler.definition();
        if event.callback_id != definition.callback_id {
            debug!(
                event_name = "ingress.slack.view_ignored",
                correlation_id = %ctx.correlation_id,
                callback_id = %event.callback_id,
                "view submission for another modal"
            );
            return Ok(HandlerResult::Ignored);
        }

        let submitted = transition(IntakeState::FormOpen, IntakeEvent::FormSubmitted)?;
        let values = submission_values(definition, &event.state_values);
        let user =
            SubmittingUser { id: event.user_id.clone(), display_name: event.user_name.clone() };

        info!(
            event_name = "intake.form.submitted",
            correlation_id = %ctx.correlation_id,
            user_id = %user.id,
            view_id = %event.view_id,
            fields = values.len(),
            "request form submitted"
        );

        let outcome = self.handler.on_submit(&values, &user, ctx).await;
        let state = transition(submitted, outcome.event())?;
        Ok(HandlerResult::Completed(state))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use intake_core::{
        CollectionSchema, CreatedRecord, FormBuilder, FormDefinition, IntakeState, RecordDraft,
        RecordMapping, RecordStore, StoreError,
    };
    use serde_json::json;

    use super::{
        intake_dispatcher, EventContext, EventDispatcher, HandlerResult, SlackEnvelope, SlackEvent,
        ViewSubmissionEvent,
    };
    use crate::commands::test_support::RecordingWebApi;
    use crate::commands::{FormCommandService, SlashCommandPayload};
    use crate::submission::SubmissionHandler;

    #[derive(Default)]
    struct CountingStore {
        creates: AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for CountingStore {
        async fn fetch_schema(&self) -> Result<CollectionSchema, StoreError> {
            Err(StoreError::Transport("offline".to_owned()))
        }

        async fn create_record(&self, _draft: &RecordDraft) -> Result<CreatedRecord, StoreError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(CreatedRecord { id: "page-1".to_owned(), url: None })
        }
    }

    fn dispatcher(store: Arc<CountingStore>, web: Arc<RecordingWebApi>) -> EventDispatcher {
        let definition = FormDefinition::ticket_request("ticket_modal_submit", "New Internal Request");
        intake_dispatcher(
            FormCommandService::new(
                "/hubspot-ticket",
                definition.clone(),
                FormBuilder::new(store.clone()),
                web.clone(),
            ),
            SubmissionHandler::new(store, web, definition, RecordMapping::default()),
        )
    }

    fn submission(callback_id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "env-2".to_owned(),
            event: SlackEvent::ViewSubmission(ViewSubmissionEvent {
                view_id: "V1".to_owned(),
                callback_id: callback_id.to_owned(),
                user_id: "U123".to_owned(),
                user_name: "dana".to_owned(),
                state_values: json!({
                    "type_block": { "type_select": { "selected_option": { "value": "Bug" } } },
                    "title_block": { "title_input": { "value": "Login broken" } }
                }),
            }),
        }
    }

    #[tokio::test]
    async fn dispatcher_routes_slash_commands_to_form_opening() {
        let web = Arc::new(RecordingWebApi::default());
        let dispatcher = dispatcher(Arc::new(CountingStore::default()), web.clone());
        let envelope = SlackEnvelope {
            envelope_id: "env-1".to_owned(),
            event: SlackEvent::SlashCommand(SlashCommandPayload {
                command: "/hubspot-ticket".to_owned(),
                text: String::new(),
                channel_id: "C1".to_owned(),
                user_id: "U123".to_owned(),
                user_name: "dana".to_owned(),
                trigger_id: "trigger-1".to_owned(),
            }),
        };

        let result = dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Completed(IntakeState::FormOpen));
        assert_eq!(web.views.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn dispatcher_routes_matching_view_submission_to_record_creation() {
        let store = Arc::new(CountingStore::default());
        let web = Arc::new(RecordingWebApi::default());
        let dispatcher = dispatcher(store.clone(), web.clone());

        let result = dispatcher
            .dispatch(&submission("ticket_modal_submit"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Completed(IntakeState::Created));
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(web.messages.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn view_submission_for_other_callback_is_ignored() {
        let store = Arc::new(CountingStore::default());
        let dispatcher = dispatcher(store.clone(), Arc::new(RecordingWebApi::default()));

        let result = dispatcher
            .dispatch(&submission("some_other_modal"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();
        let envelope = SlackEnvelope {
            envelope_id: "env-3".to_owned(),
            event: SlackEvent::Unsupported { event_type: "events_api".to_owned() },
        };

        let result = dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);
        assert_eq!(dispatcher.handler_count(), 0);
    }

    #[test]
    fn intake_dispatcher_registers_both_handlers() {
        let dispatcher =
            dispatcher(Arc::new(CountingStore::default()), Arc::new(RecordingWebApi::default()));
        assert_eq!(dispatcher.handler_count(), 2);
    }
}
