use std::sync::Arc;

use intake_core::{
    transition, FormBuilder, FormDefinition, IntakeEvent, IntakeState, IntakeTransitionError,
    OptionSource,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::blocks::{self, modal_view};
use crate::events::EventContext;
use crate::web::{SlackApiError, SlackWebApi};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub user_name: String,
    pub trigger_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormCommand {
    Open,
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
    #[error("slash command `{0}` arrived without a trigger id")]
    MissingTrigger(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("failed to open request form: {0}")]
    OpenView(SlackApiError),
    #[error("failed to post help message: {0}")]
    Help(SlackApiError),
    #[error(transparent)]
    Transition(#[from] IntakeTransitionError),
}

/// Matches the payload against the configured command. Any text other than
/// `help` opens the form.
pub fn parse_form_command(
    payload: &SlashCommandPayload,
    expected_command: &str,
) -> Result<FormCommand, CommandParseError> {
    if !payload.command.eq_ignore_ascii_case(expected_command) {
        return Err(CommandParseError::UnsupportedCommand(payload.command.clone()));
    }

    if payload.text.trim().eq_ignore_ascii_case("help") {
        return Ok(FormCommand::Help);
    }

    if payload.trigger_id.trim().is_empty() {
        return Err(CommandParseError::MissingTrigger(payload.command.clone()));
    }

    Ok(FormCommand::Open)
}

pub struct FormCommandService {
    command: String,
    definition: FormDefinition,
    builder: FormBuilder,
    web: Arc<dyn SlackWebApi>,
}

impl FormCommandService {
    pub fn new(
        command: impl Into<String>,
        definition: FormDefinition,
        builder: FormBuilder,
        web: Arc<dyn SlackWebApi>,
    ) -> Self {
        Self { command: command.into(), definition, builder, web }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub async fn route(
        &self,
        payload: &SlashCommandPayload,
        ctx: &EventContext,
    ) -> Result<IntakeState, CommandRouteError> {
        match parse_form_command(payload, &self.command) {
            Ok(FormCommand::Open) => self.open_form(payload, ctx).await,
            Ok(FormCommand::Help) => {
                self.web
                    .post_message(&payload.user_id, &blocks::help_message(&self.command))
                    .await
                    .map_err(CommandRouteError::Help)?;
                Ok(IntakeState::Idle)
            }
            Err(error) => {
                warn!(
                    event_name = "ingress.slack.command_rejected",
                    correlation_id = %ctx.correlation_id,
                    command = %payload.command,
                    error = %error,
                    "slash command not handled"
                );
                Ok(IntakeState::Idle)
            }
        }
    }

    async fn open_form(
        &self,
        payload: &SlashCommandPayload,
        ctx: &EventContext,
    ) -> Result<IntakeState, CommandRouteError> {
        let form = self.builder.build_form(&self.definition).await;
        let fallback_fields = form
            .fields
            .iter()
            .filter(|field| field.source == OptionSource::Fallback)
            .count();

        if let Err(error) = self.web.open_view(&payload.trigger_id, &modal_view(&form)).await {
            warn!(
                event_name = "egress.slack.view_open_failed",
                correlation_id = %ctx.correlation_id,
                user_id = %payload.user_id,
                error = %error,
                "request form could not be opened"
            );
            return Err(CommandRouteError::OpenView(error));
        }

        let state = transition(IntakeState::Idle, IntakeEvent::FormOpened)?;
        info!(
            event_name = "intake.form.opened",
            correlation_id = %ctx.correlation_id,
            user_id = %payload.user_id,
            callback_id = %self.definition.callback_id,
            fallback_fields,
            state = ?state,
            "request form opened"
        );
        Ok(state)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::blocks::{MessageTemplate, ModalView};
    use crate::web::{SlackApiError, SlackWebApi};

    #[derive(Default)]
    pub struct RecordingWebApi {
        pub views: Mutex<Vec<(String, ModalView)>>,
        pub messages: Mutex<Vec<(String, MessageTemplate)>>,
        pub fail_with: Option<SlackApiError>,
    }

    impl RecordingWebApi {
        pub fn failing(error: SlackApiError) -> Self {
            Self { fail_with: Some(error), ..Self::default() }
        }
    }

    #[async_trait]
    impl SlackWebApi for RecordingWebApi {
        async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), SlackApiError> {
            if let Some(error) = &self.fail_with {
                return Err(error.clone());
            }
            self.views.lock().await.push((trigger_id.to_owned(), view.clone()));
            Ok(())
        }

        async fn post_message(
            &self,
            channel: &str,
            message: &MessageTemplate,
        ) -> Result<(), SlackApiError> {
            if let Some(error) = &self.fail_with {
                return Err(error.clone());
            }
            self.messages.lock().await.push((channel.to_owned(), message.clone()));
            Ok(())
        }
    }
}
