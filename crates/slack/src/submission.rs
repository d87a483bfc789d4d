use std::sync::Arc;

use chrono::Utc;
use intake_core::{
    CreatedRecord, FieldKind, FormDefinition, IntakeEvent, IntakeState, RecordMapping,
    RecordStore, SubmissionValues, SubmittingUser,
};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::blocks::{confirmation_message, failure_message, MessageTemplate};
use crate::events::EventContext;
use crate::web::SlackWebApi;

/// Reads the submitted values out of `view.state.values`, keyed by field id.
/// Fields the user left blank or that are missing from the payload read as
/// empty strings.
pub fn submission_values(definition: &FormDefinition, state_values: &Value) -> SubmissionValues {
    definition
        .fields
        .iter()
        .map(|field| {
            let entry = &state_values[field.block_id()][field.action_id()];
            let value = match field.kind {
                FieldKind::SingleSelect { .. } => entry["selected_option"]["value"].as_str(),
                FieldKind::SingleLineText | FieldKind::MultiLineText => entry["value"].as_str(),
            };
            (field.id.clone(), value.unwrap_or_default().to_owned())
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Created { record: CreatedRecord, notified: bool },
    Failed { reason: String, notified: bool },
}

impl SubmissionOutcome {
    pub fn event(&self) -> IntakeEvent {
        match self {
            Self::Created { .. } => IntakeEvent::RecordCreated,
            Self::Failed { .. } => IntakeEvent::RecordFailed,
        }
    }

    pub fn state(&self) -> IntakeState {
        match self {
            Self::Created { .. } => IntakeState::Created,
            Self::Failed { .. } => IntakeState::Failed,
        }
    }

    pub fn notified(&self) -> bool {
        match self {
            Self::Created { notified, .. } | Self::Failed { notified, .. } => *notified,
        }
    }
}

pub struct SubmissionHandler {
    store: Arc<dyn RecordStore>,
    chat: Arc<dyn SlackWebApi>,
    definition: FormDefinition,
    mapping: RecordMapping,
}

impl SubmissionHandler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        chat: Arc<dyn SlackWebApi>,
        definition: FormDefinition,
        mapping: RecordMapping,
    ) -> Self {
        Self { store, chat, definition, mapping }
    }

    pub fn definition(&self) -> &FormDefinition {
        &self.definition
    }

    /// Creates one record for the submission and sends the user exactly one
    /// direct message describing the result.
    pub async fn on_submit(
        &self,
        values: &SubmissionValues,
        user: &SubmittingUser,
        ctx: &EventContext,
    ) -> SubmissionOutcome {
        let draft = self.mapping.draft(values, user, Utc::now().date_naive());

        match self.store.create_record(&draft).await {
            Ok(record) => {
                let request_type = values.get(&self.definition.category_field);
                let title =
                    self.mapping.title_field().map(|field| values.get(field)).unwrap_or_default();
                info!(
                    event_name = "intake.record.created",
                    correlation_id = %ctx.correlation_id,
                    user_id = %user.id,
                    record_id = %record.id,
                    "request recorded"
                );

                let notified =
                    self.notify(user, &confirmation_message(request_type, title), ctx).await;
                SubmissionOutcome::Created { record, notified }
            }
            Err(store_error) => {
                let reason = store_error.reason();
                error!(
                    event_name = "intake.record.failed",
                    correlation_id = %ctx.correlation_id,
                    user_id = %user.id,
                    error = %store_error,
                    "request could not be recorded"
                );

                let notified =
                    self.notify(user, &failure_message(&reason, &ctx.correlation_id), ctx).await;
                SubmissionOutcome::Failed { reason, notified }
            }
        }
    }

    async fn notify(
        &self,
        user: &SubmittingUser,
        message: &MessageTemplate,
        ctx: &EventContext,
    ) -> bool {
        match self.chat.post_message(&user.id, message).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "egress.slack.notification_failed",
                    correlation_id = %ctx.correlation_id,
                    user_id = %user.id,
                    error = %error,
                    "could not notify submitting user"
                );
                false
            }
        }
    }
}
