use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of one form invocation. Never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeState {
    Idle,
    FormOpen,
    Submitted,
    Created,
    Failed,
}

impl IntakeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Created | Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeEvent {
    FormOpened,
    FormSubmitted,
    RecordCreated,
    RecordFailed,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid intake transition from {from:?} on {event:?}")]
pub struct IntakeTransitionError {
    pub from: IntakeState,
    pub event: IntakeEvent,
}

pub fn transition(
    current: IntakeState,
    event: IntakeEvent,
) -> Result<IntakeState, IntakeTransitionError> {
    match (current, event) {
        (IntakeState::Idle, IntakeEvent::FormOpened) => Ok(IntakeState::FormOpen),
        (IntakeState::FormOpen, IntakeEvent::FormSubmitted) => Ok(IntakeState::Submitted),
        (IntakeState::Submitted, IntakeEvent::RecordCreated) => Ok(IntakeState::Created),
        (IntakeState::Submitted, IntakeEvent::RecordFailed) => Ok(IntakeState::Failed),
        (from, event) => Err(IntakeTransitionError { from, event }),
    }
}
