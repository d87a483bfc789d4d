//! Slack interface for the intake bot.
//!
//! - **Socket Mode** (`socket`, `websocket`): envelope loop with reconnects, ack before dispatch
//! - **Slash command** (`commands`): opens the request modal with schema-backed options
//! - **Submission** (`submission`): maps modal values to one record and DMs the result
//! - **Events** (`events`): routes envelopes to the two handlers above
//! - **Block Kit** (`blocks`): modal view and message builders
//! - **Web API** (`web`): `views.open` and `chat.postMessage`
//!
//! ```text
//! Socket Mode → EventDispatcher → SlashCommandHandler → FormBuilder → views.open
//!                              └→ ViewSubmissionHandler → RecordStore → chat.postMessage
//! ```

pub mod blocks;
pub mod commands;
pub mod events;
pub mod socket;
pub mod submission;
pub mod web;
pub mod websocket;
