//! Record store clients.
//!
//! `NotionClient` implements [`intake_core::RecordStore`] against the Notion
//! REST API: `GET /v1/databases/{id}` for the schema and `POST /v1/pages` for
//! record creation.

pub mod notion;
pub mod wire;

pub use notion::NotionClient;
