use async_trait::async_trait;

use crate::{errors::StoreError, record::RecordDraft, schema::CollectionSchema};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedRecord {
    pub id: String,
    pub url: Option<String>,
}

/// Remote collection the bot writes into. Implementations target one
/// configured collection.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_schema(&self) -> Result<CollectionSchema, StoreError>;
    async fn create_record(&self, draft: &RecordDraft) -> Result<CreatedRecord, StoreError>;
}
