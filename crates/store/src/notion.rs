use std::time::Duration;

use async_trait::async_trait;
use intake_core::config::{NotionConfig, ParentStyle};
use intake_core::{CollectionSchema, CreatedRecord, RecordDraft, RecordStore, StoreError};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::wire::{self, DatabaseResponse, ErrorResponse, PageResponse};

/// Notion-backed record store bound to a single database.
pub struct NotionClient {
    client: Client,
    base_url: String,
    database_id: String,
    api_key: SecretString,
    api_version: String,
    parent_style: ParentStyle,
}

impl NotionClient {
    pub fn new(config: &NotionConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| StoreError::Configuration(format!("http client: {error}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            database_id: config.database_id.clone(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            parent_style: config.parent_style,
        })
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.api_key.expose_secret())
            .header("Notion-Version", &self.api_version)
    }

    async fn send<T>(&self, operation: &'static str, request: RequestBuilder) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let response = self.authorized(request).send().await.map_err(|error| {
            warn!(
                event_name = "store.notion.transport_error",
                operation,
                error = %error,
                "notion request failed"
            );
            StoreError::Transport(error.to_string())
        })?;

        let status = response.status();
        debug!(event_name = "store.notion.response", operation, status = status.as_u16());

        if !status.is_success() {
            return Err(api_error(status.as_u16(), response).await);
        }

        response.json::<T>().await.map_err(|error| StoreError::Decode(error.to_string()))
    }
}

async fn api_error(status: u16, response: Response) -> StoreError {
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(error) => StoreError::Api {
            status: error.status.unwrap_or(status),
            code: error.code,
            message: error.message,
        },
        Err(_) => StoreError::Api { status, code: "http_error".to_owned(), message: body },
    }
}

#[async_trait]
impl RecordStore for NotionClient {
    async fn fetch_schema(&self) -> Result<CollectionSchema, StoreError> {
        let url = format!("{}/v1/databases/{}", self.base_url, self.database_id);
        let database: DatabaseResponse =
            self.send("databases.retrieve", self.client.get(url)).await?;
        let schema = database.into_schema();

        debug!(
            event_name = "store.notion.schema_fetched",
            database_id = %self.database_id,
            properties = schema.len(),
            "notion database schema fetched"
        );
        Ok(schema)
    }

    async fn create_record(&self, draft: &RecordDraft) -> Result<CreatedRecord, StoreError> {
        let url = format!("{}/v1/pages", self.base_url);
        let body = wire::create_page_body(self.parent_style, &self.database_id, draft);
        let page: PageResponse = self.send("pages.create", self.client.post(url).json(&body)).await?;

        info!(
            event_name = "store.notion.page_created",
            database_id = %self.database_id,
            page_id = %page.id,
            "notion page created"
        );
        Ok(CreatedRecord { id: page.id, url: page.url })
    }
}
