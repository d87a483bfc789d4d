use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use intake_core::RecordStore;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    store: Arc<dyn RecordStore>,
    slack_connected: watch::Receiver<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub record_store: HealthCheck,
    pub slack_connection: HealthCheck,
    pub checked_at: String,
}

pub fn router(store: Arc<dyn RecordStore>, slack_connected: watch::Receiver<bool>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { store, slack_connected })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    store: Arc<dyn RecordStore>,
    slack_connected: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(store, slack_connected)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let record_store = record_store_check(state.store.as_ref()).await;
    let slack_connection = slack_connection_check(*state.slack_connected.borrow());
    let ready = record_store.status == "ready" && slack_connection.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "intake-server runtime initialized".to_string(),
        },
        record_store,
        slack_connection,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn record_store_check(store: &dyn RecordStore) -> HealthCheck {
    match store.fetch_schema().await {
        Ok(schema) => HealthCheck {
            status: "ready",
            detail: format!("schema fetched ({} properties)", schema.len()),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("schema fetch failed: {error}") }
        }
    }
}

fn slack_connection_check(connected: bool) -> HealthCheck {
    if connected {
        HealthCheck { status: "ready", detail: "socket mode connected".to_string() }
    } else {
        HealthCheck { status: "degraded", detail: "socket mode reconnecting".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{extract::State, http::StatusCode, Json};
    use intake_core::{
        CollectionSchema, CreatedRecord, PropertyDescriptor, RecordDraft, RecordStore, StoreError,
    };
    use tokio::sync::watch;

    use crate::health::{health, HealthState};

    struct StaticStore(Result<CollectionSchema, StoreError>);

    #[async_trait]
    impl RecordStore for StaticStore {
        async fn fetch_schema(&self) -> Result<CollectionSchema, StoreError> {
            self.0.clone()
        }

        async fn create_record(&self, _draft: &RecordDraft) -> Result<CreatedRecord, StoreError> {
            Err(StoreError::Configuration("health checks never create records".to_string()))
        }
    }

    fn state(store: StaticStore, slack_connected: bool) -> HealthState {
        let (_sender, slack_connected) = watch::channel(slack_connected);
        HealthState { store: Arc::new(store), slack_connected }
    }

    fn reachable_store() -> StaticStore {
        StaticStore(Ok(CollectionSchema::new("db-1").with_property("Title", PropertyDescriptor::Title)))
    }

    #[tokio::test]
    async fn health_returns_ready_when_record_store_is_reachable() {
        let (status, Json(payload)) = health(State(state(reachable_store(), true))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.record_store.status, "ready");
        assert_eq!(payload.slack_connection.status, "ready");
        assert!(payload.record_store.detail.contains("1 properties"));
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_record_store_is_unavailable() {
        let store = StaticStore(Err(StoreError::Api {
            status: 401,
            code: "unauthorized".to_string(),
            message: "API token is invalid.".to_string(),
        }));

        let (status, Json(payload)) = health(State(state(store, true))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.record_store.status, "degraded");
        assert!(payload.record_store.detail.contains("API token is invalid."));
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_while_socket_mode_is_disconnected() {
        let (status, Json(payload)) = health(State(state(reachable_store(), false))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.record_store.status, "ready");
        assert_eq!(payload.slack_connection.status, "degraded");
        assert_eq!(payload.slack_connection.detail, "socket mode reconnecting");
    }
}
