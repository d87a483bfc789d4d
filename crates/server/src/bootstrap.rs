use std::sync::Arc;

use intake_core::config::{AppConfig, ConfigError, LoadOptions};
use intake_core::{FormBuilder, FormDefinition, RecordStore, StoreError};
use intake_slack::commands::FormCommandService;
use intake_slack::events::intake_dispatcher;
use intake_slack::socket::{ReconnectPolicy, SocketModeRunner, TransportError};
use intake_slack::submission::SubmissionHandler;
use intake_slack::web::{SlackApiError, SlackWebClient};
use intake_slack::websocket::WebSocketTransport;
use intake_store::NotionClient;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<dyn RecordStore>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("record store client could not be built: {0}")]
    Store(#[source] StoreError),
    #[error("slack web client could not be built: {0}")]
    SlackWeb(#[source] SlackApiError),
    #[error("socket mode transport could not be built: {0}")]
    SlackTransport(#[source] TransportError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let store: Arc<dyn RecordStore> =
        Arc::new(NotionClient::new(&config.notion).map_err(BootstrapError::Store)?);
    info!(
        event_name = "system.bootstrap.store_ready",
        correlation_id = "bootstrap",
        database_id = %config.notion.database_id,
        "record store client configured"
    );

    let web = Arc::new(
        SlackWebClient::new(config.slack.api_base_url.clone(), config.slack.bot_token.clone())
            .map_err(BootstrapError::SlackWeb)?,
    );
    let transport = Arc::new(
        WebSocketTransport::new(config.slack.api_base_url.clone(), config.slack.app_token.clone())
            .map_err(BootstrapError::SlackTransport)?,
    );

    let definition = FormDefinition::ticket_request(&config.form.callback_id, &config.form.title);
    let commands = FormCommandService::new(
        config.form.command.clone(),
        definition.clone(),
        FormBuilder::new(store.clone()),
        web.clone(),
    );
    let submissions =
        SubmissionHandler::new(store.clone(), web, definition, config.record.clone());

    let slack_runner = SocketModeRunner::new(
        transport,
        intake_dispatcher(commands, submissions),
        ReconnectPolicy::default(),
    );
    info!(
        event_name = "system.bootstrap.slack_ready",
        correlation_id = "bootstrap",
        command = %config.form.command,
        callback_id = %config.form.callback_id,
        "slack handlers registered"
    );

    Ok(Application { config, store, slack_runner })
}
