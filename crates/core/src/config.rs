use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::form::FormDefinition;
use crate::record::{PropertyBinding, RecordMapping};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub notion: NotionConfig,
    pub form: FormConfig,
    pub record: RecordMapping,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct NotionConfig {
    pub api_key: SecretString,
    pub database_id: String,
    pub base_url: String,
    pub api_version: String,
    pub timeout_secs: u64,
    pub parent_style: ParentStyle,
}

#[derive(Clone, Debug)]
pub struct FormConfig {
    pub command: String,
    pub callback_id: String,
    pub title: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// How a create-record request names its parent collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentStyle {
    /// `{"database_id": "..."}`
    DatabaseId,
    /// `{"type": "database_id", "database_id": "..."}`
    Typed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub notion_api_key: Option<String>,
    pub notion_database_id: Option<String>,
    pub notion_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["intake.toml", "config/intake.toml"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                api_base_url: "https://slack.com/api".to_string(),
            },
            notion: NotionConfig {
                api_key: String::new().into(),
                database_id: String::new(),
                base_url: "https://api.notion.com".to_string(),
                api_version: "2022-06-28".to_string(),
                timeout_secs: 10,
                parent_style: ParentStyle::DatabaseId,
            },
            form: FormConfig {
                command: "/hubspot-ticket".to_string(),
                callback_id: "ticket_modal_submit".to_string(),
                title: "New Internal Request".to_string(),
            },
            record: RecordMapping::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for ParentStyle {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "database_id" => Ok(Self::DatabaseId),
            "typed" => Ok(Self::Typed),
            other => Err(ConfigError::Validation(format!(
                "unsupported notion.parent_style `{other}` (expected database_id|typed)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(slack_app_token_value) = slack.app_token {
                self.slack.app_token = secret_value(slack_app_token_value);
            }
            if let Some(slack_bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(slack_bot_token_value);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(notion) = patch.notion {
            if let Some(notion_api_key_value) = notion.api_key {
                self.notion.api_key = secret_value(notion_api_key_value);
            }
            if let Some(database_id) = notion.database_id {
                self.notion.database_id = database_id;
            }
            if let Some(base_url) = notion.base_url {
                self.notion.base_url = base_url;
            }
            if let Some(api_version) = notion.api_version {
                self.notion.api_version = api_version;
            }
            if let Some(timeout_secs) = notion.timeout_secs {
                self.notion.timeout_secs = timeout_secs;
            }
            if let Some(parent_style) = notion.parent_style {
                self.notion.parent_style = parent_style;
            }
        }

        if let Some(form) = patch.form {
            if let Some(command) = form.command {
                self.form.command = command;
            }
            if let Some(callback_id) = form.callback_id {
                self.form.callback_id = callback_id;
            }
            if let Some(title) = form.title {
                self.form.title = title;
            }
        }

        if let Some(record) = patch.record {
            if let Some(bindings) = record.bindings {
                self.record.bindings = bindings;
            }
            if let Some(status_property) = record.status_property {
                self.record.status_property = status_property;
            }
            if let Some(initial_status) = record.initial_status {
                self.record.initial_status = initial_status;
            }
            if let Some(created_date_property) = record.created_date_property {
                self.record.created_date_property = created_date_property;
            }
            if let Some(created_by_property) = record.created_by_property {
                let trimmed = created_by_property.trim();
                self.record.created_by_property =
                    (!trimmed.is_empty()).then(|| trimmed.to_string());
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let app_token = read_env("INTAKE_SLACK_APP_TOKEN").or_else(|| read_env("SLACK_APP_TOKEN"));
        if let Some(value) = app_token {
            self.slack.app_token = secret_value(value);
        }
        let bot_token = read_env("INTAKE_SLACK_BOT_TOKEN").or_else(|| read_env("SLACK_BOT_TOKEN"));
        if let Some(value) = bot_token {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("INTAKE_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        let api_key = read_env("INTAKE_NOTION_API_KEY").or_else(|| read_env("NOTION_API_KEY"));
        if let Some(value) = api_key {
            self.notion.api_key = secret_value(value);
        }
        let database_id =
            read_env("INTAKE_NOTION_DATABASE_ID").or_else(|| read_env("NOTION_DB_ID"));
        if let Some(value) = database_id {
            self.notion.database_id = value;
        }
        if let Some(value) = read_env("INTAKE_NOTION_BASE_URL") {
            self.notion.base_url = value;
        }
        if let Some(value) = read_env("INTAKE_NOTION_API_VERSION") {
            self.notion.api_version = value;
        }
        if let Some(value) = read_env("INTAKE_NOTION_TIMEOUT_SECS") {
            self.notion.timeout_secs = parse_u64("INTAKE_NOTION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("INTAKE_NOTION_PARENT_STYLE") {
            self.notion.parent_style = value.parse()?;
        }

        if let Some(value) = read_env("INTAKE_FORM_COMMAND") {
            self.form.command = value;
        }
        if let Some(value) = read_env("INTAKE_FORM_CALLBACK_ID") {
            self.form.callback_id = value;
        }

        if let Some(value) = read_env("INTAKE_RECORD_INITIAL_STATUS") {
            self.record.initial_status = value;
        }
        if let Some(value) = read_env("INTAKE_RECORD_CREATED_BY_PROPERTY") {
            self.record.created_by_property = Some(value);
        }

        if let Some(value) = read_env("INTAKE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("INTAKE_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("INTAKE_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("INTAKE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("INTAKE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("INTAKE_LOGGING_LEVEL").or_else(|| read_env("INTAKE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("INTAKE_LOGGING_FORMAT").or_else(|| read_env("INTAKE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(slack_app_token);
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = api_base_url;
        }
        if let Some(notion_api_key) = overrides.notion_api_key {
            self.notion.api_key = secret_value(notion_api_key);
        }
        if let Some(database_id) = overrides.notion_database_id {
            self.notion.database_id = database_id;
        }
        if let Some(base_url) = overrides.notion_base_url {
            self.notion.base_url = base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_notion(&self.notion)?;
        validate_form(&self.form)?;
        self.record.validate().map_err(ConfigError::Validation)?;
        validate_bound_fields(&self.form, &self.record)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_string()
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    validate_http_url("slack.api_base_url", &slack.api_base_url)
}

fn validate_notion(notion: &NotionConfig) -> Result<(), ConfigError> {
    if notion.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "notion.api_key is required. Create an internal integration at https://www.notion.so/my-integrations and share the database with it".to_string(),
        ));
    }

    if notion.database_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "notion.database_id is required (the 32-character id in the database URL)".to_string(),
        ));
    }

    if notion.api_version.trim().is_empty() {
        return Err(ConfigError::Validation("notion.api_version must not be empty".to_string()));
    }

    if notion.timeout_secs == 0 || notion.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "notion.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    validate_http_url("notion.base_url", &notion.base_url)
}

fn validate_form(form: &FormConfig) -> Result<(), ConfigError> {
    let command = form.command.trim();
    if !command.starts_with('/') || command.len() < 2 || command.contains(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "form.command must be a slash command like `/ticket` (got `{}`)",
            form.command
        )));
    }

    if form.callback_id.trim().is_empty() {
        return Err(ConfigError::Validation("form.callback_id must not be empty".to_string()));
    }

    // Slack caps modal titles at 24 characters.
    if form.title.trim().is_empty() || form.title.chars().count() > 24 {
        return Err(ConfigError::Validation(
            "form.title must be between 1 and 24 characters".to_string(),
        ));
    }

    Ok(())
}

/// Every binding must name a field the form actually renders.
fn validate_bound_fields(form: &FormConfig, record: &RecordMapping) -> Result<(), ConfigError> {
    let definition = FormDefinition::ticket_request(&form.callback_id, &form.title);
    let Some(unknown) =
        record.bindings.iter().find(|binding| definition.field(&binding.field).is_none())
    else {
        return Ok(());
    };

    let known = definition.fields.iter().map(|field| field.id.as_str()).collect::<Vec<_>>();
    Err(ConfigError::Validation(format!(
        "record.bindings field `{}` is not a form field (expected one of: {})",
        unknown.field,
        known.join(", ")
    )))
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    notion: Option<NotionPatch>,
    form: Option<FormPatch>,
    record: Option<RecordPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NotionPatch {
    api_key: Option<String>,
    database_id: Option<String>,
    base_url: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
    parent_style: Option<ParentStyle>,
}

#[derive(Debug, Default, Deserialize)]
struct FormPatch {
    command: Option<String>,
    callback_id: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RecordPatch {
    bindings: Option<Vec<PropertyBinding>>,
    status_property: Option<String>,
    initial_status: Option<String>,
    created_date_property: Option<String>,
    created_by_property: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
