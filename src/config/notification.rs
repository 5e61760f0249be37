use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::schema;
use crate::error::ConfigError;

/// Where and how monitors deliver alerts
///
/// Loaded once per process and read-only afterwards. Mail is always configured; the chat webhook
/// is optional.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NotificationConfig {
    pub email_to: String,
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_pass: Option<String>,
    #[serde(default)]
    pub slack_webhook: Option<String>,
}

fn default_smtp_port() -> u16 { 25 }

impl NotificationConfig {
    /// Load from YAML or JSON, chosen by file extension (YAML when unknown)
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Reading notification config at {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| {
            warn!("Can't read notification config at {}", path.display());
            ConfigError::Read { path: path.to_path_buf(), source }
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "json" => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // serde_json::Value deserialises from any format, so YAML lands in the same untyped tree
        let json: Value = serde_yaml::from_str(yaml)
            .map_err(|err| ConfigError::Decode(err.to_string()))?;
        Self::from_untyped(json)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let json: Value = serde_json::from_str(json)
            .map_err(|err| ConfigError::Decode(err.to_string()))?;
        Self::from_untyped(json)
    }

    fn from_untyped(json: Value) -> Result<Self, ConfigError> {
        let compiled = schema::load_schema()?;
        match schema::validate(&compiled, &json) {
            Ok(_) => info!("Notification config is valid"),
            Err(err) => {
                warn!("Notification config fails validation");
                return Err(err);
            }
        }

        let config: NotificationConfig = serde_json::from_value(json)
            .map_err(|err| ConfigError::Decode(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the schema can't express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.email_to.trim().is_empty() {
            return Err(ConfigError::Invalid("email_to must not be empty".to_string()));
        }
        if self.smtp_host.trim().is_empty() {
            return Err(ConfigError::Invalid("smtp_host must not be empty".to_string()));
        }
        if self.smtp_port == 0 {
            return Err(ConfigError::Invalid("smtp_port must be > 0".to_string()));
        }
        if self.smtp_user.is_some() != self.smtp_pass.is_some() {
            return Err(ConfigError::Invalid("smtp_user and smtp_pass must be set together".to_string()));
        }
        if let Some(webhook) = &self.slack_webhook {
            let url = Url::parse(webhook)
                .map_err(|err| ConfigError::Invalid(format!("slack_webhook is not a URL: {err}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!("slack_webhook scheme '{}' is not http(s)", url.scheme())));
            }
        }
        Ok(())
    }

    /// Sender address for mail alerts
    pub fn sender(&self) -> &str {
        self.smtp_user.as_deref().unwrap_or("ica-monitor@localhost")
    }
}
