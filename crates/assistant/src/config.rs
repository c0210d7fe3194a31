//! Assistant configuration

use anyhow::{Context, Result};
use assistant_lib::{ModelDefaults, UrgencyConfig};
use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Assistant configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    /// Port for the recommendation, health and metrics API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base URL of the integrations (telemetry) service
    #[serde(default = "default_integrations_url")]
    pub integrations_url: String,

    /// Base URL of the actions (dispatch) service
    #[serde(default = "default_actions_url")]
    pub actions_url: String,

    /// Decision engine manifest
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Directory holding the NLP urgency model
    #[serde(default = "default_nlp_model_path")]
    pub nlp_model_path: PathBuf,

    #[serde(default)]
    pub nlp_enabled: bool,

    /// Optional JSON action table replacing the built-in one
    #[serde(default)]
    pub action_table_path: Option<PathBuf>,

    /// Accept empty user tokens, substituting `dev_user_token`
    #[serde(default)]
    pub auth_disabled: bool,

    #[serde(default = "default_dev_user_token")]
    pub dev_user_token: String,

    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Unset leaves telemetry fetches unbounded
    #[serde(default)]
    pub telemetry_timeout_secs: Option<u64>,

    /// Overrides for the padding values fed to named-feature models
    #[serde(default)]
    pub model_defaults: BTreeMap<String, f64>,
}

fn default_api_port() -> u16 {
    8002
}

fn default_integrations_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_actions_url() -> String {
    "http://localhost:8003".to_string()
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/decision_engine.json")
}

fn default_nlp_model_path() -> PathBuf {
    PathBuf::from("models/nlp_email_model")
}

fn default_dev_user_token() -> String {
    "dev-token".to_string()
}

fn default_dispatch_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    5
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            integrations_url: default_integrations_url(),
            actions_url: default_actions_url(),
            model_path: default_model_path(),
            nlp_model_path: default_nlp_model_path(),
            nlp_enabled: false,
            action_table_path: None,
            auth_disabled: false,
            dev_user_token: default_dev_user_token(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            telemetry_timeout_secs: None,
            model_defaults: BTreeMap::new(),
        }
    }
}

impl AssistantConfig {
    /// Load configuration from `assistant.toml` (optional) and `ASSISTANT_*`
    /// environment variables, the latter taking precedence
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("assistant").required(false))
            .add_source(config::Environment::with_prefix("ASSISTANT").try_parsing(true));
        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder.build().context("Failed to read configuration")?;
        config
            .try_deserialize()
            .context("Invalid assistant configuration")
    }

    pub fn urgency(&self) -> UrgencyConfig {
        UrgencyConfig {
            nlp_enabled: self.nlp_enabled,
            model_dir: Some(self.nlp_model_path.clone()),
        }
    }

    pub fn model_defaults(&self) -> ModelDefaults {
        ModelDefaults::with_overrides(&self.model_defaults)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn telemetry_timeout(&self) -> Option<Duration> {
        self.telemetry_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(content: &str) -> Result<AssistantConfig> {
        AssistantConfig::from_builder(
            config::Config::builder().add_source(config::File::from_str(content, FileFormat::Toml)),
        )
    }

    #[test]
    fn test_empty_source_uses_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.api_port, 8002);
        assert_eq!(config.integrations_url, "http://localhost:8001");
        assert_eq!(config.actions_url, "http://localhost:8003");
        assert_eq!(config.dispatch_timeout(), Duration::from_secs(30));
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert!(config.telemetry_timeout().is_none());
        assert!(!config.auth_disabled);
        assert!(!config.urgency().nlp_enabled);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let config = from_toml(
            r#"
            api_port = 9000
            actions_url = "http://actions:8003"
            nlp_enabled = true
            nlp_model_path = "/srv/nlp"
            telemetry_timeout_secs = 12
            auth_disabled = true

            [model_defaults]
            Systolic_BP = 135.0
            "#,
        )
        .unwrap();

        assert_eq!(config.api_port, 9000);
        assert_eq!(config.actions_url, "http://actions:8003");
        assert_eq!(config.telemetry_timeout(), Some(Duration::from_secs(12)));
        assert!(config.auth_disabled);

        let urgency = config.urgency();
        assert!(urgency.nlp_enabled);
        assert_eq!(urgency.model_dir, Some(PathBuf::from("/srv/nlp")));

        let defaults = config.model_defaults();
        assert_eq!(defaults.get("Systolic_BP"), Some(135.0));
        assert_eq!(defaults.get("BMI_Category"), Some(2.0));
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        assert!(from_toml(r#"api_port = "not-a-port""#).is_err());
    }

    #[test]
    fn test_default_impl_matches_serde_defaults() {
        let loaded = from_toml("").unwrap();
        let default = AssistantConfig::default();
        assert_eq!(loaded.model_path, default.model_path);
        assert_eq!(loaded.dev_user_token, default.dev_user_token);
    }
}
