use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use module_sdk::LogLevel;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::analytics::{AnalyticsEnv, RotationPolicy, WriteKeyTable};
use crate::error::ShellError;
use crate::logger::LogConfig;
use crate::topics::{ModuleRef, TopicId};

pub const ENV_ENVIRONMENT: &str = "SHELL_ENV";
pub const ENV_CACHE_TIMEOUT: &str = "SHELL_CACHE_TIMEOUT";
pub const ENV_LOG_LEVEL: &str = "SHELL_LOG_LEVEL";
pub const ENV_OTEL_ENDPOINT: &str = "SHELL_OTEL_ENDPOINT";

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub keys: WriteKeyTable,
    pub rotation: RotationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ShellConfig {
    pub environment: AnalyticsEnv,
    /// How long a loaded module stays usable before it is fetched again.
    pub cache_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Namespace -> URL of the module's document bundle.
    pub modules: HashMap<String, String>,
    /// Topic -> module that renders it.
    pub topics: HashMap<TopicId, ModuleRef>,
    /// Module used for topics missing from `topics`.
    pub default_topic_module: Option<ModuleRef>,
    /// Topics enabled at startup.
    pub enabled_topics: Vec<TopicId>,
    pub feature_flags: HashMap<String, bool>,
    /// Topic -> flag that must be on for the topic to be enabled.
    pub topic_flags: HashMap<TopicId, String>,
    pub analytics: AnalyticsConfig,
    pub logging: LogConfig,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            environment: AnalyticsEnv::Dev,
            cache_timeout_secs: 120,
            request_timeout_secs: 30,
            modules: HashMap::new(),
            topics: HashMap::new(),
            default_topic_module: None,
            enabled_topics: vec![],
            feature_flags: HashMap::new(),
            topic_flags: HashMap::new(),
            analytics: AnalyticsConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl ShellConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ShellError> {
        Ok(serde_yaml_bw::from_str(text)?)
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ShellError> {
        if !path.exists() {
            info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&text)?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads `.env` (if present) into the process environment, then applies
    /// the `SHELL_*` variables on top of the file values.
    pub fn apply_env(&mut self, env_file: &Path) -> Result<(), ShellError> {
        if env_file.exists() {
            dotenvy::from_path(env_file).map_err(|e| ShellError::Config(e.to_string()))?;
            info!("Loaded .env from {}", env_file.display());
        }
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ShellError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup(ENV_ENVIRONMENT) {
            self.environment = AnalyticsEnv::from_str(env.trim())
                .map_err(|_| ShellError::Config(format!("{ENV_ENVIRONMENT}: unknown environment `{env}`")))?;
        }
        if let Some(secs) = lookup(ENV_CACHE_TIMEOUT) {
            self.cache_timeout_secs = secs
                .trim()
                .parse()
                .map_err(|_| ShellError::Config(format!("{ENV_CACHE_TIMEOUT}: `{secs}` is not a number of seconds")))?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.log_level = LogLevel::from_str(level.trim())
                .map_err(|_| ShellError::Config(format!("{ENV_LOG_LEVEL}: unknown level `{level}`")))?;
        }
        if let Some(endpoint) = lookup(ENV_OTEL_ENDPOINT) {
            self.logging.otel_endpoint = Some(endpoint).filter(|e| !e.trim().is_empty());
        }
        Ok(())
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Problems worth reporting before starting the shell.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = vec![];
        if self.request_timeout_secs == 0 {
            problems.push("request_timeout_secs must be greater than zero".to_string());
        }
        for (namespace, source) in &self.modules {
            if let Err(err) = Url::parse(source) {
                problems.push(format!("module `{namespace}` has an invalid url `{source}`: {err}"));
            }
        }
        for id in &self.enabled_topics {
            if !self.topics.contains_key(id) && self.default_topic_module.is_none() {
                problems.push(format!("enabled topic `{id}` has no module and there is no default_topic_module"));
            }
        }
        for (id, flag) in &self.topic_flags {
            if !self.feature_flags.contains_key(flag) {
                problems.push(format!("topic `{id}` is gated by unknown flag `{flag}` and will stay disabled"));
            }
        }
        if self
            .analytics
            .keys
            .key_for(self.environment, "")
            .is_none()
        {
            problems.push(format!(
                "no fallback analytics key for `{}`; modules without their own key get no session",
                self.environment
            ));
        }
        problems.sort();
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
environment: prod
cache_timeout_secs: 999999
modules:
  HelpTopics: https://console.example.com/api/quickstarts/v1/helptopics
topics:
  create-app-config:
    namespace: HelpTopics
    export: create-app-config
  create-environment:
    namespace: HelpTopics
    export: create-environment
enabled_topics: [create-app-config]
analytics:
  keys:
    prod:
      fallback: prod-key
      modules:
        openshift: prod-openshift
  rotation: dispose
logging:
  log_level: debug
"#;

    #[test]
    fn parses_full_config() {
        let config = ShellConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.environment, AnalyticsEnv::Prod);
        assert_eq!(config.cache_timeout(), Duration::from_secs(999999));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.topics["create-environment"].namespace, "HelpTopics");
        assert_eq!(config.analytics.rotation, RotationPolicy::Dispose);
        assert_eq!(
            config.analytics.keys.key_for(AnalyticsEnv::Prod, "openshift"),
            Some("prod-openshift")
        );
        assert_eq!(config.logging.log_level, LogLevel::Debug);
        assert!(config.validate().is_empty(), "{:?}", config.validate());
    }

    #[test]
    fn empty_document_gives_defaults() {
        let config = ShellConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ShellConfig::default());
        assert_eq!(config.cache_timeout_secs, 120);
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = ShellConfig::from_yaml(SAMPLE).unwrap();
        let vars = HashMap::from([
            (ENV_ENVIRONMENT, "dev"),
            (ENV_CACHE_TIMEOUT, "5"),
            (ENV_LOG_LEVEL, "WARN"),
            (ENV_OTEL_ENDPOINT, "http://localhost:4318"),
        ]);
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.environment, AnalyticsEnv::Dev);
        assert_eq!(config.cache_timeout_secs, 5);
        assert_eq!(config.logging.log_level, LogLevel::Warn);
        assert_eq!(config.logging.otel_endpoint.as_deref(), Some("http://localhost:4318"));
    }

    #[test]
    fn bad_override_is_a_config_error() {
        let mut config = ShellConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_CACHE_TIMEOUT).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ShellError::Config(msg) if msg.contains("soon")));
    }

    #[test]
    fn validate_reports_orphans_and_unknown_flags() {
        let mut config = ShellConfig::default();
        config.enabled_topics = vec!["orphan".into()];
        config.topic_flags.insert("orphan".into(), "missing.flag".into());

        let problems = config.validate();
        assert_eq!(problems.len(), 3);
        assert!(problems.iter().any(|p| p.contains("orphan") && p.contains("no module")));
        assert!(problems.iter().any(|p| p.contains("missing.flag")));
        assert!(problems.iter().any(|p| p.contains("fallback analytics key")));
    }

    #[test]
    fn validate_rejects_relative_module_urls() {
        let mut config = ShellConfig::default();
        config.analytics.keys.dev.fallback = Some("dev-key".into());
        config.modules.insert("HelpTopics".into(), "/api/helptopics".into());

        let problems = config.validate();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("HelpTopics"), "{problems:?}");
    }

    #[test]
    fn missing_file_yields_defaults_and_bad_yaml_fails() {
        let dir = tempdir().unwrap();
        let config = ShellConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, ShellConfig::default());

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "cache_timeout_secs: [nope").unwrap();
        assert!(matches!(ShellConfig::load(&bad), Err(ShellError::Config(_))));
    }
}
