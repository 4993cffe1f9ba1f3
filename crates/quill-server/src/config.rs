//! Environment-driven server configuration.

use std::env;
use std::time::Duration;

use quill_llm::LlmConfig;
use quill_trace::ExporterConfig;

const DEFAULT_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_MODEL: &str = "gpt-4.1";
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_TRACE_HOST: &str = "https://cloud.langfuse.com";
const DEFAULT_TRACE_TTL: Duration = Duration::from_secs(120);
const DEFAULT_DRAIN_CEILING: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {0}")]
    InvalidVar(&'static str),
}

/// Full server configuration, resolved once at startup.
///
/// Missing credentials abort startup here; nothing in the request path
/// reads the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub llm: LlmConfig,
    pub exporter: ExporterConfig,
    /// Time-to-live for an open trace whose completion never arrives.
    pub trace_ttl: Duration,
    /// Ceiling for draining pending flushes on shutdown.
    pub drain_ceiling: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let require = |name: &'static str| get(name).ok_or(ConfigError::MissingVar(name));

        let sample_rate = match get("QUILL_TRACE_SAMPLE_RATE") {
            Some(raw) => Some(
                raw.parse::<f64>()
                    .map_err(|_| ConfigError::InvalidVar("QUILL_TRACE_SAMPLE_RATE"))?,
            ),
            None => None,
        };

        Ok(Self {
            addr: get("QUILL_ADDR").unwrap_or_else(|| DEFAULT_ADDR.into()),
            llm: LlmConfig {
                api_key: require("OPENAI_API_KEY")?,
                api_base: get("OPENAI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into()),
                model: get("QUILL_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            },
            exporter: ExporterConfig {
                public_key: require("QUILL_TRACE_PUBLIC_KEY")?,
                secret_key: require("QUILL_TRACE_SECRET_KEY")?,
                host: get("QUILL_TRACE_HOST").unwrap_or_else(|| DEFAULT_TRACE_HOST.into()),
                sample_rate,
                debug: get("QUILL_TRACE_DEBUG").as_deref() == Some("true"),
            },
            trace_ttl: DEFAULT_TRACE_TTL,
            drain_ceiling: DEFAULT_DRAIN_CEILING,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("QUILL_TRACE_PUBLIC_KEY", "pk-test"),
            ("QUILL_TRACE_SECRET_KEY", "secret-test"),
        ])
    }

    fn load(vars: HashMap<&'static str, &'static str>) -> Result<ServerConfig, ConfigError> {
        ServerConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load(base_vars()).unwrap();
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert_eq!(config.llm.model, DEFAULT_MODEL);
        assert_eq!(config.exporter.host, DEFAULT_TRACE_HOST);
        assert!(config.exporter.sample_rate.is_none());
        assert!(!config.exporter.debug);
    }

    #[test]
    fn test_missing_credentials_fail_fast() {
        let mut vars = base_vars();
        vars.remove("QUILL_TRACE_SECRET_KEY");
        assert!(matches!(
            load(vars),
            Err(ConfigError::MissingVar("QUILL_TRACE_SECRET_KEY"))
        ));

        let mut vars = base_vars();
        vars.remove("OPENAI_API_KEY");
        assert!(matches!(load(vars), Err(ConfigError::MissingVar("OPENAI_API_KEY"))));
    }

    #[test]
    fn test_invalid_sample_rate_rejected() {
        let mut vars = base_vars();
        vars.insert("QUILL_TRACE_SAMPLE_RATE", "not-a-number");
        assert!(matches!(
            load(vars),
            Err(ConfigError::InvalidVar("QUILL_TRACE_SAMPLE_RATE"))
        ));

        let mut vars = base_vars();
        vars.insert("QUILL_TRACE_SAMPLE_RATE", "0.25");
        assert_eq!(load(vars).unwrap().exporter.sample_rate, Some(0.25));
    }

    #[test]
    fn test_debug_toggle() {
        let mut vars = base_vars();
        vars.insert("QUILL_TRACE_DEBUG", "true");
        assert!(load(vars).unwrap().exporter.debug);
    }
}
