//! Service configuration from environment variables
//!
//! - `TRACESCOPE_HOST`: bind address (default `0.0.0.0`)
//! - `TRACESCOPE_PORT`: port number (default `8080`)
//! - `TRACESCOPE_API_KEY`: backend API key (required)
//! - `TRACESCOPE_SPACE_ID`: backend space identifier (required)
//! - `TRACESCOPE_REST_URL`: REST API base (default `https://api.arize.com/v2`)
//! - `TRACESCOPE_GRAPHQL_URL`: GraphQL endpoint (default `https://app.arize.com/graphql`)
//! - `TRACESCOPE_EXPORT_URL`: span export bridge (default `{rest_url}/spans/export`)
//! - `TRACESCOPE_SOURCE_TIMEOUT_SECS`: per-source timeout (default `30`)
//! - `TRACESCOPE_USAGE_FIELDS`: comma-separated numeric usage columns

use std::time::Duration;

use crate::data::span::DEFAULT_USAGE_FIELDS;
use crate::source::BackendSettings;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REST_URL: &str = "https://api.arize.com/v2";
pub const DEFAULT_GRAPHQL_URL: &str = "https://app.arize.com/graphql";
pub const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub space_id: String,
    pub rest_url: String,
    pub graphql_url: String,
    pub export_url: String,
    pub source_timeout: Duration,
    pub usage_fields: Vec<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let port = match get("TRACESCOPE_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                var: "TRACESCOPE_PORT",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let source_timeout = match get("TRACESCOPE_SOURCE_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "TRACESCOPE_SOURCE_TIMEOUT_SECS",
                        value: raw,
                        reason: "expected a positive number of seconds".to_string(),
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_SOURCE_TIMEOUT_SECS),
        };

        let usage_fields = get("TRACESCOPE_USAGE_FIELDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|fields| !fields.is_empty())
            .unwrap_or_else(|| DEFAULT_USAGE_FIELDS.iter().map(|f| f.to_string()).collect());

        let rest_url = get("TRACESCOPE_REST_URL")
            .unwrap_or_else(|| DEFAULT_REST_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let export_url =
            get("TRACESCOPE_EXPORT_URL").unwrap_or_else(|| format!("{}/spans/export", rest_url));

        Ok(Self {
            host: get("TRACESCOPE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            api_key: require("TRACESCOPE_API_KEY")?,
            space_id: require("TRACESCOPE_SPACE_ID")?,
            graphql_url: get("TRACESCOPE_GRAPHQL_URL").unwrap_or_else(|| DEFAULT_GRAPHQL_URL.to_string()),
            rest_url,
            export_url,
            source_timeout,
            usage_fields,
        })
    }

    /// HTTP client settings; the client timeout matches the source timeout
    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            api_key: self.api_key.clone(),
            space_id: self.space_id.clone(),
            rest_url: self.rest_url.clone(),
            graphql_url: self.graphql_url.clone(),
            export_url: self.export_url.clone(),
            http_timeout: self.source_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
