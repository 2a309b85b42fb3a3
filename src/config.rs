//! Configuration loaded from the process environment.
//!
//! | Variable                  | Default                                     |
//! |---------------------------|---------------------------------------------|
//! | `LETTA_BASE_URL`          | `http://localhost:8283`                     |
//! | `LETTA_API_TOKEN`         | unset                                       |
//! | `LETTA_TIMEOUT_SECS`      | `60`                                        |
//! | `LETTA_BROADCAST_TOOL_ID` | `tool-87868ef9-46d1-43a7-aa95-7698a3968317` |

use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8283";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Server-side id of the `send_message_to_agents_matching_all_tags` tool.
pub const DEFAULT_BROADCAST_TOOL_ID: &str = "tool-87868ef9-46d1-43a7-aa95-7698a3968317";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid base URL '{value}': {reason}")]
    InvalidBaseUrl { value: String, reason: String },

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Console configuration.
#[derive(Clone)]
pub struct Config {
    /// Root of the agent server (without the `/v1` prefix)
    pub base_url: Url,

    /// Bearer token for the agent server, if it requires one
    pub api_token: Option<String>,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Tool id attached to supervisory agents on modify
    pub broadcast_tool_id: String,
}

impl Config {
    /// Read configuration from the environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a local `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = parse_base_url(
            &non_empty("LETTA_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        )?;

        let request_timeout = match non_empty("LETTA_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidValue {
                    var: "LETTA_TIMEOUT_SECS",
                    value: raw,
                })?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            base_url,
            api_token: non_empty("LETTA_API_TOKEN"),
            request_timeout,
            broadcast_tool_id: non_empty("LETTA_BROADCAST_TOOL_ID")
                .unwrap_or_else(|| DEFAULT_BROADCAST_TOOL_ID.to_string()),
        })
    }

    pub fn with_base_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.base_url = parse_base_url(raw)?;
        Ok(self)
    }

    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        if token.is_some() {
            self.api_token = token;
        }
        self
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .field("broadcast_tool_id", &self.broadcast_tool_id)
            .finish()
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        value: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    Ok(url)
}
