//! Chat client configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 16 * 1024;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid boolean for {var}: {value}")]
    InvalidBool { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Duplex endpoint, e.g. `wss://abc.execute-api.us-east-1.amazonaws.com/prod`.
    pub endpoint: Option<String>,
    /// Assistant persona sent with each prompt.
    pub role: String,
    /// Most recent entries sent back as context with each prompt.
    pub history_limit: usize,
    /// When false, prompts go out with an empty history.
    pub send_history: bool,
    /// When false, committed bot entries carry no citations.
    pub display_sources: bool,
    /// Bound on raw bytes held while waiting for a partial frame to complete.
    pub max_buffered_bytes: usize,
    /// Per-request bound; `0` disables the timeout.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            role: frames::DEFAULT_ROLE.to_owned(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            send_history: true,
            display_sources: true,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Config with defaults for everything but the endpoint.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self { endpoint: Some(endpoint.into()), ..Self::default() }
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `TOBI_WS_URL`: duplex endpoint; unset leaves the client disconnected
    /// - `TOBI_ROLE`: default `researchAssistant`
    /// - `TOBI_HISTORY_LIMIT`: default 20
    /// - `TOBI_SEND_HISTORY`: default true
    /// - `TOBI_DISPLAY_SOURCES`: default true
    /// - `TOBI_MAX_BUFFERED_BYTES`: default 16384
    /// - `TOBI_REQUEST_TIMEOUT_SECS`: default 120, `0` disables
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBool`] when a boolean variable is set to
    /// something other than `true`/`false`/`1`/`0`/`yes`/`no`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = std::env::var("TOBI_WS_URL")
            .ok()
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty());
        let role = std::env::var("TOBI_ROLE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| frames::DEFAULT_ROLE.to_owned());

        Ok(Self {
            endpoint,
            role,
            history_limit: env_parse("TOBI_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT),
            send_history: env_bool("TOBI_SEND_HISTORY", true)?,
            display_sources: env_bool("TOBI_DISPLAY_SOURCES", true)?,
            max_buffered_bytes: env_parse("TOBI_MAX_BUFFERED_BYTES", DEFAULT_MAX_BUFFERED_BYTES),
            request_timeout_secs: env_parse("TOBI_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    /// Request timeout in milliseconds, or `None` when disabled.
    #[must_use]
    pub fn request_timeout_ms(&self) -> Option<i64> {
        if self.request_timeout_secs == 0 {
            return None;
        }
        i64::try_from(self.request_timeout_secs.saturating_mul(1000)).ok()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(default);
    };
    parse_bool(&raw).ok_or(ConfigError::InvalidBool { var: key, value: raw })
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
