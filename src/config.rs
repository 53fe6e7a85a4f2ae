//! Client configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TOGGLE_COOLDOWN_MS: u64 = 300;
pub const DEFAULT_PERSIST_COOLDOWN_MS: u64 = 2000;
pub const DEFAULT_AI_COOLDOWN_MS: u64 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid API base URL '{0}' (expected http:// or https://)")]
    InvalidBaseUrl(String),
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl HttpTimeouts {
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

/// Cooldowns applied by the three guard presets after an action settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldowns {
    pub toggle_ms: u64,
    pub persist_ms: u64,
    pub ai_ms: u64,
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self {
            toggle_ms: DEFAULT_TOGGLE_COOLDOWN_MS,
            persist_ms: DEFAULT_PERSIST_COOLDOWN_MS,
            ai_ms: DEFAULT_AI_COOLDOWN_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: String,
    pub timeouts: HttpTimeouts,
    pub cooldowns: Cooldowns,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_owned(),
            timeouts: HttpTimeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            cooldowns: Cooldowns::default(),
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// All optional:
    /// - `NOTES_API_BASE`: default `http://127.0.0.1:8000/api`
    /// - `NOTES_REQUEST_TIMEOUT_SECS`: default 300
    /// - `NOTES_CONNECT_TIMEOUT_SECS`: default 10
    /// - `NOTES_TOGGLE_COOLDOWN_MS`: default 300
    /// - `NOTES_PERSIST_COOLDOWN_MS`: default 2000
    /// - `NOTES_AI_COOLDOWN_MS`: default 3000
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not http(s) or the request
    /// timeout is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base = std::env::var("NOTES_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_owned());
        let config = Self {
            api_base: normalize_base(&api_base)?,
            timeouts: HttpTimeouts {
                request_secs: env_parse("NOTES_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
                connect_secs: env_parse("NOTES_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
            },
            cooldowns: Cooldowns {
                toggle_ms: env_parse("NOTES_TOGGLE_COOLDOWN_MS", DEFAULT_TOGGLE_COOLDOWN_MS),
                persist_ms: env_parse("NOTES_PERSIST_COOLDOWN_MS", DEFAULT_PERSIST_COOLDOWN_MS),
                ai_ms: env_parse("NOTES_AI_COOLDOWN_MS", DEFAULT_AI_COOLDOWN_MS),
            },
        };
        if config.timeouts.request_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(config)
    }

    /// Replace the base URL, applying the same validation as `from_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s).
    pub fn with_api_base(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.api_base = normalize_base(raw)?;
        Ok(self)
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn normalize_base(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl(raw.to_owned()));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
