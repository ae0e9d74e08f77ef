//! Client configuration from environment variables.

use std::time::Duration;

use thiserror::Error;

pub const API_URL_ENV: &str = "PANTRY_API_URL";
pub const PUSH_URL_ENV: &str = "PANTRY_PUSH_URL";
pub const AUTH_TOKEN_ENV: &str = "PANTRY_AUTH_TOKEN";
pub const RECONNECT_DELAY_ENV: &str = "PANTRY_RECONNECT_DELAY_MS";
pub const PRODUCTS_REFRESH_ENV: &str = "PANTRY_PRODUCTS_REFRESH_SECS";
pub const ALERTS_REFRESH_ENV: &str = "PANTRY_ALERTS_REFRESH_SECS";
pub const ALERTS_OFFSET_ENV: &str = "PANTRY_ALERTS_REFRESH_OFFSET_SECS";
pub const ACTIVITY_WINDOW_ENV: &str = "PANTRY_ACTIVITY_WINDOW";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// REST base, e.g. `http://localhost:5000/api` (no trailing slash).
    pub api_url: String,
    pub push_url: String,
    pub auth_token: Option<String>,
    pub reconnect_delay: Duration,
    pub products_refresh: Duration,
    pub alerts_refresh: Duration,
    pub alerts_refresh_offset: Duration,
    pub activity_window: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000/api".to_string(),
            push_url: "ws://localhost:5000/ws".to_string(),
            auth_token: None,
            reconnect_delay: Duration::from_millis(3000),
            products_refresh: Duration::from_secs(30),
            alerts_refresh: Duration::from_secs(60),
            alerts_refresh_offset: Duration::from_secs(10),
            activity_window: 10,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset or blank variables keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(url) = get(API_URL_ENV) {
            config.api_url = parse_url(API_URL_ENV, url, &["http://", "https://"])?;
        }
        if let Some(url) = get(PUSH_URL_ENV) {
            config.push_url = parse_url(PUSH_URL_ENV, url, &["ws://", "wss://"])?;
        }
        config.auth_token = get(AUTH_TOKEN_ENV);

        if let Some(raw) = get(RECONNECT_DELAY_ENV) {
            config.reconnect_delay = Duration::from_millis(parse_positive(RECONNECT_DELAY_ENV, raw)?);
        }
        if let Some(raw) = get(PRODUCTS_REFRESH_ENV) {
            config.products_refresh = Duration::from_secs(parse_positive(PRODUCTS_REFRESH_ENV, raw)?);
        }
        if let Some(raw) = get(ALERTS_REFRESH_ENV) {
            config.alerts_refresh = Duration::from_secs(parse_positive(ALERTS_REFRESH_ENV, raw)?);
        }
        if let Some(raw) = get(ALERTS_OFFSET_ENV) {
            let secs = raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
                var: ALERTS_OFFSET_ENV,
                value: raw.clone(),
                reason: "expected a whole number of seconds",
            })?;
            config.alerts_refresh_offset = Duration::from_secs(secs);
        }
        if let Some(raw) = get(ACTIVITY_WINDOW_ENV) {
            config.activity_window = parse_positive(ACTIVITY_WINDOW_ENV, raw)? as usize;
        }

        Ok(config)
    }
}

fn parse_url(var: &'static str, url: String, schemes: &[&str]) -> Result<String, ConfigError> {
    if !schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::Invalid {
            var,
            value: url,
            reason: "unsupported URL scheme",
        });
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn parse_positive(var: &'static str, raw: String) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "expected a positive integer",
        }),
    }
}
