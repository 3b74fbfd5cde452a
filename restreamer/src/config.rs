//! Process configuration read from the environment.
//!
//! `.env` is loaded by `main` through dotenvy before this runs. Log settings are
//! read separately by [`crate::logging::LogSettings`].

use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:restreamer.db?mode=rwc";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 12580;
pub const DEFAULT_PROJECT_NAME: &str = "restream";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_MAX_CONCURRENT_ACTIONS: usize = 4;

/// Everything the process needs to wire itself up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_address: String,
    pub port: u16,
    /// Prefix of every channel and input name created on the encoding service.
    pub project_name: String,
    pub source_status_url: String,
    pub source_playback_url: String,
    pub encoder_api_url: String,
    pub encoder_api_token: Option<String>,
    pub poll_interval: Duration,
    pub call_timeout: Duration,
    pub max_concurrent_actions: usize,
}

impl AppConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let required =
            |key: &str| get(key).ok_or_else(|| Error::config(format!("{key} is not set")));

        let source_status_url = required("SOURCE_STATUS_URL")?;
        let source_playback_url = required("SOURCE_PLAYBACK_URL")?;
        let encoder_api_url = required("ENCODER_API_URL")?;
        for (key, value) in [
            ("SOURCE_STATUS_URL", &source_status_url),
            ("ENCODER_API_URL", &encoder_api_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::config(format!("{key} is not a valid URL: {e}")))?;
        }

        let poll_secs: u64 = parse_or(&get, "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_secs == 0 {
            return Err(Error::config("POLL_INTERVAL_SECS must be greater than 0"));
        }
        let timeout_secs: u64 =
            parse_or(&get, "EXTERNAL_CALL_TIMEOUT_SECS", DEFAULT_CALL_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(Error::config(
                "EXTERNAL_CALL_TIMEOUT_SECS must be greater than 0",
            ));
        }

        Ok(Self {
            database_url: or("DATABASE_URL", DEFAULT_DATABASE_URL),
            bind_address: or("API_BIND_ADDRESS", DEFAULT_BIND_ADDRESS),
            port: parse_or(&get, "API_PORT", DEFAULT_PORT)?,
            project_name: or("PROJECT_NAME", DEFAULT_PROJECT_NAME),
            source_status_url,
            source_playback_url,
            encoder_api_url,
            encoder_api_token: get("ENCODER_API_TOKEN"),
            poll_interval: Duration::from_secs(poll_secs),
            call_timeout: Duration::from_secs(timeout_secs),
            max_concurrent_actions: parse_or(
                &get,
                "MAX_CONCURRENT_ACTIONS",
                DEFAULT_MAX_CONCURRENT_ACTIONS,
            )?
            .max(1),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("{key}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn required_only() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SOURCE_STATUS_URL", "http://source.local/status"),
            ("SOURCE_PLAYBACK_URL", "rtmp://source.local/live/main"),
            ("ENCODER_API_URL", "http://encoder.local/api"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<AppConfig> {
        AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&required_only()).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.port, 12580);
        assert_eq!(config.project_name, "restream");
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.call_timeout, Duration::from_secs(20));
        assert_eq!(config.max_concurrent_actions, 4);
        assert!(config.encoder_api_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let mut vars = required_only();
        vars.insert("API_PORT", "8080");
        vars.insert("POLL_INTERVAL_SECS", "5");
        vars.insert("ENCODER_API_TOKEN", "secret");
        vars.insert("MAX_CONCURRENT_ACTIONS", "0");

        let config = load(&vars).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.encoder_api_token.as_deref(), Some("secret"));
        assert_eq!(config.max_concurrent_actions, 1);
    }

    #[test]
    fn test_missing_required() {
        let mut vars = required_only();
        vars.remove("ENCODER_API_URL");
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("ENCODER_API_URL")));
    }

    #[test]
    fn test_blank_counts_as_missing() {
        let mut vars = required_only();
        vars.insert("SOURCE_PLAYBACK_URL", "   ");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_unparsable_values() {
        let mut vars = required_only();
        vars.insert("API_PORT", "eighty");
        assert!(matches!(load(&vars), Err(Error::Configuration(_))));

        let mut vars = required_only();
        vars.insert("POLL_INTERVAL_SECS", "0");
        assert!(matches!(load(&vars), Err(Error::Configuration(_))));

        let mut vars = required_only();
        vars.insert("SOURCE_STATUS_URL", "not a url");
        assert!(matches!(load(&vars), Err(Error::Configuration(_))));
    }
}
