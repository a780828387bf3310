//! Client configuration

use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::state_machine::WRITING_STAGE_DELAY;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Log output format for the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration for the chat client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the search agent; turns are streamed from `{api_url}/chat_stream/...`
    pub api_url: Url,
    /// Delay between search results and the inferred writing stage
    pub writing_delay: Duration,
    pub log_format: LogFormat,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid SEARCH_CHAT_API_URL `{value}`: {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("SEARCH_CHAT_API_URL must be an http or https url, got `{0}`")]
    UnsupportedScheme(String),
    #[error("invalid SEARCH_CHAT_WRITING_DELAY_MS `{0}`: expected milliseconds, at least 1500")]
    InvalidDelay(String),
    #[error("invalid SEARCH_CHAT_LOG_FORMAT `{0}`: expected `text` or `json`")]
    InvalidLogFormat(String),
}

impl ClientConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            writing_delay: WRITING_STAGE_DELAY,
            log_format: LogFormat::default(),
        }
    }

    /// Hold the writing stage back for `delay`, never less than
    /// [`WRITING_STAGE_DELAY`]
    pub fn with_writing_delay(mut self, delay: Duration) -> Self {
        self.writing_delay = delay.max(WRITING_STAGE_DELAY);
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_url = lookup("SEARCH_CHAT_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = parse_api_url(&raw_url)?;

        // The writing stage may be held back longer, never shown earlier
        let writing_delay = match lookup("SEARCH_CHAT_WRITING_DELAY_MS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(millis) if Duration::from_millis(millis) >= WRITING_STAGE_DELAY => {
                    Duration::from_millis(millis)
                }
                _ => return Err(ConfigError::InvalidDelay(raw)),
            },
            None => WRITING_STAGE_DELAY,
        };

        let log_format = match lookup("SEARCH_CHAT_LOG_FORMAT") {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => return Err(ConfigError::InvalidLogFormat(raw)),
            },
            None => LogFormat::default(),
        };

        Ok(Self {
            api_url,
            writing_delay,
            log_format,
        })
    }
}

fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl {
        value: raw.to_string(),
        source,
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme(raw.to_string()));
    }
    Ok(url)
}
