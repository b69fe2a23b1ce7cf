use std::path::PathBuf;

use thiserror::Error;

use crate::feed::{FeedShape, DEFAULT_PAGE_SIZE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Feed
    pub feed_path: PathBuf,
    pub feed_shape: FeedShape,
    pub legacy_feed_path: Option<PathBuf>,
    pub page_size: usize,

    // Cache
    pub database_path: PathBuf,
    pub cache_on_startup: bool,
    pub read_from_cache: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Feed
            feed_path: PathBuf::from(env_or_default("FEED_PATH", "./data/BlogData.json")),
            feed_shape: parse_feed_shape(&env_or_default("FEED_SHAPE", "canonical"))?,
            legacy_feed_path: optional_env("LEGACY_FEED_PATH").map(PathBuf::from),
            page_size: parse_env_usize("PAGE_SIZE", DEFAULT_PAGE_SIZE)?,

            // Cache
            database_path: PathBuf::from(env_or_default(
                "DATABASE_PATH",
                "./data/blog_cache.sqlite",
            )),
            cache_on_startup: parse_env_bool("CACHE_ON_STARTUP", true)?,
            read_from_cache: parse_env_bool("READ_FROM_CACHE", false)?,
        })
    }

    /// Defaults without touching the environment.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            feed_path: PathBuf::from("./data/BlogData.json"),
            feed_shape: FeedShape::Canonical,
            legacy_feed_path: None,
            page_size: DEFAULT_PAGE_SIZE,
            database_path: PathBuf::from("./data/blog_cache.sqlite"),
            cache_on_startup: true,
            read_from_cache: false,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PAGE_SIZE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.feed_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "FEED_PATH".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.legacy_feed_path.as_ref() == Some(&self.feed_path) {
            return Err(ConfigError::InvalidValue {
                name: "LEGACY_FEED_PATH".to_string(),
                message: "must differ from FEED_PATH".to_string(),
            });
        }
        Ok(())
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_feed_shape(value: &str) -> Result<FeedShape, ConfigError> {
    FeedShape::from_str(&value.to_lowercase()).ok_or_else(|| ConfigError::InvalidValue {
        name: "FEED_SHAPE".to_string(),
        message: format!("must be 'canonical' or 'legacy', got '{value}'"),
    })
}
