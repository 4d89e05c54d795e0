use std::env;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other}, expected compact/json")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Capacity of each session's outbound event queue.
    pub session_buffer_size: usize,
    pub history_default_limit: usize,
    pub history_max_limit: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3001,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            session_buffer_size: 256,
            history_default_limit: 50,
            history_max_limit: 100,
            allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: parse_or_default("LOG_FORMAT", defaults.log_format)?,
            session_buffer_size: parse_or_default(
                "SESSION_BUFFER_SIZE",
                defaults.session_buffer_size,
            )?,
            history_default_limit: parse_or_default(
                "HISTORY_DEFAULT_LIMIT",
                defaults.history_default_limit,
            )?,
            history_max_limit: parse_or_default("HISTORY_MAX_LIMIT", defaults.history_max_limit)?,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|raw| parse_origins(&raw))
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.session_buffer_size == 0 {
            return Err(AppError::Internal(
                "SESSION_BUFFER_SIZE must be > 0".to_string(),
            ));
        }

        if self.history_default_limit == 0 || self.history_default_limit > self.history_max_limit
        {
            return Err(AppError::Internal(
                "HISTORY_DEFAULT_LIMIT must be in 1..=HISTORY_MAX_LIMIT".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
