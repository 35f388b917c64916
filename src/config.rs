use crate::services::batching::DEFAULT_BATCH_SIZE;
use crate::services::enrichment::{EnrichmentSettings, DEFAULT_BASE_URL, DEFAULT_MODEL};
use sqlx::mysql::MySqlConnectOptions;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,
}

impl DatabaseConfig {
    /// Credentials are passed as-is, so passwords may contain `#`, `/` or `?`.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub database: DatabaseConfig,
    pub enrichment: EnrichmentSettings,
    pub batch_size: NonZeroUsize,
}

fn var(key: &'static str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn var_or(key: &'static str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

fn parsed_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

pub fn parse_batch_size(value: usize) -> Result<NonZeroUsize, ConfigError> {
    NonZeroUsize::new(value).ok_or(ConfigError::Invalid {
        key: "BATCH_SIZE",
        value: value.to_string(),
    })
}

/// A zero timeout would fail every request before it is sent.
pub fn parse_request_timeout(secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key: "REQUEST_TIMEOUT_SECS",
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a local `.env` file.
    ///
    /// The API key may be empty here; the enrichment client rejects it before
    /// any request is made. Database credentials are only checked by
    /// [`Config::require_database`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let database = DatabaseConfig {
            user: var_or("DB_USER", ""),
            password: var_or("DB_PWD", ""),
            host: var_or("DB_HOST", "127.0.0.1"),
            port: parsed_var("DB_PORT", 3306)?,
            name: var_or("DB_NAME", "book"),
        };

        let enrichment = EnrichmentSettings {
            base_url: var_or("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            model: var_or("OPENAI_MODEL", DEFAULT_MODEL),
            timeout: parse_request_timeout(parsed_var("REQUEST_TIMEOUT_SECS", 60)?)?,
            max_retries: parsed_var("MAX_RETRIES", 2)?,
            ..EnrichmentSettings::default()
        };

        Ok(Self {
            api_key: var_or("OPENAPI_KEY", ""),
            database,
            enrichment,
            batch_size: parse_batch_size(parsed_var("BATCH_SIZE", DEFAULT_BATCH_SIZE)?)?,
        })
    }

    pub fn require_database(&self) -> Result<&DatabaseConfig, ConfigError> {
        if self.database.user.is_empty() {
            return Err(ConfigError::Missing("DB_USER"));
        }
        if self.database.password.is_empty() {
            return Err(ConfigError::Missing("DB_PWD"));
        }
        Ok(&self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_options_keep_reserved_characters_in_credentials() {
        let database = DatabaseConfig {
            user: "re@der".to_string(),
            password: "p#ss/w?rd".to_string(),
            host: "db.internal".to_string(),
            port: 3307,
            name: "book".to_string(),
        };
        let options = format!("{:?}", database.connect_options());
        assert!(options.contains("\"p#ss/w?rd\""), "{}", options);
        assert!(options.contains("\"re@der\""), "{}", options);
        assert!(options.contains("\"db.internal\""), "{}", options);
        assert!(options.contains("3307"), "{}", options);
    }

    #[test]
    fn zero_request_timeout_is_rejected() {
        assert!(matches!(
            parse_request_timeout(0),
            Err(ConfigError::Invalid { key: "REQUEST_TIMEOUT_SECS", .. })
        ));
        assert_eq!(parse_request_timeout(60).unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(parse_batch_size(0).is_err());
        assert_eq!(parse_batch_size(40).unwrap().get(), 40);
    }

    #[test]
    fn missing_credentials_are_reported() {
        let config = Config {
            api_key: String::new(),
            database: DatabaseConfig {
                user: "reader".to_string(),
                password: String::new(),
                host: "127.0.0.1".to_string(),
                port: 3306,
                name: "book".to_string(),
            },
            enrichment: EnrichmentSettings::default(),
            batch_size: parse_batch_size(40).unwrap(),
        };
        assert!(matches!(config.require_database(), Err(ConfigError::Missing("DB_PWD"))));
    }
}
