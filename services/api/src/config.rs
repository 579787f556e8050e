use pluto_core::{agent, memory, metrics, twitter};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// REST API listener.
    pub bind_address: SocketAddr,
    /// Realtime (WebSocket) listener.
    pub realtime_bind_address: SocketAddr,
    pub model_api_key: String,
    pub model_api_base: String,
    pub chat_model: String,
    pub cookie_api_key: String,
    pub cookie_api_base: String,
    pub auto_interval: Duration,
    pub agent_thread_id: String,
    pub max_agent_steps: usize,
    /// Messages kept in the shared agent thread before the oldest exchanges are evicted.
    pub agent_history_limit: usize,
    pub twitter_access_token: Option<String>,
    pub twitter_api_base: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address: SocketAddr = parse_var("BIND_ADDRESS", "0.0.0.0:3000")?;
        let realtime_bind_address: SocketAddr = parse_var("REALTIME_BIND_ADDRESS", "0.0.0.0:8080")?;

        let model_api_key = required_var("OPENROUTER_API_KEY")?;
        let model_api_base = std::env::var("MODEL_API_BASE")
            .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string());
        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| "openai/gpt-4o-mini".to_string());

        let cookie_api_key = required_var("COOKIE_DAO_API_KEY")?;
        let cookie_api_base = std::env::var("COOKIE_API_BASE")
            .unwrap_or_else(|_| metrics::DEFAULT_BASE_URL.to_string());

        let auto_interval = Duration::from_secs(parse_var("AUTO_INTERVAL_SECS", "10")?);
        let agent_thread_id = std::env::var("AGENT_THREAD_ID")
            .unwrap_or_else(|_| agent::DEFAULT_THREAD_ID.to_string());
        let max_agent_steps: usize =
            parse_var("MAX_AGENT_STEPS", &agent::DEFAULT_MAX_STEPS.to_string())?;
        if max_agent_steps == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_AGENT_STEPS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let agent_history_limit: usize = parse_var(
            "AGENT_HISTORY_LIMIT",
            &memory::DEFAULT_MAX_MESSAGES.to_string(),
        )?;
        if agent_history_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "AGENT_HISTORY_LIMIT".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let twitter_access_token = std::env::var("TWITTER_ACCESS_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        let twitter_api_base = std::env::var("TWITTER_API_BASE")
            .unwrap_or_else(|_| twitter::DEFAULT_API_BASE.to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            realtime_bind_address,
            model_api_key,
            model_api_base,
            chat_model,
            cookie_api_key,
            cookie_api_base,
            auto_interval,
            agent_thread_id,
            max_agent_steps,
            agent_history_limit,
            twitter_access_token,
            twitter_api_base,
            log_level,
        })
    }
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
