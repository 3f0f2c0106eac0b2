use std::net::SocketAddr;

use llm_common::messages::MessagesClientConfig;

use crate::error::AppError;

/// Service configuration loaded once from environment variables at startup.
///
/// A missing provider key is not a startup failure: the server still comes up so `/health`
/// can report it, and every analysis request fails fast instead.
#[derive(Clone)]
pub struct Config {
    /// Provider credential. `None` when neither key variable is set (or both are blank).
    pub api_key: Option<String>,
    pub bind_addr: SocketAddr,
    /// Deployment label reported by `/health` (e.g. "production", "staging").
    pub environment: String,
    pub messages: MessagesClientConfig,
}

impl Config {
    /// Optional:
    /// - `ANTHROPIC_API_KEY` (falls back to the legacy `CLAUDE_API_KEY`)
    /// - `BIND_ADDR` (default: "0.0.0.0:3000")
    /// - `APP_ENV` (default: "production")
    /// - `ANTHROPIC_*` client settings, see `MessagesClientConfig::from_env`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let api_key = ["ANTHROPIC_API_KEY", "CLAUDE_API_KEY"]
            .iter()
            .filter_map(|name| lookup(*name))
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty());

        let bind_addr = lookup("BIND_ADDR")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("BIND_ADDR is not a socket address: {e}")))?;

        let environment = lookup("APP_ENV")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "production".to_string());

        Ok(Self {
            api_key,
            bind_addr,
            environment,
            messages: MessagesClientConfig::from_lookup(&lookup),
        })
    }

    pub fn api_key_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("bind_addr", &self.bind_addr)
            .field("environment", &self.environment)
            .field("messages", &self.messages)
            .finish()
    }
}
