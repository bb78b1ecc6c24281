use anyhow::{ensure, Context, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_AGENT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirecrawlConfig {
    pub api_key: String,
    #[serde(default = "default_firecrawl_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_AGENT_POLL_INTERVAL_SECS,
            timeout_secs: DEFAULT_AGENT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Raw `user:pass,user:pass` list; parsed by [`crate::credentials::resolve`].
    pub demo_users: Option<String>,
    pub firecrawl: Option<FirecrawlConfig>,
    pub session_secret: Option<String>,
    pub session_ttl_secs: u64,
    pub poll: PollConfig,
}

impl AppConfig {
    /// Build configuration from well-known environment variables.
    pub fn load_from_env() -> Result<Self> {
        preload_env_files();

        let firecrawl = match env_var_non_empty("FIRECRAWL_API_KEY") {
            Ok(api_key) => {
                let endpoint = env_var_non_empty("FIRECRAWL_API_URL")
                    .unwrap_or_else(|_| default_firecrawl_endpoint());
                Some(FirecrawlConfig { api_key, endpoint })
            }
            Err(_) => None,
        };

        let poll = PollConfig {
            interval_secs: env_u64("AGENT_POLL_INTERVAL_SECS")?
                .unwrap_or(DEFAULT_AGENT_POLL_INTERVAL_SECS),
            timeout_secs: env_u64("AGENT_TIMEOUT_SECS")?.unwrap_or(DEFAULT_AGENT_TIMEOUT_SECS),
        };
        ensure!(
            poll.interval_secs > 0 && poll.timeout_secs > 0,
            "AGENT_POLL_INTERVAL_SECS and AGENT_TIMEOUT_SECS must be positive"
        );

        let session_ttl_secs = env_u64("SESSION_TTL_SECS")?.unwrap_or(DEFAULT_SESSION_TTL_SECS);
        ensure!(session_ttl_secs > 0, "SESSION_TTL_SECS must be positive");

        Ok(Self {
            demo_users: env_var_non_empty("DEMO_USERS").ok(),
            firecrawl,
            session_secret: env_var_non_empty("SESSION_SECRET").ok(),
            session_ttl_secs,
            poll,
        })
    }

    /// Helper that forces the presence of the Firecrawl API configuration.
    pub fn require_firecrawl_config(&self) -> Result<&FirecrawlConfig> {
        let config = self.firecrawl.as_ref().context(
            "Firecrawl is not configured: set FIRECRAWL_API_KEY (see .env.example)",
        )?;

        ensure!(
            !config.api_key.trim().is_empty() && !config.endpoint.trim().is_empty(),
            "FIRECRAWL_API_KEY and FIRECRAWL_API_URL must not be blank"
        );

        Ok(config)
    }

    /// Helper that forces the presence of the session signing secret.
    pub fn require_session_secret(&self) -> Result<&str> {
        let secret = self
            .session_secret
            .as_deref()
            .context("SESSION_SECRET is not set: sessions cannot be signed without it")?;

        ensure!(
            secret.len() >= 16,
            "SESSION_SECRET must be at least 16 characters long"
        );

        Ok(secret)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

fn env_var_non_empty(key: &str) -> Result<String, env::VarError> {
    let value = env::var(key)?;
    if value.trim().is_empty() {
        return Err(env::VarError::NotPresent);
    }
    Ok(value)
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match env_var_non_empty(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(None),
    }
}

fn default_firecrawl_endpoint() -> String {
    "https://api.firecrawl.dev".to_string()
}

fn preload_env_files() {
    // .env in the working directory first, then the workspace root.
    let _ = dotenv();

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join("../../.env");
    if candidate.exists() {
        let _ = dotenvy::from_path(candidate);
    }
}
