use std::net::SocketAddr;
use std::time::Duration;

use ::config::{Config, ConfigError as BuilderError, Environment, File};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub runtime_env: Option<RuntimeEnvConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServerSettings {
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub deployment: Option<DeploymentConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RuntimeEnvConfig {
    #[serde(default)]
    pub http_proxy: Option<String>,
    #[serde(default)]
    pub https_proxy: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid socket address: {0}")]
    InvalidAddr(String),
    #[error("configuration load failed: {0}")]
    Load(#[from] BuilderError),
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl ServerSettings {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self
            .server
            .as_ref()
            .map(|server| server.bind.clone())
            .unwrap_or_else(default_bind);

        bind.parse().map_err(|_| ConfigError::InvalidAddr(bind))
    }

    /// HTTP-layer request timeout. Never shorter than the agent poll deadline
    /// plus a margin, so a legitimate agent call is not cut off by the server.
    pub fn request_timeout(&self, agent_timeout: Duration) -> Duration {
        let floor = agent_timeout + REQUEST_TIMEOUT_MARGIN;
        match self.server.as_ref().and_then(|s| s.request_timeout_secs) {
            Some(secs) if Duration::from_secs(secs) >= floor => Duration::from_secs(secs),
            Some(secs) => {
                tracing::warn!(
                    configured_secs = secs,
                    floor_secs = floor.as_secs(),
                    "request timeout is shorter than the agent deadline, raising it"
                );
                floor
            }
            None => floor,
        }
    }

    pub fn apply_runtime_env(&self) {
        if let Some(deployment) = &self.deployment {
            if let Some(runtime) = &deployment.runtime_env {
                if let Some(proxy) = &runtime.http_proxy {
                    std::env::set_var("HTTP_PROXY", proxy);
                    std::env::set_var("http_proxy", proxy);
                }
                if let Some(proxy) = &runtime.https_proxy {
                    std::env::set_var("HTTPS_PROXY", proxy);
                    std::env::set_var("https_proxy", proxy);
                }
            }
        }
    }
}

pub fn load_server_settings() -> Result<ServerSettings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name(DEFAULT_CONFIG_PATH).required(false));

    builder = builder.add_source(Environment::with_prefix("DASHBOARD").separator("__"));

    let settings: ServerSettings = builder.build()?.try_deserialize()?;

    Ok(settings)
}
