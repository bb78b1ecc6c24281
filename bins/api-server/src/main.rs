use std::fs;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use dash_core::{AppConfig, CredentialStore, SessionAuthenticator};
use firecrawl::{FirecrawlClient, ScrapeBackend};
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

mod config;
mod envelope;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use config::load_server_settings;
use state::AppState;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Reads `.env` first so the DASHBOARD__ overrides below can come from it too.
    let app_config = AppConfig::load_from_env().context("failed to load environment config")?;

    let settings = load_server_settings().unwrap_or_else(|err| {
        warn!("failed to load server config: {err}, using defaults");
        Default::default()
    });
    settings.apply_runtime_env();

    let secret = app_config.require_session_secret()?;
    let store = Arc::new(CredentialStore::from_config(app_config.demo_users.as_deref()));
    warn!("demo credentials are held in plaintext memory; do not reuse real passwords");
    let auth = SessionAuthenticator::new(store.clone(), secret, app_config.session_ttl());

    let client = FirecrawlClient::from_app_config(&app_config);
    let backend: Option<Arc<dyn ScrapeBackend>> = match client {
        Ok(client) => {
            info!(
                timeout_secs = client.poll_settings().timeout.as_secs(),
                "Firecrawl client ready"
            );
            Some(Arc::new(client))
        }
        Err(err) => {
            warn!(%err, "Firecrawl client unavailable, tool routes will report an error");
            None
        }
    };

    let bind_addr = settings.bind_addr().unwrap_or_else(|err| {
        warn!(%err, "falling back to default bind address");
        SocketAddr::from(([0, 0, 0, 0], 3000))
    });
    let request_timeout = settings.request_timeout(app_config.poll.timeout());

    let state = AppState {
        store,
        auth,
        backend,
    };
    let router = routes::build_router(state, request_timeout);

    info!(
        request_timeout_secs = request_timeout.as_secs(),
        "Starting API server on {bind_addr}"
    );

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn init_tracing() {
    let log_dir = std::path::Path::new("logs");
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log directory {log_dir:?}: {err}");
    }

    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(log_dir, "api-server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let env_filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());

    let fmt_stdout = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);
    let fmt_file = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt_stdout)
        .with(fmt_file);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("tracing already initialised");
    }
}
