mod assemble;
mod config;
mod error;
mod model;
mod normalize;
mod pipeline;
mod presets;
mod prompt;
mod server;
mod validate;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use llm_common::messages::MessagesClient;

use config::Config;
use pipeline::Analyzer;
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting writing-rater");

    let config = Config::from_env()?;
    info!(
        bind_addr = %config.bind_addr,
        environment = %config.environment,
        base_url = %config.messages.base_url,
        model = %config.messages.model,
        max_tokens = config.messages.max_tokens,
        timeout_ms = config.messages.timeout.as_millis() as u64,
        api_key_configured = config.api_key_configured(),
        "configuration loaded"
    );

    // The key is read once here; requests never look at the environment.
    let gateway = match &config.api_key {
        Some(key) => Some(Arc::new(MessagesClient::new(
            config.messages.clone(),
            key.clone(),
        )?)),
        None => {
            warn!("no provider API key configured, analysis requests will fail with SERVICE_ERROR");
            None
        }
    };

    let state = AppState::new(Analyzer::new(gateway), config.environment.clone());

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server ready");

    server::serve(listener, state).await.inspect_err(|e| {
        tracing::error!(error = %e, "HTTP server error");
    })?;

    info!("HTTP server shut down");
    Ok(())
}
