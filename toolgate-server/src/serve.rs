//! Running the broker as a standalone server.

use std::sync::Arc;
use std::time::Duration;

use toolgate_core::authorization::{AuthorizationBroker, DEFAULT_REQUEST_TTL};

use crate::router::BrokerRouter;
use crate::sweeper::{spawn_sweeper, DEFAULT_SWEEP_INTERVAL};

/// Listener and broker settings for [`serve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    pub bind: String,
    pub port: u16,
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
            ttl: DEFAULT_REQUEST_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Bind, serve until Ctrl-C, then stop the sweeper.
pub async fn serve(config: ServeConfig) -> anyhow::Result<()> {
    let broker = Arc::new(AuthorizationBroker::new().with_ttl(config.ttl));
    let sweeper = spawn_sweeper(broker.clone(), config.sweep_interval);
    let app = BrokerRouter::from_arc(broker).build()?;

    let listener = tokio::net::TcpListener::bind((config.bind.as_str(), config.port)).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        ttl_secs = config.ttl.as_secs(),
        sweep_secs = config.sweep_interval.as_secs(),
        "toolgate listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("toolgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
