use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use relay_hub::connections::MemoryConnectionStore;
use relay_hub::settings::LOG_ENV_VAR;
use relay_hub::{RelayServer, Settings};

#[tokio::main]
async fn main() -> relay_hub::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args().nth(1);
    let settings = Settings::load(path.as_deref())?;

    let server = RelayServer::new(
        settings.server_config()?,
        settings.broadcast_config()?,
        Arc::new(MemoryConnectionStore::new()),
    )?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await
}
