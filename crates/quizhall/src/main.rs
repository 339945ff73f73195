use std::sync::Arc;

use quizhall::{QuizhallError, QuizhallServerBuilder, ServerConfig};
use quizhall_session::StoreSessionResolver;
use quizhall_store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), QuizhallError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url, config.store_timeout).await?;
            serve(&config, Arc::new(store)).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            serve(&config, Arc::new(MemoryStore::new())).await
        }
    }
}

async fn serve<S: Store>(config: &ServerConfig, store: Arc<S>) -> Result<(), QuizhallError> {
    let resolver = StoreSessionResolver::new(Arc::clone(&store));
    let server = QuizhallServerBuilder::from_config(config)
        .build(Arc::clone(&store), resolver)
        .await?;

    tokio::select! {
        result = server.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down");
        }
    }

    server.shutdown().await;
    store.clear_live_state().await?;
    tracing::info!("live room state cleared");
    Ok(())
}
