mod cli;

use crate::cli::{LogFormat, CLI};
use anyhow::Context;
use burrow_batcher::DeleteBatcher;
use burrow_core::Repository;
use burrow_generator::RandomGenerator;
use burrow_shortener::ShortenerService;
use burrow_storage::Store;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    info!(
        listen_addr = %config.listen_addr,
        base_url = %config.base_url,
        log_format = %config.log_format,
        "starting shortener"
    );

    let store = Store::open(&config.store_config())
        .await
        .context("open storage backend")?;
    let store = Arc::new(store);

    let batcher = DeleteBatcher::spawn(Arc::clone(&store), config.batcher_settings());
    let service = ShortenerService::new(
        Arc::clone(&store),
        RandomGenerator::from_entropy(),
        batcher.intake(),
    );
    service.ping().await.context("storage health check")?;

    info!(backend = store.name(), "shortener ready");

    wait_for_termination().await?;

    // The service holds an intake; drop it so the batcher is the last user.
    drop(service);
    batcher.shutdown().await;
    store.close().await.context("close storage backend")?;

    info!("shortener stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_termination() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("listen for ctrl-c")?;
    info!("received ctrl-c");
    Ok(())
}
