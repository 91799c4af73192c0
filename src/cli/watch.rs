//! CLI handler for the `watch` subcommand

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::cli::QueueArgs;
use decision_queue::{QueueManager, QueuePaths};

pub async fn execute(queue: &QueueArgs) -> Result<()> {
    let config = queue.resolve()?;
    let manager = Arc::new(QueueManager::new(
        QueuePaths::new(&config.queue_dir),
        config.watcher.clone(),
    ));

    manager.init().await?;
    let stats = manager.stats();
    println!(
        "Watching {} ({} plans, {} open decisions). Ctrl-C to stop.",
        manager.paths().pending.display(),
        stats.total,
        stats.remaining
    );

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");
    manager.shutdown().await;
    Ok(())
}
