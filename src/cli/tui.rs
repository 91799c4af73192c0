//! TUI command - launches the interactive terminal UI

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::cli::QueueArgs;
use crate::tui::{run_tui, TuiConfig};
use decision_queue::{QueueManager, QueuePaths};

pub async fn execute(queue: &QueueArgs) -> Result<()> {
    let config = queue.resolve()?;
    let manager = Arc::new(QueueManager::new(
        QueuePaths::new(&config.queue_dir),
        config.watcher.clone(),
    ));
    manager.init().await?;

    let tui_config = TuiConfig {
        manager: Arc::clone(&manager),
        custom_input_ttl: config.custom_input_ttl(),
    };

    // The terminal loop blocks; keep it off the runtime so the watcher runs
    let result = tokio::task::spawn_blocking(move || run_tui(tui_config))
        .await
        .context("TUI thread panicked");

    manager.shutdown().await;
    result?
}
