//! CLI handler for the `init` subcommand

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{InitArgs, QueueArgs};
use decision_queue::QueuePaths;

pub fn execute(args: InitArgs, queue: &QueueArgs) -> Result<()> {
    let config = queue.resolve()?;
    let paths = QueuePaths::new(&config.queue_dir);
    paths.ensure()?;
    info!("Queue directories ready under {}", paths.root.display());

    if queue.config.exists() && !args.force {
        println!("Config {} already exists, leaving it alone", queue.config.display());
    } else {
        let yaml = config.to_yaml()?;
        std::fs::write(&queue.config, yaml)
            .with_context(|| format!("Failed to write {}", queue.config.display()))?;
        println!("Wrote {}", queue.config.display());
    }

    println!("Queue ready at {}", paths.root.display());
    println!("  pending:   {}", paths.pending.display());
    println!("  completed: {}", paths.completed.display());
    println!("  notify:    {}", paths.notify.display());
    Ok(())
}
