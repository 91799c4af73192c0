pub mod decide;
pub mod init;
pub mod list;
pub mod schema;
pub mod show;
pub mod stats;
pub mod tui;
pub mod watch;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use decision_queue::config::CONFIG_FILE;
use decision_queue::{Config, QueueManager, QueuePaths};

#[derive(Parser)]
#[command(name = "dq")]
#[command(
    author,
    version,
    about = "File-backed decision queue: agents enqueue decisions, humans resolve them"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub queue: QueueArgs,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Where the queue lives, shared by every subcommand
#[derive(Args, Clone)]
pub struct QueueArgs {
    /// Path to config file
    #[arg(short, long, global = true, default_value = CONFIG_FILE, env = "DQ_CONFIG")]
    pub config: PathBuf,

    /// Override the queue directory from the config
    #[arg(long, global = true, env = "DQ_QUEUE_DIR")]
    pub queue_dir: Option<PathBuf>,
}

impl QueueArgs {
    /// Config file (or defaults) with CLI overrides applied
    pub fn resolve(&self) -> anyhow::Result<Config> {
        let mut config = Config::load_or_default(&self.config)
            .with_context(|| format!("Failed to load {}", self.config.display()))?;

        if let Some(queue_dir) = &self.queue_dir {
            config.queue_dir = queue_dir.clone();
        }

        config.validate()?;
        debug!("Queue directory: {}", config.queue_dir.display());
        Ok(config)
    }

    /// A manager with the pending directory already scanned once
    pub fn open(&self) -> anyhow::Result<(Config, QueueManager)> {
        let config = self.resolve()?;
        let manager = QueueManager::new(
            QueuePaths::new(&config.queue_dir),
            config.watcher.clone(),
        );
        manager.load()?;
        Ok((config, manager))
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the queue directories and a default config
    Init(InitArgs),

    /// List pending plans, most urgent first
    List(ListArgs),

    /// Show one plan with its decisions
    Show(ShowArgs),

    /// Queue counts by priority
    Stats(StatsArgs),

    /// Answer one decision
    Answer(AnswerArgs),

    /// Skip one decision
    Skip(SkipArgs),

    /// Submit a ready plan and notify its producer
    Submit(SubmitArgs),

    /// Run the engine and log queue changes until Ctrl-C
    Watch,

    /// Launch the interactive terminal UI
    Tui,

    /// Print JSON Schema for config validation
    Schema,
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Clone)]
pub struct ListArgs {
    /// Only plans carrying this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone)]
pub struct ShowArgs {
    pub plan_id: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone)]
pub struct StatsArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone)]
pub struct AnswerArgs {
    pub plan_id: String,

    pub decision_id: String,

    /// Option key, or free text when the decision allows it
    pub value: String,

    /// Print the updated plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone)]
pub struct SkipArgs {
    pub plan_id: String,

    pub decision_id: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone)]
pub struct SubmitArgs {
    pub plan_id: String,

    #[arg(long)]
    pub json: bool,
}
