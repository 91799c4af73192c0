use anyhow::Context;
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;
mod tui;

use cli::{Cli, Commands};

const TUI_LOG_FILE: &str = "dq-tui.log";

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    // Only show logs with --verbose
    let filter = if cli.verbose {
        EnvFilter::new("decision_queue=debug,dq=debug")
    } else {
        EnvFilter::new("decision_queue=warn,dq=warn")
    };

    if matches!(cli.command, Commands::Tui) {
        // The terminal belongs to the UI; log to a file under the queue root
        let config = cli.queue.resolve()?;
        std::fs::create_dir_all(&config.queue_dir)?;
        let path = config.queue_dir.join(TUI_LOG_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let queue = &cli.queue;
    match cli.command {
        Commands::Init(args) => cli::init::execute(args, queue),
        Commands::List(args) => cli::list::execute(args, queue),
        Commands::Show(args) => cli::show::execute(args, queue),
        Commands::Stats(args) => cli::stats::execute(args, queue),
        Commands::Answer(args) => cli::decide::answer(args, queue),
        Commands::Skip(args) => cli::decide::skip(args, queue),
        Commands::Submit(args) => cli::decide::submit(args, queue),
        Commands::Watch => cli::watch::execute(queue).await,
        Commands::Tui => cli::tui::execute(queue).await,
        Commands::Schema => cli::schema::execute(),
    }
}
