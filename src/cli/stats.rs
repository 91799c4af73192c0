use anyhow::Result;
use serde_json::json;

use crate::cli::{QueueArgs, StatsArgs};
use decision_queue::output::{render_stats, to_json};

pub fn execute(args: StatsArgs, queue: &QueueArgs) -> Result<()> {
    let (_, manager) = queue.open()?;
    let stats = manager.stats();
    let diagnostics = manager.diagnostics();

    if args.json {
        let body = json!({
            "stats": stats,
            "diagnostics": diagnostics,
        });
        println!("{}", to_json(&body)?);
    } else {
        print!("{}", render_stats(&stats, &diagnostics));
    }
    Ok(())
}
