use anyhow::{bail, Result};

use crate::cli::{QueueArgs, ShowArgs};
use decision_queue::output::{render_plan, to_json};

pub fn execute(args: ShowArgs, queue: &QueueArgs) -> Result<()> {
    let (_, manager) = queue.open()?;

    let Some(plan) = manager.get_plan(&args.plan_id) else {
        bail!("plan not found: {}", args.plan_id);
    };

    if args.json {
        println!("{}", to_json(&plan)?);
    } else {
        print!("{}", render_plan(&plan));
    }
    Ok(())
}
