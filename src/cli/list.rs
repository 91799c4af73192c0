use anyhow::Result;

use crate::cli::{ListArgs, QueueArgs};
use decision_queue::output::{render_list, to_json};

pub fn execute(args: ListArgs, queue: &QueueArgs) -> Result<()> {
    let (_, manager) = queue.open()?;

    let plans = match &args.tag {
        Some(tag) => manager.plans_by_tag(tag),
        None => manager.get_pending(),
    };

    if args.json {
        println!("{}", to_json(&plans)?);
    } else {
        print!("{}", render_list(&plans));
    }
    Ok(())
}
