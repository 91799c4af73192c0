//! CLI handlers for the mutating subcommands: `answer`, `skip`, `submit`

use anyhow::{bail, Result};

use crate::cli::{AnswerArgs, QueueArgs, SkipArgs, SubmitArgs};
use decision_queue::output::to_json;
use decision_queue::{Plan, PlanStatus};

fn report(plan: Option<Plan>, plan_id: &str, json: bool, what: &str) -> Result<()> {
    let Some(plan) = plan else {
        bail!("plan not found: {}", plan_id);
    };

    if json {
        println!("{}", to_json(&plan)?);
        return Ok(());
    }

    println!(
        "{} · {} {}/{} ({})",
        what, plan.id, plan.answered, plan.total, plan.status
    );
    if plan.status == PlanStatus::Ready {
        println!("All decisions resolved; run `dq submit {}` to hand it back", plan.id);
    }
    Ok(())
}

pub fn answer(args: AnswerArgs, queue: &QueueArgs) -> Result<()> {
    let (_, manager) = queue.open()?;
    let plan = manager.answer_decision(&args.plan_id, &args.decision_id, &args.value)?;
    report(
        plan,
        &args.plan_id,
        args.json,
        &format!("Answered {}", args.decision_id),
    )
}

pub fn skip(args: SkipArgs, queue: &QueueArgs) -> Result<()> {
    let (_, manager) = queue.open()?;
    let plan = manager.skip_decision(&args.plan_id, &args.decision_id)?;
    report(
        plan,
        &args.plan_id,
        args.json,
        &format!("Skipped {}", args.decision_id),
    )
}

pub fn submit(args: SubmitArgs, queue: &QueueArgs) -> Result<()> {
    let (_, manager) = queue.open()?;
    let Some(plan) = manager.submit_plan(&args.plan_id)? else {
        bail!("plan not found: {}", args.plan_id);
    };

    if args.json {
        println!("{}", to_json(&plan)?);
        return Ok(());
    }

    println!("Submitted {} → {}", plan.id, plan.source.display());
    if let Some(session) = &plan.notify_session {
        println!("Notified session {}", session);
    }
    Ok(())
}
