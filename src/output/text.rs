use crate::document::{Decision, DecisionStatus, Plan, Priority};
use crate::manager::{Diagnostic, QueueStats};

fn progress(plan: &Plan) -> String {
    format!("{}/{}", plan.answered, plan.total)
}

/// One line per plan, in the order given
pub fn render_list(plans: &[Plan]) -> String {
    if plans.is_empty() {
        return "No pending plans\n".to_string();
    }

    let id_width = plans.iter().map(|p| p.id.len()).max().unwrap_or(0);
    let mut out = String::new();
    for plan in plans {
        out.push_str(&format!(
            "{:<8} {:<id_width$}  {:>5}  {:<11}  {}",
            format!("[{}]", plan.priority),
            plan.id,
            progress(plan),
            plan.status.as_str(),
            plan.title,
        ));
        if !plan.tag.is_empty() {
            out.push_str(&format!("  #{}", plan.tag));
        }
        out.push('\n');
    }
    out
}

fn decision_marker(decision: &Decision) -> &'static str {
    match decision.status {
        DecisionStatus::Pending => "[ ]",
        DecisionStatus::Answered => "[x]",
        DecisionStatus::Skipped => "[-]",
    }
}

pub fn render_plan(plan: &Plan) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {} ({})\n\n", plan.title, plan.id));
    out.push_str(&format!("Agent:    {} / {}\n", plan.agent, plan.session));
    out.push_str(&format!("Priority: {}\n", plan.priority));
    out.push_str(&format!(
        "Status:   {} ({} answered, {} remaining)\n",
        plan.status, plan.answered, plan.remaining
    ));
    if !plan.tag.is_empty() {
        out.push_str(&format!("Tag:      {}\n", plan.tag));
    }
    if let Some(target) = &plan.notify_session {
        out.push_str(&format!("Notify:   {}\n", target));
    }

    if !plan.context.is_empty() {
        out.push_str(&format!("\n{}\n", plan.context));
    }

    for decision in &plan.decisions {
        out.push_str(&format!(
            "\n{} {}. {} ({})\n",
            decision_marker(decision),
            decision.number,
            decision.title,
            decision.id
        ));
        if !decision.context.is_empty() {
            for line in decision.context.lines() {
                out.push_str(&format!("    {}\n", line));
            }
        }
        for (idx, option) in decision.options.iter().enumerate() {
            let chosen = decision.answer.as_deref() == Some(option.key.as_str());
            out.push_str(&format!(
                "    {}{}. {}",
                if chosen { "*" } else { " " },
                idx + 1,
                option.key
            ));
            if option.label != option.key {
                out.push_str(&format!(" - {}", option.label));
            }
            out.push('\n');
        }
        match decision.status {
            DecisionStatus::Answered => {
                let answer = decision.answer.as_deref().unwrap_or_default();
                if decision.option(answer).is_none() {
                    out.push_str(&format!("    Answer: {}\n", answer));
                }
            }
            DecisionStatus::Skipped => out.push_str("    Skipped\n"),
            DecisionStatus::Pending if decision.allow_custom => {
                out.push_str("    (custom answers accepted)\n")
            }
            DecisionStatus::Pending => {}
        }
    }

    out
}

pub fn render_stats(stats: &QueueStats, diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();

    out.push_str(&format!("Pending plans: {}\n", stats.total));
    for priority in Priority::ALL {
        out.push_str(&format!(
            "  {:<7} {}\n",
            priority.to_string(),
            stats.for_priority(priority)
        ));
    }
    out.push_str(&format!("Ready to submit: {}\n", stats.ready));
    out.push_str(&format!("Open decisions:  {}\n", stats.remaining));
    out.push_str(&format!("Malformed:       {}\n", stats.malformed));

    for diag in diagnostics {
        out.push_str(&format!("  {}: {}\n", diag.path.display(), diag.reason));
    }

    out
}
