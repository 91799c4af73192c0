use serde::Serialize;
use std::path::PathBuf;

use super::{guard, QueueManager};
use crate::document::{Plan, PlanStatus, Priority};

/// A pending document that failed to decode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub reason: String,
}

/// Queue counts for the adapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub urgent: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,

    /// Plans waiting only for a submit
    pub ready: usize,

    /// Open decisions across all plans
    pub remaining: usize,

    /// Documents rejected by decode
    pub malformed: usize,
}

impl QueueStats {
    pub fn for_priority(&self, priority: Priority) -> usize {
        match priority {
            Priority::Urgent => self.urgent,
            Priority::High => self.high,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
        }
    }
}

fn pending_order(a: &Plan, b: &Plan) -> std::cmp::Ordering {
    a.priority
        .cmp(&b.priority)
        .then(a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

impl QueueManager {
    /// Presentable plans still awaiting work, most urgent first, oldest first
    /// within a priority. A completed plan whose archive step failed stays
    /// cached for `get_plan` and a submit retry, but is not listed.
    pub fn get_pending(&self) -> Vec<Plan> {
        let mut plans: Vec<Plan> = guard(&self.cache)
            .values()
            .filter(|p| p.is_presentable() && p.status != PlanStatus::Completed)
            .cloned()
            .collect();
        plans.sort_by(pending_order);
        plans
    }

    /// Look a plan up by id. `None` means it no longer exists.
    pub fn get_plan(&self, plan_id: &str) -> Option<Plan> {
        guard(&self.cache)
            .values()
            .find(|p| p.id == plan_id)
            .cloned()
    }

    pub fn plans_by_tag(&self, tag: &str) -> Vec<Plan> {
        let mut plans = self.get_pending();
        plans.retain(|p| p.tag == tag);
        plans
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            malformed: guard(&self.diagnostics).len(),
            ..QueueStats::default()
        };

        for plan in self.get_pending() {
            stats.total += 1;
            stats.remaining += plan.remaining;
            if plan.status == PlanStatus::Ready {
                stats.ready += 1;
            }
            match plan.priority {
                Priority::Urgent => stats.urgent += 1,
                Priority::High => stats.high += 1,
                Priority::Normal => stats.normal += 1,
                Priority::Low => stats.low += 1,
            }
        }

        stats
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        guard(&self.diagnostics).values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{fast_watcher, plan_doc, queue_with};
    use super::super::QueuePaths;
    use super::*;
    use crate::document::decode::tests::TWO_DECISIONS;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_pending_order_by_priority_then_age() {
        let (_dir, manager) = queue_with(&[
            ("a.md", &plan_doc("low-old", "low", "2026-10-01T00:00:00Z", "")),
            ("b.md", &plan_doc("urgent-new", "urgent", "2026-10-15T00:00:00Z", "")),
            ("c.md", &plan_doc("normal-new", "normal", "2026-10-15T00:00:00Z", "")),
            ("d.md", &plan_doc("normal-old", "normal", "2026-10-02T00:00:00Z", "")),
        ]);

        let ids: Vec<String> = manager.get_pending().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["urgent-new", "normal-old", "normal-new", "low-old"]);
    }

    #[test]
    fn test_plan_without_decisions_is_cached_but_hidden() {
        let empty = "---\nid: empty\nagent: a\nsession: s\ntitle: t\nstatus: pending\n---\n\nJust notes.\n";
        let (_dir, manager) = queue_with(&[("empty.md", empty)]);

        assert!(manager.get_plan("empty").is_some());
        assert!(manager.get_pending().is_empty());
        assert_eq!(manager.stats().total, 0);
    }

    #[test]
    fn test_completed_plan_left_in_pending_is_not_listed() {
        let stranded = TWO_DECISIONS
            .replace("status: pending\npriority", "status: completed\npriority")
            .replace("id: db\nstatus: pending\n", "id: db\nstatus: answered\nanswer: option-a\n")
            .replace(
                "id: cache\nstatus: pending\n",
                "id: cache\nstatus: answered\nanswer: lru\n",
            );
        let dir = TempDir::new().unwrap();
        let paths = QueuePaths::new(dir.path());
        paths.ensure().unwrap();
        fs::write(paths.pending.join("plan-001.md"), &stranded).unwrap();
        fs::write(paths.completed.join("plan-001.md"), "older").unwrap();

        let manager = QueueManager::new(paths, fast_watcher());
        manager.load().unwrap();

        assert!(manager.get_pending().is_empty());
        assert_eq!(manager.stats().total, 0);
        assert!(manager.plans_by_tag("backend").is_empty());
        assert_eq!(
            manager.get_plan("plan-001").unwrap().status,
            PlanStatus::Completed
        );
        assert!(dir.path().join("pending/plan-001.md").exists());
    }

    #[test]
    fn test_plans_by_tag() {
        let (_dir, manager) = queue_with(&[
            ("a.md", &plan_doc("a", "normal", "2026-10-01T00:00:00Z", "backend")),
            ("b.md", &plan_doc("b", "high", "2026-10-01T00:00:00Z", "frontend")),
            ("c.md", &plan_doc("c", "low", "2026-10-01T00:00:00Z", "backend")),
        ]);

        let ids: Vec<String> = manager
            .plans_by_tag("backend")
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(manager.plans_by_tag("ops").is_empty());
    }

    #[test]
    fn test_stats_counts() {
        let (_dir, manager) = queue_with(&[
            ("a.md", &plan_doc("a", "urgent", "2026-10-01T00:00:00Z", "")),
            ("b.md", &plan_doc("b", "urgent", "2026-10-01T00:00:00Z", "")),
            ("c.md", &plan_doc("c", "low", "2026-10-01T00:00:00Z", "")),
            ("bad.md", "no metadata here\n"),
        ]);
        manager.answer_decision("c", "only", "yes").unwrap();

        let stats = manager.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.for_priority(Priority::Urgent), 2);
        assert_eq!(stats.low, 1);
        assert_eq!(stats.normal, 0);
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.remaining, 2);
        assert_eq!(stats.malformed, 1);
    }
}
