use chrono::Utc;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

use super::{guard, QueueManager};
use crate::document::{
    decode, decode_at, encode_answer, encode_preamble, normalize_answer, Plan, PlanStatus,
    PreambleUpdate, SKIP_SENTINEL,
};
use crate::error::{FsError, QueueError};
use crate::fsops;
use crate::notification::Notification;

impl QueueManager {
    /// Record `answer` on one decision. `Ok(None)` when the plan is gone.
    pub fn answer_decision(
        &self,
        plan_id: &str,
        decision_id: &str,
        answer: &str,
    ) -> Result<Option<Plan>, QueueError> {
        let answer = normalize_answer(answer);
        if answer.is_empty() {
            return Err(QueueError::InvalidAnswer {
                decision_id: decision_id.to_string(),
                reason: "answer is empty".to_string(),
            });
        }
        self.record(plan_id, decision_id, &answer)
    }

    pub fn skip_decision(
        &self,
        plan_id: &str,
        decision_id: &str,
    ) -> Result<Option<Plan>, QueueError> {
        self.record(plan_id, decision_id, SKIP_SENTINEL)
    }

    /// Complete a ready plan: mark it, archive it, notify the producer
    pub fn submit_plan(&self, plan_id: &str) -> Result<Option<Plan>, QueueError> {
        let Some(path) = self.path_of(plan_id) else {
            return Ok(None);
        };
        self.with_path_lock(&path, || self.submit_at(&path, plan_id))
    }

    fn submit_at(&self, path: &Path, plan_id: &str) -> Result<Option<Plan>, QueueError> {
        let Some((raw, current)) = self.read_current(path, plan_id) else {
            return Ok(None);
        };

        match current.status {
            PlanStatus::Ready => {}
            PlanStatus::Completed => {
                info!("Plan '{}' already completed, retrying archive", plan_id);
                return self.complete(current);
            }
            status => {
                return Err(QueueError::NotReady {
                    plan_id: plan_id.to_string(),
                    status,
                })
            }
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| FsError::NoFileName(path.to_path_buf()))?;
        let archived = self.paths.completed.join(file_name);
        if archived.exists() {
            warn!(
                "Not submitting '{}': {} already exists",
                plan_id,
                archived.display()
            );
            return Err(FsError::RelocateConflict { path: archived }.into());
        }

        let now = Utc::now();
        let updated = encode_preamble(
            &raw,
            &PreambleUpdate {
                status: PlanStatus::Completed,
                answered: current.answered,
                remaining: current.remaining,
                updated_at: now,
                completed_at: Some(now),
            },
        )?;
        fsops::write_atomically(path, &updated)?;
        let plan = decode_at(&updated, path, now)?;
        info!("Plan '{}' completed", plan_id);

        self.complete(plan)
    }

    fn record(
        &self,
        plan_id: &str,
        decision_id: &str,
        answer: &str,
    ) -> Result<Option<Plan>, QueueError> {
        let Some(path) = self.path_of(plan_id) else {
            return Ok(None);
        };
        self.with_path_lock(&path, || self.record_at(&path, plan_id, decision_id, answer))
    }

    fn record_at(
        &self,
        path: &Path,
        plan_id: &str,
        decision_id: &str,
        answer: &str,
    ) -> Result<Option<Plan>, QueueError> {
        let Some((raw, current)) = self.read_current(path, plan_id) else {
            return Ok(None);
        };
        if current.status == PlanStatus::Completed {
            return Err(QueueError::PlanCompleted(plan_id.to_string()));
        }

        let Some(decision) = current.decision(decision_id) else {
            return Err(QueueError::DecisionNotFound {
                plan_id: plan_id.to_string(),
                decision_id: decision_id.to_string(),
            });
        };
        if !decision.accepts(answer) {
            let keys: Vec<&str> = decision.options.iter().map(|o| o.key.as_str()).collect();
            return Err(QueueError::InvalidAnswer {
                decision_id: decision_id.to_string(),
                reason: format!("'{}' is not one of: {}", answer, keys.join(", ")),
            });
        }
        if decision.answer.as_deref() == Some(answer) {
            debug!("Decision '{}' already holds this answer", decision_id);
            return Ok(Some(current));
        }

        let answered = current.answered + usize::from(decision.is_open());
        let remaining = current.total - answered;
        let status = current
            .status
            .advance(PlanStatus::from_progress(current.total, answered));

        let now = Utc::now();
        let body = encode_answer(&raw, decision_id, answer, now)?;
        let updated = encode_preamble(
            &body,
            &PreambleUpdate {
                status,
                answered,
                remaining,
                updated_at: now,
                completed_at: None,
            },
        )?;
        fsops::write_atomically(path, &updated)?;

        let plan = decode_at(&updated, path, now)?;
        debug!(
            "Plan '{}': {} = {} ({}/{} answered, {})",
            plan_id, decision_id, answer, plan.answered, plan.total, plan.status
        );
        guard(&self.cache).insert(path.to_path_buf(), plan.clone());
        Ok(Some(plan))
    }

    /// Fresh raw text and plan for `path`, or `None` when it is unavailable
    /// or now holds a different plan. Caller holds the path lock.
    fn read_current(&self, path: &Path, plan_id: &str) -> Option<(String, Plan)> {
        let (raw, plan) = self.reload(path)?;
        if plan.id != plan_id {
            debug!("{} now holds plan '{}'", path.display(), plan.id);
            return None;
        }
        Some((raw, plan))
    }

    /// Relocate, drop from cache, then notify. Caller holds the path lock.
    ///
    /// A failed relocation leaves the plan cached so a later submit retries.
    pub(super) fn complete(&self, plan: Plan) -> Result<Option<Plan>, QueueError> {
        let pending_path = plan.source.clone();
        let archived = match fsops::relocate_file(&pending_path, &self.paths.completed) {
            Ok(dest) => dest,
            Err(e) => {
                warn!("Plan '{}' stays pending: {}", plan.id, e);
                guard(&self.cache).insert(pending_path, plan);
                return Err(e.into());
            }
        };
        self.evict(&pending_path);
        info!("Archived plan '{}' to {}", plan.id, archived.display());

        if let Some(note) = Notification::from_plan(&plan) {
            match note.write_to(&self.paths.notify) {
                Ok(path) => info!("Notified '{}' at {}", note.notify_session, path.display()),
                Err(e) => error!("Failed to write notification for '{}': {}", plan.id, e),
            }
        }

        let archived_plan = fs::read_to_string(&archived)
            .map_err(|e| e.to_string())
            .and_then(|raw| decode(&raw, &archived).map_err(|e| e.to_string()));
        match archived_plan {
            Ok(read_back) => Ok(Some(read_back)),
            Err(reason) => {
                warn!(
                    "Could not read back {}: {}; returning in-memory plan",
                    archived.display(),
                    reason
                );
                Ok(Some(Plan {
                    source: archived,
                    ..plan
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::queue_with;
    use super::*;
    use crate::document::decode::tests::TWO_DECISIONS;
    use crate::document::DecisionStatus;
    use crate::notification;

    const PLAN: &str = "plan-001";

    #[test]
    fn test_decode_two_decision_plan() {
        let (_dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        let plan = manager.get_plan(PLAN).unwrap();

        assert_eq!(plan.total, 2);
        assert_eq!(plan.answered, 0);
        assert_eq!(plan.remaining, 2);
        let keys: Vec<&str> = plan.decisions[0].options.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["option-a", "option-b"]);
    }

    #[test]
    fn test_first_answer_moves_plan_in_progress() {
        let (_dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        let plan = manager
            .answer_decision(PLAN, "db", "option-a")
            .unwrap()
            .unwrap();

        assert_eq!(plan.status, PlanStatus::InProgress);
        assert_eq!(plan.answered, 1);
        assert_eq!(plan.remaining, 1);
        assert_eq!(plan.decisions[0].answer.as_deref(), Some("option-a"));
        assert_eq!(plan.decisions[0].status, DecisionStatus::Answered);
        assert!(plan.decisions[0].answered_at.is_some());
        assert_eq!(manager.get_plan(PLAN).unwrap(), plan);
    }

    #[test]
    fn test_all_answered_is_ready_but_not_archived() {
        let (dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        manager.answer_decision(PLAN, "db", "option-a").unwrap();
        let plan = manager.answer_decision(PLAN, "cache", "lru").unwrap().unwrap();

        assert_eq!(plan.status, PlanStatus::Ready);
        assert_eq!(plan.remaining, 0);
        assert!(manager.get_pending().iter().any(|p| p.id == PLAN));
        assert!(dir.path().join("pending/plan-001.md").exists());
    }

    #[test]
    fn test_submit_archives_and_notifies() {
        let (dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        manager.answer_decision(PLAN, "db", "option-a").unwrap();
        manager.skip_decision(PLAN, "cache").unwrap();

        let plan = manager.submit_plan(PLAN).unwrap().unwrap();

        assert_eq!(plan.status, PlanStatus::Completed);
        assert!(plan.completed_at.is_some());
        assert_eq!(plan.source, dir.path().join("completed/plan-001.md"));
        assert!(manager.get_pending().is_empty());
        assert!(manager.get_plan(PLAN).is_none());
        assert!(!dir.path().join("pending/plan-001.md").exists());

        let note_path = dir
            .path()
            .join("notify")
            .join(notification::file_name_for("sess-notify", PLAN));
        let note = Notification::parse(&fs::read_to_string(note_path).unwrap()).unwrap();
        assert_eq!(note.plan_id, PLAN);
        assert_eq!(note.completed_at, plan.completed_at.unwrap());
        assert_eq!(
            note.answers,
            vec![
                ("db".to_string(), "option-a".to_string()),
                ("cache".to_string(), SKIP_SENTINEL.to_string()),
            ]
        );
    }

    #[test]
    fn test_submit_without_notify_session_writes_nothing() {
        let doc = TWO_DECISIONS.replace("notify_session: sess-notify\n", "");
        let (dir, manager) = queue_with(&[("plan-001.md", &doc)]);
        manager.skip_decision(PLAN, "db").unwrap();
        manager.skip_decision(PLAN, "cache").unwrap();

        manager.submit_plan(PLAN).unwrap().unwrap();
        assert_eq!(fs::read_dir(dir.path().join("notify")).unwrap().count(), 0);
    }

    #[test]
    fn test_concurrent_answers_are_not_lost() {
        let (dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);

        std::thread::scope(|s| {
            s.spawn(|| manager.answer_decision(PLAN, "db", "option-b").unwrap());
            s.spawn(|| manager.answer_decision(PLAN, "cache", "ttl").unwrap());
        });

        let raw = fs::read_to_string(dir.path().join("pending/plan-001.md")).unwrap();
        let plan = decode(&raw, Path::new("plan-001.md")).unwrap();
        assert_eq!(plan.decision("db").unwrap().answer.as_deref(), Some("option-b"));
        assert_eq!(plan.decision("cache").unwrap().answer.as_deref(), Some("ttl"));
        assert_eq!(plan.status, PlanStatus::Ready);
        assert_eq!(plan.answered + plan.remaining, plan.total);
    }

    #[test]
    fn test_skip_twice_is_idempotent() {
        let (dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        let path = dir.path().join("pending/plan-001.md");

        manager.skip_decision(PLAN, "db").unwrap();
        let once = fs::read_to_string(&path).unwrap();
        let plan = manager.skip_decision(PLAN, "db").unwrap().unwrap();
        let twice = fs::read_to_string(&path).unwrap();

        assert_eq!(once, twice);
        assert!(plan.decisions[0].is_skipped());
    }

    #[test]
    fn test_status_never_regresses_and_submit_is_explicit() {
        let (_dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        let mut seen = vec![manager.get_plan(PLAN).unwrap().status];

        for (decision, answer) in [("db", "option-a"), ("cache", "lru"), ("db", "option-b")] {
            let plan = manager.answer_decision(PLAN, decision, answer).unwrap().unwrap();
            seen.push(plan.status);
        }
        seen.push(manager.submit_plan(PLAN).unwrap().unwrap().status);

        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
        assert_eq!(seen[3], PlanStatus::Ready);
        assert_eq!(seen[4], PlanStatus::Completed);
    }

    #[test]
    fn test_reanswer_overwrites() {
        let (_dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        manager.answer_decision(PLAN, "db", "option-a").unwrap();
        let plan = manager.answer_decision(PLAN, "db", "option-b").unwrap().unwrap();

        assert_eq!(plan.decisions[0].answer.as_deref(), Some("option-b"));
        assert_eq!(plan.answered, 1);
    }

    #[test]
    fn test_logic_violations() {
        let (_dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);

        let err = manager.answer_decision(PLAN, "nope", "x").unwrap_err();
        assert!(matches!(err, QueueError::DecisionNotFound { .. }));
        assert!(err.is_logic_violation());

        let err = manager.answer_decision(PLAN, "db", "mongodb").unwrap_err();
        assert!(matches!(err, QueueError::InvalidAnswer { .. }));

        let err = manager.answer_decision(PLAN, "db", " \n ").unwrap_err();
        assert!(matches!(err, QueueError::InvalidAnswer { .. }));

        let err = manager.submit_plan(PLAN).unwrap_err();
        assert!(matches!(
            err,
            QueueError::NotReady {
                status: PlanStatus::Pending,
                ..
            }
        ));
    }

    #[test]
    fn test_custom_answer_is_folded_to_one_line() {
        let (_dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        let plan = manager
            .answer_decision(PLAN, "cache", "  two-level\nLRU then TTL ")
            .unwrap()
            .unwrap();
        assert_eq!(
            plan.decision("cache").unwrap().answer.as_deref(),
            Some("two-level LRU then TTL")
        );
    }

    #[test]
    fn test_free_text_answers_read_back_verbatim() {
        for value in ["null", "~", "'quoted'", "use a*", "**bold** pick", "say \"hi\""] {
            let (_dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
            let plan = manager.answer_decision(PLAN, "cache", value).unwrap().unwrap();
            let decision = plan.decision("cache").unwrap();

            assert_eq!(decision.answer.as_deref(), Some(value), "answer {}", value);
            assert_eq!(decision.status, DecisionStatus::Answered);
            assert_eq!(plan.answered, 1);

            manager.load().unwrap();
            let reloaded = manager.get_plan(PLAN).unwrap();
            assert_eq!(reloaded.decision("cache").unwrap().answer.as_deref(), Some(value));
            assert_eq!(reloaded.answered, 1);
        }
    }

    #[test]
    fn test_path_locks_are_released_after_use() {
        let (_dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        manager.answer_decision(PLAN, "db", "option-a").unwrap();
        manager.skip_decision(PLAN, "cache").unwrap();
        assert!(guard(&manager.locks).is_empty());

        manager.submit_plan(PLAN).unwrap();
        assert!(guard(&manager.locks).is_empty());
    }

    #[test]
    fn test_unknown_plan_is_not_found() {
        let (_dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        assert!(manager.answer_decision("missing", "db", "x").unwrap().is_none());
        assert!(manager.skip_decision("missing", "db").unwrap().is_none());
        assert!(manager.submit_plan("missing").unwrap().is_none());
    }

    #[test]
    fn test_file_deleted_under_cache_is_not_found() {
        let (dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        fs::remove_file(dir.path().join("pending/plan-001.md")).unwrap();

        assert!(manager.answer_decision(PLAN, "db", "option-a").unwrap().is_none());
        assert!(manager.get_plan(PLAN).is_none());
    }

    #[test]
    fn test_relocation_conflict_keeps_plan_ready() {
        let (dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        manager.skip_decision(PLAN, "db").unwrap();
        manager.skip_decision(PLAN, "cache").unwrap();
        fs::write(dir.path().join("completed/plan-001.md"), "older").unwrap();

        let err = manager.submit_plan(PLAN).unwrap_err();
        assert!(err.is_relocation_conflict());
        assert_eq!(manager.get_plan(PLAN).unwrap().status, PlanStatus::Ready);
        assert!(dir.path().join("pending/plan-001.md").exists());

        fs::remove_file(dir.path().join("completed/plan-001.md")).unwrap();
        let plan = manager.submit_plan(PLAN).unwrap().unwrap();
        assert_eq!(plan.status, PlanStatus::Completed);
    }
}
