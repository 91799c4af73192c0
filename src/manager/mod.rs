//! Queue Manager: the in-memory view of the pending directory
//!
//! The manager owns a cache of decoded plans keyed by file path. Watcher
//! events keep it fresh; consumer mutations go through the codec and the
//! atomic file operations and then update it directly.
//!
//! Every read-modify-write of a document, including watcher refreshes, runs
//! under a per-path lock. There is no cross-process lock: run one engine per
//! queue directory.

mod mutate;
mod stats;

pub use stats::{Diagnostic, QueueStats};

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::WatcherConfig;
use crate::document::{decode, Plan, PlanStatus};
use crate::error::{FsError, QueueError};
use crate::fsops;
use crate::watcher::{DirWatcher, Snapshot, WatchEvent, WatchHandle};

/// The three directories forming the on-disk contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePaths {
    pub root: PathBuf,
    pub pending: PathBuf,
    pub completed: PathBuf,
    pub notify: PathBuf,
}

impl QueuePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            pending: root.join("pending"),
            completed: root.join("completed"),
            notify: root.join("notify"),
            root,
        }
    }

    pub fn ensure(&self) -> Result<(), FsError> {
        for dir in [&self.pending, &self.completed, &self.notify] {
            fsops::ensure_dir(dir)?;
        }
        Ok(())
    }
}

struct Running {
    watcher: WatchHandle,
    consumer: JoinHandle<()>,
}

pub struct QueueManager {
    paths: QueuePaths,
    watcher_config: WatcherConfig,
    cache: Mutex<HashMap<PathBuf, Plan>>,
    diagnostics: Mutex<BTreeMap<PathBuf, Diagnostic>>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    running: Mutex<Option<Running>>,
}

/// Lock a std mutex, carrying on with the data if a holder panicked
fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl QueueManager {
    pub fn new(paths: QueuePaths, watcher_config: WatcherConfig) -> Self {
        Self {
            paths,
            watcher_config,
            cache: Mutex::new(HashMap::new()),
            diagnostics: Mutex::new(BTreeMap::new()),
            locks: Mutex::new(HashMap::new()),
            running: Mutex::new(None),
        }
    }

    pub fn paths(&self) -> &QueuePaths {
        &self.paths
    }

    pub fn is_running(&self) -> bool {
        guard(&self.running).is_some()
    }

    /// One scan of the pending directory, without a watcher. Returns the
    /// number of cached plans.
    pub fn load(&self) -> Result<usize, QueueError> {
        self.paths.ensure()?;
        let snapshot = Snapshot::scan(&self.paths.pending)?;
        for event in Snapshot::default().diff(&snapshot, &self.paths.pending) {
            self.apply(&event);
        }
        self.recover_completed();
        Ok(guard(&self.cache).len())
    }

    /// Start the watcher and resolve once startup population is cached
    pub async fn init(self: &Arc<Self>) -> Result<(), QueueError> {
        if self.is_running() {
            return Ok(());
        }
        self.paths.ensure()?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (ready_tx, mut ready_rx) = watch::channel(false);
        let watcher = DirWatcher::new(&self.paths.pending, &self.watcher_config).spawn(event_tx);

        let manager = Arc::clone(self);
        let consumer = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if event == WatchEvent::Ready {
                    ready_tx.send_replace(true);
                } else {
                    manager.apply(&event);
                }
            }
            debug!("Watcher event stream closed");
        });

        // Err means the consumer ended before the first scan finished
        let _ = ready_rx.wait_for(|ready| *ready).await;
        self.recover_completed();

        *guard(&self.running) = Some(Running { watcher, consumer });
        info!(
            "Queue ready at {} ({} plans)",
            self.paths.root.display(),
            guard(&self.cache).len()
        );
        Ok(())
    }

    /// Stop the watcher and the event consumer
    pub async fn shutdown(&self) {
        let Some(running) = guard(&self.running).take() else {
            return;
        };
        running.watcher.stop().await;
        if let Err(e) = running.consumer.await {
            warn!("Event consumer ended abnormally: {}", e);
        }
        info!("Queue at {} shut down", self.paths.root.display());
    }

    /// Bring the cache in line with one watcher event
    pub fn apply(&self, event: &WatchEvent) {
        match event {
            WatchEvent::Added(path) | WatchEvent::Updated(path) => self.refresh(path),
            WatchEvent::Removed(path) => self.with_path_lock(path, || self.evict(path)),
            WatchEvent::Ready => {}
        }
    }

    fn refresh(&self, path: &Path) {
        self.with_path_lock(path, || {
            let _ = self.reload(path);
        });
    }

    /// Re-read and re-decode `path` into the cache, returning the raw text
    /// with the plan. Caller holds the path lock.
    fn reload(&self, path: &Path) -> Option<(String, Plan)> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.evict(path);
                return None;
            }
            Err(e) => {
                warn!("Cannot read {}: {}; keeping previous state", path.display(), e);
                return None;
            }
        };

        match decode(&raw, path) {
            Ok(plan) => {
                guard(&self.diagnostics).remove(path);
                if !plan.is_presentable() {
                    debug!("Plan '{}' has no decisions", plan.id);
                }
                debug!("Cached plan '{}' ({})", plan.id, plan.status);
                guard(&self.cache).insert(path.to_path_buf(), plan.clone());
                Some((raw, plan))
            }
            Err(e) => {
                warn!("Skipping malformed document {}: {}", path.display(), e);
                guard(&self.cache).remove(path);
                guard(&self.diagnostics).insert(
                    path.to_path_buf(),
                    Diagnostic {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    },
                );
                None
            }
        }
    }

    fn evict(&self, path: &Path) {
        if let Some(plan) = guard(&self.cache).remove(path) {
            debug!("Dropped plan '{}' from cache", plan.id);
        }
        guard(&self.diagnostics).remove(path);
    }

    /// Run `f` holding the lock for `path`. The map entry is removed once
    /// no other caller holds or waits on it.
    fn with_path_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = Arc::clone(guard(&self.locks).entry(path.to_path_buf()).or_default());
        let out = {
            let _held = guard(&lock);
            f()
        };
        drop(lock);

        // Clones are only taken under the map lock, so a count of one is final
        let mut locks = guard(&self.locks);
        if locks.get(path).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(path);
        }
        out
    }

    fn path_of(&self, plan_id: &str) -> Option<PathBuf> {
        guard(&self.cache)
            .iter()
            .find(|(_, plan)| plan.id == plan_id)
            .map(|(path, _)| path.clone())
    }

    /// Archive plans left `completed` in pending by an interrupted submit
    fn recover_completed(&self) {
        let stranded: Vec<PathBuf> = guard(&self.cache)
            .iter()
            .filter(|(_, plan)| plan.status == PlanStatus::Completed)
            .map(|(path, _)| path.clone())
            .collect();

        for path in stranded {
            self.with_path_lock(&path, || {
                let Some(plan) = guard(&self.cache).get(&path).cloned() else {
                    return;
                };
                info!("Archiving plan '{}' left completed in pending", plan.id);
                if let Err(e) = self.complete(plan) {
                    error!("Could not archive {}: {}", path.display(), e);
                }
            });
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::document::decode::tests::TWO_DECISIONS;
    use std::time::Duration;
    use tempfile::TempDir;

    pub(crate) fn fast_watcher() -> WatcherConfig {
        WatcherConfig {
            poll_interval_ms: 50,
            debounce_ms: 10,
            fs_events: false,
        }
    }

    pub(crate) fn queue_with(docs: &[(&str, &str)]) -> (TempDir, QueueManager) {
        let dir = TempDir::new().unwrap();
        let paths = QueuePaths::new(dir.path());
        paths.ensure().unwrap();
        for (name, body) in docs {
            fs::write(paths.pending.join(name), body).unwrap();
        }
        let manager = QueueManager::new(paths, fast_watcher());
        manager.load().unwrap();
        (dir, manager)
    }

    pub(crate) fn plan_doc(id: &str, priority: &str, created: &str, tag: &str) -> String {
        format!(
            "---\nid: {id}\nagent: a\nsession: s\ntitle: {id}\nstatus: pending\n\
             priority: {priority}\ntag: {tag}\ncreated_at: {created}\n---\n\n\
             ## Decision 1: Only\n\nid: only\nstatus: pending\n"
        )
    }

    #[test]
    fn test_load_creates_layout_and_caches_plans() {
        let (dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        for sub in ["pending", "completed", "notify"] {
            assert!(dir.path().join(sub).is_dir());
        }
        let plan = manager.get_plan("plan-001").unwrap();
        assert_eq!(plan.decisions.len(), 2);
        assert_eq!(plan.remaining, 2);
    }

    #[test]
    fn test_malformed_document_is_skipped_with_diagnostic() {
        let missing_status = "---\nid: bad\nagent: a\nsession: s\ntitle: t\n---\n";
        let (_dir, manager) = queue_with(&[
            ("bad.md", missing_status),
            ("plan-001.md", TWO_DECISIONS),
        ]);

        assert!(manager.get_plan("bad").is_none());
        assert!(manager.get_plan("plan-001").is_some());
        let diags = manager.diagnostics();
        assert_eq!(diags.len(), 1);
        assert!(diags[0].path.ends_with("bad.md"));
        assert!(diags[0].reason.contains("status"));
    }

    #[test]
    fn test_removed_event_evicts_plan() {
        let (dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        let path = dir.path().join("pending/plan-001.md");
        fs::remove_file(&path).unwrap();

        manager.apply(&WatchEvent::Removed(path));
        assert!(manager.get_plan("plan-001").is_none());
    }

    #[test]
    fn test_vanished_file_on_update_evicts_plan() {
        let (dir, manager) = queue_with(&[("plan-001.md", TWO_DECISIONS)]);
        let path = dir.path().join("pending/plan-001.md");
        fs::remove_file(&path).unwrap();

        manager.apply(&WatchEvent::Updated(path));
        assert!(manager.get_plan("plan-001").is_none());
    }

    #[test]
    fn test_load_archives_stranded_completed_plan() {
        let stranded = TWO_DECISIONS
            .replace("status: pending\npriority", "status: completed\npriority")
            .replace("id: db\nstatus: pending\n", "id: db\nstatus: answered\nanswer: option-a\n")
            .replace(
                "id: cache\nstatus: pending\n",
                "id: cache\nstatus: answered\nanswer: lru\n",
            );
        let (dir, manager) = queue_with(&[("plan-001.md", &stranded)]);

        assert!(manager.get_plan("plan-001").is_none());
        assert!(dir.path().join("completed/plan-001.md").exists());
        assert!(!dir.path().join("pending/plan-001.md").exists());
    }

    #[tokio::test]
    async fn test_init_populates_and_tracks_producer_writes() {
        let dir = TempDir::new().unwrap();
        let paths = QueuePaths::new(dir.path());
        paths.ensure().unwrap();
        fs::write(paths.pending.join("plan-001.md"), TWO_DECISIONS).unwrap();

        let manager = Arc::new(QueueManager::new(paths.clone(), fast_watcher()));
        manager.init().await.unwrap();
        assert!(manager.is_running());
        assert!(manager.get_plan("plan-001").is_some());

        fs::write(
            paths.pending.join("plan-002.md"),
            plan_doc("plan-002", "low", "2026-10-16T08:00:00Z", ""),
        )
        .unwrap();

        let mut seen = false;
        for _ in 0..100 {
            if manager.get_plan("plan-002").is_some() {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(seen, "watcher never picked up plan-002");

        manager.shutdown().await;
        assert!(!manager.is_running());
    }
}
