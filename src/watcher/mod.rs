//! Directory watcher for the pending location
//!
//! Polling is authoritative. OS notifications, when available, only request an
//! earlier re-scan after a debounce period. Both feed the same loop, and every
//! re-scan diffs the new listing against the remembered one.

mod snapshot;

pub use snapshot::{Fingerprint, Snapshot, WatchEvent};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::error::WatchError;
use crate::fsops::is_document_name;

/// Running watcher task
pub struct WatchHandle {
    shutdown: Option<oneshot::Sender<()>>,
    ready: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolves once the first scan has been delivered
    pub async fn wait_ready(&mut self) {
        // Err means the task ended; there is nothing left to wait for
        let _ = self.ready.wait_for(|ready| *ready).await;
    }

    /// Stop scanning and release the notification handle
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            warn!("Watcher task ended abnormally: {}", e);
        }
    }
}

pub struct DirWatcher {
    dir: PathBuf,
    poll_interval: Duration,
    debounce: Duration,
    fs_events: bool,
    snapshot: Snapshot,
}

impl DirWatcher {
    pub fn new(dir: impl Into<PathBuf>, config: &WatcherConfig) -> Self {
        Self {
            dir: dir.into(),
            poll_interval: config.poll_interval(),
            debounce: config.debounce(),
            fs_events: config.fs_events,
            snapshot: Snapshot::default(),
        }
    }

    /// Start the loop on the tokio runtime. Events go to `events`, with a
    /// single [`WatchEvent::Ready`] after the startup population.
    pub fn spawn(self, events: mpsc::UnboundedSender<WatchEvent>) -> WatchHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(events, shutdown_rx, ready_tx));

        WatchHandle {
            shutdown: Some(shutdown_tx),
            ready: ready_rx,
            task,
        }
    }

    async fn run(
        mut self,
        events: mpsc::UnboundedSender<WatchEvent>,
        mut shutdown: oneshot::Receiver<()>,
        ready: watch::Sender<bool>,
    ) {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<()>();
        let _fs_watcher = if self.fs_events {
            match start_notify(&self.dir, raw_tx) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!("{}; falling back to polling only", e);
                    None
                }
            }
        } else {
            drop(raw_tx);
            None
        };

        if !self.rescan(&events) {
            return;
        }
        let _ = events.send(WatchEvent::Ready);
        ready.send_replace(true);
        info!(
            "Watching {} ({} documents)",
            self.dir.display(),
            self.snapshot.len()
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
                Some(()) = raw_rx.recv() => {
                    tokio::time::sleep(self.debounce).await;
                    while raw_rx.try_recv().is_ok() {}
                    debug!("Change notification, re-scanning {}", self.dir.display());
                }
            }

            if !self.rescan(&events) {
                debug!("Event receiver dropped, stopping watcher");
                break;
            }
        }

        info!("Stopped watching {}", self.dir.display());
    }

    /// Scan, emit the delta, remember the listing. Returns false once nobody
    /// is listening.
    fn rescan(&mut self, events: &mpsc::UnboundedSender<WatchEvent>) -> bool {
        let next = match Snapshot::scan(&self.dir) {
            Ok(s) => s,
            Err(e) => {
                warn!("{}", e);
                return !events.is_closed();
            }
        };

        for event in self.snapshot.diff(&next, &self.dir) {
            debug!("{:?}", event);
            if events.send(event).is_err() {
                return false;
            }
        }
        self.snapshot = next;
        true
    }
}

fn start_notify(
    dir: &Path,
    tx: mpsc::UnboundedSender<()>,
) -> Result<RecommendedWatcher, WatchError> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) if should_rescan(&event) => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(e) => warn!("Filesystem notification error: {}", e),
        },
        notify::Config::default(),
    )?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Renames always count: the temp side of an atomic write is filtered out
/// but the final name may not be reported.
fn should_rescan(event: &Event) -> bool {
    match event.kind {
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => true,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
            event.paths.iter().any(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_document_name)
            })
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RenameMode};
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn polling_only() -> WatcherConfig {
        WatcherConfig {
            poll_interval_ms: 50,
            debounce_ms: 10,
            fs_events: false,
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<WatchEvent>) -> WatchEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for watch event")
            .expect("watcher channel closed")
    }

    #[test]
    fn test_should_rescan() {
        let event = |kind, path: &str| Event {
            kind,
            paths: vec![PathBuf::from(path)],
            attrs: Default::default(),
        };

        assert!(should_rescan(&event(
            EventKind::Create(CreateKind::File),
            "/q/plan.md"
        )));
        assert!(!should_rescan(&event(
            EventKind::Create(CreateKind::File),
            "/q/.plan.md.dq-tmp123"
        )));
        assert!(should_rescan(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
            "/q/.plan.md.dq-tmp123"
        )));
        assert!(!should_rescan(&event(
            EventKind::Access(AccessKind::Read),
            "/q/plan.md"
        )));
    }

    #[tokio::test]
    async fn test_startup_population_then_ready() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        fs::write(dir.path().join("b.md"), "b").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = DirWatcher::new(dir.path(), &polling_only()).spawn(tx);
        handle.wait_ready().await;
        assert!(handle.is_ready());

        assert_eq!(next_event(&mut rx).await, WatchEvent::Added(dir.path().join("a.md")));
        assert_eq!(next_event(&mut rx).await, WatchEvent::Added(dir.path().join("b.md")));
        assert_eq!(next_event(&mut rx).await, WatchEvent::Ready);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_polling_reports_live_changes() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = DirWatcher::new(dir.path(), &polling_only()).spawn(tx);
        handle.wait_ready().await;
        assert_eq!(next_event(&mut rx).await, WatchEvent::Ready);

        let path = dir.path().join("plan.md");
        fs::write(&path, "one").unwrap();
        assert_eq!(next_event(&mut rx).await, WatchEvent::Added(path.clone()));

        fs::write(&path, "one two three").unwrap();
        assert_eq!(next_event(&mut rx).await, WatchEvent::Updated(path.clone()));

        fs::remove_file(&path).unwrap();
        assert_eq!(next_event(&mut rx).await, WatchEvent::Removed(path));

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_fs_events_trigger_rescan_before_poll() {
        let dir = TempDir::new().unwrap();
        let config = WatcherConfig {
            poll_interval_ms: 60_000,
            debounce_ms: 50,
            fs_events: true,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = DirWatcher::new(dir.path(), &config).spawn(tx);
        handle.wait_ready().await;
        assert_eq!(next_event(&mut rx).await, WatchEvent::Ready);

        let path = dir.path().join("plan.md");
        fs::write(&path, "one").unwrap();
        assert_eq!(next_event(&mut rx).await, WatchEvent::Added(path));

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_fs_events_fall_back_to_polling() {
        let dir = TempDir::new().unwrap();
        let pending = dir.path().join("pending");
        let config = WatcherConfig {
            poll_interval_ms: 50,
            debounce_ms: 10,
            fs_events: true,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = DirWatcher::new(&pending, &config).spawn(tx);
        handle.wait_ready().await;
        assert_eq!(next_event(&mut rx).await, WatchEvent::Ready);

        fs::create_dir(&pending).unwrap();
        let path = pending.join("plan.md");
        fs::write(&path, "one").unwrap();
        assert_eq!(next_event(&mut rx).await, WatchEvent::Added(path));

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_missing_dir_still_becomes_ready() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = DirWatcher::new(dir.path().join("absent"), &polling_only()).spawn(tx);

        handle.wait_ready().await;
        assert_eq!(next_event(&mut rx).await, WatchEvent::Ready);
        handle.stop().await;
    }
}
