use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::WatchError;
use crate::fsops::is_document_name;

/// One change between two listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(PathBuf),
    Updated(PathBuf),
    Removed(PathBuf),
    /// First scan delivered; everything before this was startup population
    Ready,
}

impl WatchEvent {
    pub fn path(&self) -> Option<&Path> {
        match self {
            WatchEvent::Added(p) | WatchEvent::Updated(p) | WatchEvent::Removed(p) => Some(p),
            WatchEvent::Ready => None,
        }
    }
}

/// What a scan remembers per file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

/// Filtered directory listing at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<String, Fingerprint>,
}

impl Snapshot {
    /// List `dir`, keeping only regular files that follow the naming convention
    pub fn scan(dir: &Path) -> Result<Self, WatchError> {
        let read = fs::read_dir(dir).map_err(|e| WatchError::Scan {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut entries = BTreeMap::new();
        for entry in read.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_document_name(&name) {
                continue;
            }
            // Vanished between listing and stat; the next scan settles it
            let Ok(meta) = entry.path().metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            entries.insert(
                name,
                Fingerprint {
                    modified: meta.modified().ok(),
                    len: meta.len(),
                },
            );
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Events that turn `self` into `next`, in name order
    pub fn diff(&self, next: &Snapshot, dir: &Path) -> Vec<WatchEvent> {
        let mut events = Vec::new();

        for (name, fp) in &next.entries {
            match self.entries.get(name) {
                None => events.push(WatchEvent::Added(dir.join(name))),
                Some(prev) if prev != fp => events.push(WatchEvent::Updated(dir.join(name))),
                Some(_) => {}
            }
        }
        for name in self.entries.keys() {
            if !next.entries.contains_key(name) {
                events.push(WatchEvent::Removed(dir.join(name)));
            }
        }

        events
    }

    #[cfg(test)]
    pub(crate) fn with(mut self, name: &str, len: u64) -> Self {
        self.entries.insert(
            name.to_string(),
            Fingerprint {
                modified: None,
                len,
            },
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_diff_reports_each_kind() {
        let dir = Path::new("/q/pending");
        let prev = Snapshot::default().with("a.md", 1).with("b.md", 1);
        let next = Snapshot::default().with("b.md", 2).with("c.md", 1);

        assert_eq!(
            prev.diff(&next, dir),
            vec![
                WatchEvent::Updated(dir.join("b.md")),
                WatchEvent::Added(dir.join("c.md")),
                WatchEvent::Removed(dir.join("a.md")),
            ]
        );
    }

    #[test]
    fn test_diff_of_identical_listings_is_empty() {
        let snap = Snapshot::default().with("a.md", 3);
        assert!(snap.diff(&snap.clone(), Path::new("/q")).is_empty());
    }

    #[test]
    fn test_scan_filters_names() {
        let dir = TempDir::new().unwrap();
        for name in ["plan.md", ".hidden.md", "notes.txt", ".plan.md.dq-tmpAbC123"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        fs::create_dir(dir.path().join("folder.md")).unwrap();

        let snap = Snapshot::scan(dir.path()).unwrap();
        assert_eq!(snap.names().collect::<Vec<_>>(), vec!["plan.md"]);
    }

    #[test]
    fn test_scan_detects_length_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.md");
        fs::write(&path, "short").unwrap();
        let first = Snapshot::scan(dir.path()).unwrap();

        fs::write(&path, "much longer content").unwrap();
        let second = Snapshot::scan(dir.path()).unwrap();

        assert_eq!(first.diff(&second, dir.path()), vec![WatchEvent::Updated(path)]);
    }

    #[test]
    fn test_scan_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let err = Snapshot::scan(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, WatchError::Scan { .. }));
    }
}
