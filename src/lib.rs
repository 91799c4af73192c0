//! File-backed decision queue.
//!
//! Producers drop plan documents into `pending/`; a [`manager::QueueManager`]
//! keeps them decoded in memory, records answers with atomic in-place edits,
//! and on submit archives the plan to `completed/` and leaves a notification
//! in `notify/`.

pub mod config;
pub mod document;
pub mod error;
pub mod fsops;
pub mod manager;
pub mod notification;
pub mod output;
pub mod watcher;

pub use config::Config;
pub use document::{Decision, DecisionStatus, Plan, PlanStatus, Priority, SKIP_SENTINEL};
pub use error::QueueError;
pub use manager::{QueueManager, QueuePaths, QueueStats};
pub use notification::Notification;
