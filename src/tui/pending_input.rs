//! "Awaiting custom input" state, one entry per consumer
//!
//! Entries expire after a fixed TTL. Expiry is checked when an entry is read;
//! nothing runs in the background.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInput {
    pub plan_id: String,
    pub decision_id: String,
    pub buffer: String,
    started: Instant,
}

#[derive(Debug)]
pub struct PendingInputs {
    ttl: Duration,
    entries: HashMap<String, PendingInput>,
}

impl PendingInputs {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Start waiting for `consumer` to type an answer, replacing any earlier prompt
    pub fn begin(&mut self, consumer: &str, plan_id: &str, decision_id: &str, now: Instant) {
        self.entries.insert(
            consumer.to_string(),
            PendingInput {
                plan_id: plan_id.to_string(),
                decision_id: decision_id.to_string(),
                buffer: String::new(),
                started: now,
            },
        );
    }

    fn expired(&self, entry: &PendingInput, now: Instant) -> bool {
        now.saturating_duration_since(entry.started) >= self.ttl
    }

    /// Live entry for `consumer`; an expired one is dropped and reads as absent
    pub fn get_mut(&mut self, consumer: &str, now: Instant) -> Option<&mut PendingInput> {
        let expired = self
            .entries
            .get(consumer)
            .is_some_and(|e| self.expired(e, now));
        if expired {
            self.entries.remove(consumer);
            return None;
        }
        self.entries.get_mut(consumer)
    }

    /// Read-only view for drawing
    pub fn peek(&self, consumer: &str, now: Instant) -> Option<&PendingInput> {
        self.entries
            .get(consumer)
            .filter(|e| !self.expired(e, now))
    }

    /// Remove and return the live entry
    pub fn take(&mut self, consumer: &str, now: Instant) -> Option<PendingInput> {
        let entry = self.entries.remove(consumer)?;
        (!self.expired(&entry, now)).then_some(entry)
    }

    pub fn cancel(&mut self, consumer: &str) {
        self.entries.remove(consumer);
    }

    /// Time left before the entry for `consumer` expires
    pub fn remaining(&self, consumer: &str, now: Instant) -> Option<Duration> {
        self.peek(consumer, now)
            .map(|e| self.ttl.saturating_sub(now.saturating_duration_since(e.started)))
    }
}
