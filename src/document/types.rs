//! Typed model of a queued plan document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reserved answer marking a decision as explicitly skipped
pub const SKIP_SENTINEL: &str = "__skipped__";

/// Plan priority. Variant order is severity rank: urgent sorts first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Severity rank, 0 = most urgent
    pub fn rank(self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Urgent => write!(f, "urgent"),
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "urgent" | "critical" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "normal" | "medium" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Plan lifecycle. Variant order is the only allowed direction of travel.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Pending,
    InProgress,
    Ready,
    Completed,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Pending => "pending",
            PlanStatus::InProgress => "in_progress",
            PlanStatus::Ready => "ready",
            PlanStatus::Completed => "completed",
        }
    }

    /// Status implied by the answer counters alone (never `Completed`)
    pub fn from_progress(total: usize, answered: usize) -> Self {
        if total > 0 && answered >= total {
            PlanStatus::Ready
        } else if answered > 0 {
            PlanStatus::InProgress
        } else {
            PlanStatus::Pending
        }
    }

    /// Move forward to `next` unless that would regress
    pub fn advance(self, next: PlanStatus) -> PlanStatus {
        self.max(next)
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(PlanStatus::Pending),
            "in_progress" => Ok(PlanStatus::InProgress),
            "ready" => Ok(PlanStatus::Ready),
            "completed" => Ok(PlanStatus::Completed),
            _ => Err(format!("Unknown plan status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    #[default]
    Pending,
    Answered,
    Skipped,
}

impl DecisionStatus {
    /// A decision's status is a function of its answer
    pub fn from_answer(answer: Option<&str>) -> Self {
        match answer {
            None => DecisionStatus::Pending,
            Some(SKIP_SENTINEL) => DecisionStatus::Skipped,
            Some(_) => DecisionStatus::Answered,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DecisionStatus::Pending => "pending",
            DecisionStatus::Answered => "answered",
            DecisionStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable choice
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DecisionOption {
    /// Machine key written as the answer
    pub key: String,

    /// Human label (falls back to the key)
    pub label: String,
}

/// One question within a plan
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Decision {
    pub id: String,

    /// N from the "Decision N: ..." heading
    pub number: u32,

    pub title: String,

    pub status: DecisionStatus,

    #[serde(default)]
    pub answer: Option<String>,

    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub context: String,

    #[serde(default)]
    pub options: Vec<DecisionOption>,

    pub allow_custom: bool,
}

impl Decision {
    pub fn is_open(&self) -> bool {
        self.answer.is_none()
    }

    pub fn is_skipped(&self) -> bool {
        self.status == DecisionStatus::Skipped
    }

    pub fn option(&self, key: &str) -> Option<&DecisionOption> {
        self.options.iter().find(|o| o.key == key)
    }

    /// Whether `answer` is acceptable for this decision
    pub fn accepts(&self, answer: &str) -> bool {
        answer == SKIP_SENTINEL
            || self.allow_custom
            || self.options.is_empty()
            || self.option(answer).is_some()
    }
}

/// One reviewable batch of decisions
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Plan {
    pub id: String,
    pub version: u32,
    pub agent: String,
    pub session: String,
    #[serde(default)]
    pub tag: String,
    pub title: String,
    pub priority: Priority,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    #[serde(default)]
    pub notify_session: Option<String>,

    /// Free text before the first decision section
    #[serde(default)]
    pub context: String,

    pub decisions: Vec<Decision>,

    /// File the plan was decoded from
    pub source: PathBuf,

    /// Full source text, kept so edits can preserve what the model drops
    #[serde(skip)]
    pub raw: String,
}

impl Plan {
    pub fn decision(&self, id: &str) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.id == id)
    }

    /// Position of a decision in document order
    pub fn decision_index(&self, id: &str) -> Option<usize> {
        self.decisions.iter().position(|d| d.id == id)
    }

    /// First decision still waiting for an answer
    pub fn next_open(&self) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.is_open())
    }

    /// Plans without decisions are kept but never shown to a consumer
    pub fn is_presentable(&self) -> bool {
        !self.decisions.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.status == PlanStatus::Ready
    }

    /// Decision id to final answer, in document order
    pub fn answers(&self) -> Vec<(String, String)> {
        self.decisions
            .iter()
            .filter_map(|d| d.answer.as_ref().map(|a| (d.id.clone(), a.clone())))
            .collect()
    }
}
