//! Completion notifications handed back to the producer
//!
//! One document per completed plan that names a `notify_session`. The file
//! name is derived from the target session and plan id, so a repeated
//! completion overwrites instead of piling up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::document::frontmatter::{
    self, clean_value, encode_value, quote, split_lines, strip_eol,
};
use crate::document::{format_timestamp, Plan};
use crate::error::{DecodeError, FsError};
use crate::fsops;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Notification {
    pub plan_id: String,
    pub plan_title: String,
    pub agent: String,
    pub session: String,
    pub notify_session: String,
    pub completed_at: DateTime<Utc>,

    /// Decision id to final answer, in decision order
    pub answers: Vec<(String, String)>,
}

impl Notification {
    /// Build the notification for a completed plan, if it asks for one
    pub fn from_plan(plan: &Plan) -> Option<Self> {
        let notify_session = plan.notify_session.clone()?;
        Some(Self {
            plan_id: plan.id.clone(),
            plan_title: plan.title.clone(),
            agent: plan.agent.clone(),
            session: plan.session.clone(),
            notify_session,
            completed_at: plan.completed_at.unwrap_or(plan.updated_at),
            answers: plan.answers(),
        })
    }

    /// `<first 16 hex of sha256(notify_session:plan_id)>.md`
    pub fn file_name(&self) -> String {
        file_name_for(&self.notify_session, &self.plan_id)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("---\n");
        out.push_str(&format!("plan_id: {}\n", encode_value(&self.plan_id)));
        out.push_str(&format!("plan_title: {}\n", quote(&self.plan_title)));
        out.push_str(&format!("agent: {}\n", encode_value(&self.agent)));
        out.push_str(&format!("session: {}\n", encode_value(&self.session)));
        out.push_str(&format!(
            "notify_session: {}\n",
            encode_value(&self.notify_session)
        ));
        out.push_str(&format!(
            "completed_at: {}\n",
            format_timestamp(self.completed_at)
        ));
        out.push_str("---\n\n");
        for (id, answer) in &self.answers {
            out.push_str(&format!("{}: {}\n", id, encode_value(answer)));
        }
        out
    }

    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let lines = split_lines(raw);
        let layout = frontmatter::layout(&lines).ok_or(DecodeError::NoMetadata)?;
        let meta = frontmatter::entries(&lines, &layout);

        let field = |key: &'static str| -> Result<String, DecodeError> {
            meta.get(key).cloned().ok_or(DecodeError::MissingField(key))
        };

        let completed_raw = field("completed_at")?;
        let completed_at = DateTime::parse_from_rfc3339(&completed_raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| DecodeError::MissingField("completed_at"))?;

        let answers = lines[layout.body_start..]
            .iter()
            .filter_map(|line| {
                let (id, answer) = strip_eol(line).split_once(':')?;
                let id = id.trim();
                let answer = clean_value(answer)?;
                (!id.is_empty()).then(|| (id.to_string(), answer))
            })
            .collect();

        Ok(Self {
            plan_id: field("plan_id")?,
            plan_title: field("plan_title")?,
            agent: field("agent")?,
            session: field("session")?,
            notify_session: field("notify_session")?,
            completed_at,
            answers,
        })
    }

    /// Atomically write into `notify_dir`, returning the final path
    pub fn write_to(&self, notify_dir: &Path) -> Result<PathBuf, FsError> {
        let path = notify_dir.join(self.file_name());
        fsops::write_atomically(&path, &self.render())?;
        Ok(path)
    }
}

pub fn file_name_for(notify_session: &str, plan_id: &str) -> String {
    let input = format!("{}:{}", notify_session, plan_id);
    let hash = Sha256::digest(input.as_bytes());
    format!("{}.md", &format!("{:x}", hash)[..16])
}
