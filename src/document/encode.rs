//! Encoder: targeted line edits on a raw document
//!
//! Only the lines being changed are rewritten; every other byte of the
//! document (other decisions, comments, unknown keys, line endings) is
//! carried over untouched.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

use super::decode::{classify, field_lines, sections, BodyLine, FieldKey};
use super::frontmatter::{self, clean_value, detect_eol, encode_value, strip_eol};
use super::types::{DecisionStatus, PlanStatus};
use crate::error::EncodeError;

/// Derived fields rewritten in the metadata block after a body edit
#[derive(Debug, Clone, PartialEq)]
pub struct PreambleUpdate {
    pub status: PlanStatus,
    pub answered: usize,
    pub remaining: usize,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// RFC 3339, UTC, second precision
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Answers live on one line: fold line breaks and trim
pub fn normalize_answer(answer: &str) -> String {
    answer.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Line ending carried by `line` (empty for a final unterminated line)
fn eol_of(line: &str) -> &str {
    &line[strip_eol(line).len()..]
}

/// Working copy of the document lines with deferred insertions
struct Edit {
    lines: Vec<String>,
    inserts: BTreeMap<usize, Vec<String>>,
    eol: &'static str,
}

impl Edit {
    fn new(raw: &str, lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            inserts: BTreeMap::new(),
            eol: detect_eol(raw),
        }
    }

    fn replace(&mut self, idx: usize, lead: &str, value: &str) {
        let eol = eol_of(&self.lines[idx]).to_string();
        self.lines[idx] = format!("{}{}{}", lead, value, eol);
    }

    /// Queue a new line to land right after line `after`
    fn insert_after(&mut self, after: usize, content: String) {
        self.inserts.entry(after).or_default().push(content);
    }

    fn finish(mut self) -> String {
        for (after, new_lines) in self.inserts.into_iter().rev() {
            let at = (after + 1).min(self.lines.len());
            if at > 0 && eol_of(&self.lines[at - 1]).is_empty() {
                self.lines[at - 1].push_str(self.eol);
            }
            let eol = self.eol;
            let rendered: Vec<String> = new_lines.into_iter().map(|l| l + eol).collect();
            self.lines.splice(at..at, rendered);
        }
        self.lines.concat()
    }
}

/// Lead for a new field line, following the style of an existing one
fn lead_like(template: &str, key: &str) -> String {
    let indent = &template[..template.len() - template.trim_start().len()];
    let body = template.trim_start();
    if body.starts_with("**") {
        if body.contains(":**") {
            format!("{}**{}:** ", indent, key)
        } else {
            format!("{}**{}**: ", indent, key)
        }
    } else {
        format!("{}{}: ", indent, key)
    }
}

/// Record `answer` on the decision whose id line matches `decision_id`.
///
/// Rewrites the decision's `status` line and writes `answer` / `answered_at`,
/// inserting any of the three that are missing. An answer the decoder would
/// not read back verbatim is written double-quoted. When the decision already
/// holds exactly this answer, its `answer` and `answered_at` lines are left
/// as they are, so repeating an edit is a no-op.
pub fn encode_answer(
    raw: &str,
    decision_id: &str,
    answer: &str,
    answered_at: DateTime<Utc>,
) -> Result<String, EncodeError> {
    let lines = frontmatter::split_lines(raw);
    let layout = frontmatter::layout(&lines).ok_or(EncodeError::NoMetadata)?;
    let answer = normalize_answer(answer);

    let mut target = None;
    for section in sections(&lines, &layout) {
        let fields = field_lines(&lines, &section);
        let Some(&id_idx) = fields.get(&FieldKey::Id) else {
            continue;
        };
        if field_value(lines[id_idx]).as_deref() == Some(decision_id) {
            target = Some((id_idx, fields));
            break;
        }
    }
    let (id_idx, fields) =
        target.ok_or_else(|| EncodeError::DecisionNotFound(decision_id.to_string()))?;

    let unchanged = fields
        .get(&FieldKey::Answer)
        .and_then(|&i| field_value(lines[i]))
        .is_some_and(|existing| existing == answer);

    let status = DecisionStatus::from_answer(Some(&answer));
    let timestamp = format_timestamp(answered_at);
    let template = field_lead(lines[id_idx]).unwrap_or_default();

    let mut edit = Edit::new(raw, &lines);
    let mut anchor = id_idx;
    let updates = [
        (FieldKey::Status, status.as_str().to_string()),
        (FieldKey::Answer, encode_value(&answer)),
        (FieldKey::AnsweredAt, timestamp),
    ];

    for (key, value) in updates {
        let keep = unchanged && key != FieldKey::Status;
        match fields.get(&key) {
            Some(&idx) => {
                if !keep {
                    let lead = field_lead(lines[idx]).unwrap_or_default();
                    edit.replace(idx, &lead, &value);
                }
                anchor = anchor.max(idx);
            }
            None => {
                let lead = lead_like(&template, key.as_str());
                edit.insert_after(anchor, format!("{}{}", lead, value));
            }
        }
    }

    Ok(edit.finish())
}

fn field_value(line: &str) -> Option<String> {
    match classify(line) {
        BodyLine::Field { value, .. } => clean_value(value),
        _ => None,
    }
}

fn field_lead(line: &str) -> Option<String> {
    match classify(line) {
        BodyLine::Field { lead, .. } => Some(lead.to_string()),
        _ => None,
    }
}

/// Lead of a metadata line: everything up to the value
fn meta_lead(line: &str) -> String {
    let content = strip_eol(line);
    match content.find(':') {
        Some(colon) => {
            let after = &content[colon + 1..];
            let spaces = after.len() - after.trim_start().len();
            if spaces == 0 {
                format!("{} ", &content[..=colon])
            } else {
                content[..colon + 1 + spaces].to_string()
            }
        }
        None => format!("{}: ", content.trim()),
    }
}

/// Rewrite the derived metadata fields without touching the body
pub fn encode_preamble(raw: &str, update: &PreambleUpdate) -> Result<String, EncodeError> {
    let lines = frontmatter::split_lines(raw);
    let layout = frontmatter::layout(&lines)
        .filter(|l| !l.meta.is_empty())
        .ok_or(EncodeError::NoMetadata)?;

    let mut fields = vec![
        ("status", update.status.as_str().to_string()),
        ("answered", update.answered.to_string()),
        ("remaining", update.remaining.to_string()),
        ("updated_at", format_timestamp(update.updated_at)),
    ];
    if let Some(completed_at) = update.completed_at {
        fields.push(("completed_at", format_timestamp(completed_at)));
    }

    let mut edit = Edit::new(raw, &lines);
    for (key, value) in fields {
        match frontmatter::find_entry(&lines, &layout, key) {
            Some(idx) => edit.replace(idx, &meta_lead(lines[idx]), &value),
            None => edit.insert_after(layout.meta.end - 1, format!("{}: {}", key, value)),
        }
    }

    Ok(edit.finish())
}
