//! Decoder: raw document text to a typed [`Plan`]
//!
//! Every body line is classified once into a [`BodyLine`] variant and the
//! decision sections are assembled from those variants, so nothing later has
//! to re-scan text for prefixes.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::frontmatter::{self, clean_value, strip_eol, Layout};
use super::types::{Decision, DecisionOption, DecisionStatus, Plan, PlanStatus, Priority};
use crate::error::DecodeError;

/// Keys a decision section may declare on its own lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Id,
    Status,
    Answer,
    AnsweredAt,
    AllowCustom,
}

impl FieldKey {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKey::Id => "id",
            FieldKey::Status => "status",
            FieldKey::Answer => "answer",
            FieldKey::AnsweredAt => "answered_at",
            FieldKey::AllowCustom => "allow_custom",
        }
    }

    fn parse(key: &str) -> Option<Self> {
        match key.to_lowercase().as_str() {
            "id" => Some(FieldKey::Id),
            "status" => Some(FieldKey::Status),
            "answer" => Some(FieldKey::Answer),
            "answered_at" => Some(FieldKey::AnsweredAt),
            "allow_custom" => Some(FieldKey::AllowCustom),
            _ => None,
        }
    }
}

/// One classified body line
#[derive(Debug, Clone, PartialEq)]
pub enum BodyLine<'a> {
    Heading { number: u32, title: &'a str },
    Field { key: FieldKey, lead: &'a str, value: &'a str },
    ContextLabel(&'a str),
    OptionsLabel,
    OptionItem(DecisionOption),
    Blank,
    Text(&'a str),
}

/// A decision section: heading line plus the lines up to the next heading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub number: u32,
    pub title: String,
    pub heading: usize,
    pub lines: Range<usize>,
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s{0,3}#{1,6}\s+decision\s+(\d+)\s*[:.\-–—]?\s*(.*?)\s*#*\s*$")
            .expect("valid heading regex")
    })
}

fn field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?P<lead>\s*\**(?P<key>id|status|answer|answered_at|allow_custom)\**\s*:\s*\**\s*)(?P<value>.*?)\s*$",
        )
        .expect("valid field regex")
    })
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*\**(?P<label>context|options)\**\s*:\s*\**\s*(?P<rest>.*?)\s*$")
            .expect("valid label regex")
    })
}

fn item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(?P<item>.+?)\s*$").expect("valid option regex")
    })
}

/// Classify a single body line (code fence tracking is the caller's job)
pub fn classify(line: &str) -> BodyLine<'_> {
    let line = strip_eol(line);

    if line.trim().is_empty() {
        return BodyLine::Blank;
    }

    if let Some(caps) = heading_re().captures(line) {
        if let Ok(number) = caps[1].parse() {
            let title = caps.get(2).map_or("", |m| m.as_str());
            return BodyLine::Heading { number, title };
        }
    }

    if let Some(caps) = field_re().captures(line) {
        if let (Some(key), Some(lead), Some(value)) =
            (caps.name("key"), caps.name("lead"), caps.name("value"))
        {
            if let Some(key) = FieldKey::parse(key.as_str()) {
                // Strip a closing bold marker left on the value ("**id**: x**")
                let value = value.as_str().trim_end_matches('*').trim_end();
                return BodyLine::Field {
                    key,
                    lead: lead.as_str(),
                    value,
                };
            }
        }
    }

    if let Some(caps) = label_re().captures(line) {
        let rest = caps.name("rest").map_or("", |m| m.as_str());
        return match caps["label"].to_lowercase().as_str() {
            "options" => BodyLine::OptionsLabel,
            _ => BodyLine::ContextLabel(rest),
        };
    }

    if let Some(caps) = item_re().captures(line) {
        if let Some(option) = parse_option(&caps["item"]) {
            return BodyLine::OptionItem(option);
        }
    }

    BodyLine::Text(line.trim())
}

/// Parse an option item: `key`, `` `key` ``, `key: label`, `key - label`, `key — label`
pub fn parse_option(item: &str) -> Option<DecisionOption> {
    let item = item.trim();

    let (key, rest) = if let Some(stripped) = item.strip_prefix('`') {
        let end = stripped.find('`')?;
        (&stripped[..end], &stripped[end + 1..])
    } else {
        [": ", " - ", " — ", " – "]
            .iter()
            .filter_map(|sep| item.find(sep).map(|idx| (idx, sep.len())))
            .min_by_key(|(idx, _)| *idx)
            .map(|(idx, len)| (&item[..idx], &item[idx + len..]))
            .unwrap_or((item, ""))
    };

    let key = key.trim().trim_matches('*').trim();
    if key.is_empty() {
        return None;
    }

    let label = rest
        .trim()
        .trim_start_matches([':', '-', '—', '–'])
        .trim();
    let label = if label.is_empty() { key } else { label };

    Some(DecisionOption {
        key: key.to_string(),
        label: label.to_string(),
    })
}

fn is_code_fence(line: &str) -> bool {
    let trimmed = strip_eol(line).trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Classify body lines, treating anything inside a code fence as text
pub fn classify_range<'a>(lines: &[&'a str], range: Range<usize>) -> Vec<(usize, BodyLine<'a>)> {
    let mut in_code = false;
    let mut out = Vec::with_capacity(range.len());
    for i in range {
        let line = lines[i];
        if is_code_fence(line) {
            in_code = !in_code;
            out.push((i, BodyLine::Text(strip_eol(line).trim())));
            continue;
        }
        if in_code {
            out.push((i, BodyLine::Text(strip_eol(line))));
        } else {
            out.push((i, classify(line)));
        }
    }
    out
}

/// Split the body into decision sections
pub fn sections(lines: &[&str], layout: &Layout) -> Vec<Section> {
    let body = classify_range(lines, layout.body_start..lines.len());
    let mut out: Vec<Section> = Vec::new();

    for (idx, line) in &body {
        if let BodyLine::Heading { number, title } = line {
            if let Some(prev) = out.last_mut() {
                prev.lines.end = *idx;
            }
            out.push(Section {
                number: *number,
                title: title.to_string(),
                heading: *idx,
                lines: idx + 1..lines.len(),
            });
        }
    }

    out
}

/// Classify a section's lines. Fields only count in the leading run of field
/// and blank lines; after the first label, option or text line a `key: value`
/// line is prose.
pub fn classify_section<'a>(
    lines: &[&'a str],
    section: &Section,
) -> Vec<(usize, BodyLine<'a>)> {
    let mut in_fields = true;
    classify_range(lines, section.lines.clone())
        .into_iter()
        .map(|(idx, line)| match line {
            BodyLine::Field { .. } if !in_fields => {
                (idx, BodyLine::Text(strip_eol(lines[idx]).trim()))
            }
            BodyLine::Field { .. } | BodyLine::Blank => (idx, line),
            other => {
                in_fields = false;
                (idx, other)
            }
        })
        .collect()
}

/// Line index of each field's first occurrence within a section
pub fn field_lines(lines: &[&str], section: &Section) -> HashMap<FieldKey, usize> {
    let mut found = HashMap::new();
    for (idx, line) in classify_section(lines, section) {
        if let BodyLine::Field { key, .. } = line {
            found.entry(key).or_insert(idx);
        }
    }
    found
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Block {
    Fields,
    Context,
    Options,
}

#[derive(Default)]
struct DecisionDraft<'a> {
    fields: HashMap<FieldKey, &'a str>,
    context: Vec<&'a str>,
    loose: Vec<&'a str>,
    options: Vec<DecisionOption>,
}

fn build_decision(lines: &[&str], section: &Section) -> Option<Decision> {
    let mut draft = DecisionDraft::default();
    let mut block = Block::Fields;

    for (idx, line) in classify_section(lines, section) {
        match line {
            BodyLine::Field { key, value, .. } => {
                draft.fields.entry(key).or_insert(value);
                block = Block::Fields;
            }
            BodyLine::ContextLabel(rest) => {
                if !rest.is_empty() {
                    draft.context.push(rest);
                }
                block = Block::Context;
            }
            BodyLine::OptionsLabel => block = Block::Options,
            BodyLine::OptionItem(option) => match block {
                Block::Options => draft.options.push(option),
                Block::Context => draft.context.push(strip_eol(lines[idx]).trim()),
                Block::Fields => draft.loose.push(strip_eol(lines[idx]).trim()),
            },
            BodyLine::Blank => {
                if block == Block::Context && !draft.context.is_empty() {
                    block = Block::Fields;
                }
            }
            BodyLine::Text(text) => match block {
                Block::Context => draft.context.push(text),
                Block::Options => {
                    block = Block::Fields;
                    draft.loose.push(text);
                }
                Block::Fields => draft.loose.push(text),
            },
            BodyLine::Heading { .. } => {}
        }
    }

    let id = draft.fields.get(&FieldKey::Id).and_then(|v| clean_value(v));
    let Some(id) = id else {
        warn!(
            "Discarding decision {} ('{}'): no id line",
            section.number, section.title
        );
        return None;
    };

    let answer = draft
        .fields
        .get(&FieldKey::Answer)
        .and_then(|v| clean_value(v));
    let answered_at = draft
        .fields
        .get(&FieldKey::AnsweredAt)
        .and_then(|v| clean_value(v))
        .and_then(|v| parse_timestamp(&v));
    let status = DecisionStatus::from_answer(answer.as_deref());

    if let Some(declared) = draft.fields.get(&FieldKey::Status) {
        if !declared.eq_ignore_ascii_case(status.as_str()) {
            debug!(
                "Decision '{}' declares status '{}' but its answer implies '{}'",
                id, declared, status
            );
        }
    }

    let allow_custom = draft
        .fields
        .get(&FieldKey::AllowCustom)
        .and_then(|v| parse_bool(v))
        .unwrap_or(draft.options.is_empty());

    let context = if draft.context.is_empty() {
        draft.loose.join("\n")
    } else {
        draft.context.join("\n")
    };

    Some(Decision {
        id,
        number: section.number,
        title: section.title.clone(),
        status,
        answer,
        answered_at,
        context: context.trim().to_string(),
        options: draft.options,
        allow_custom,
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" => Some(true),
        "false" | "no" | "n" | "0" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn required<'a>(
    meta: &'a HashMap<String, String>,
    key: &'static str,
) -> Result<&'a str, DecodeError> {
    meta.get(key)
        .map(String::as_str)
        .ok_or(DecodeError::MissingField(key))
}

/// Decode using the current clock for missing timestamps
pub fn decode(raw: &str, source: &Path) -> Result<Plan, DecodeError> {
    decode_at(raw, source, Utc::now())
}

/// Decode with an explicit "decode time". Same input, same output.
pub fn decode_at(raw: &str, source: &Path, now: DateTime<Utc>) -> Result<Plan, DecodeError> {
    let lines = frontmatter::split_lines(raw);
    let layout = frontmatter::layout(&lines).ok_or(DecodeError::NoMetadata)?;
    let meta = frontmatter::entries(&lines, &layout);

    let id = required(&meta, "id")?.to_string();
    let agent = required(&meta, "agent")?.to_string();
    let session = required(&meta, "session")?.to_string();
    let title = required(&meta, "title")?.to_string();
    let declared: PlanStatus = required(&meta, "status")?
        .parse()
        .map_err(|_| DecodeError::InvalidStatus(meta["status"].clone()))?;

    let version = meta
        .get("version")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let tag = meta.get("tag").cloned().unwrap_or_default();
    let priority = match meta.get("priority") {
        Some(p) => p.parse().unwrap_or_else(|_| {
            debug!("Plan '{}' has unknown priority '{}', using normal", id, p);
            Priority::Normal
        }),
        None => Priority::Normal,
    };

    let created_at = meta
        .get("created_at")
        .and_then(|v| parse_timestamp(v))
        .unwrap_or(now);
    let updated_at = meta
        .get("updated_at")
        .and_then(|v| parse_timestamp(v))
        .unwrap_or(created_at);
    let completed_at = meta.get("completed_at").and_then(|v| parse_timestamp(v));
    let notify_session = meta.get("notify_session").cloned();

    let sections = sections(&lines, &layout);
    let context_end = sections.first().map_or(lines.len(), |s| s.heading);
    let context = lines[layout.body_start.min(context_end)..context_end]
        .concat()
        .trim()
        .to_string();

    let mut decisions: Vec<Decision> = Vec::with_capacity(sections.len());
    for section in &sections {
        if let Some(decision) = build_decision(&lines, section) {
            if decisions.iter().any(|d| d.id == decision.id) {
                warn!(
                    "Plan '{}' repeats decision id '{}'; keeping the first",
                    id, decision.id
                );
                continue;
            }
            decisions.push(decision);
        }
    }

    let total = decisions.len();
    let answered = decisions.iter().filter(|d| !d.is_open()).count();
    let remaining = total - answered;

    for (key, actual) in [("total", total), ("answered", answered), ("remaining", remaining)] {
        if let Some(stated) = meta.get(key) {
            if stated.parse::<usize>().ok() != Some(actual) {
                debug!(
                    "Plan '{}' states {}={} but decisions give {}",
                    id, key, stated, actual
                );
            }
        }
    }

    let progress = PlanStatus::from_progress(total, answered);
    let status = if declared >= PlanStatus::Ready && remaining > 0 {
        warn!(
            "Plan '{}' declares '{}' with {} open decisions; treating as '{}'",
            id, declared, remaining, progress
        );
        progress
    } else {
        declared.advance(progress)
    };

    Ok(Plan {
        id,
        version,
        agent,
        session,
        tag,
        title,
        priority,
        status,
        created_at,
        updated_at,
        completed_at,
        total,
        answered,
        remaining,
        notify_session,
        context,
        decisions,
        source: source.to_path_buf(),
        raw: raw.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::document::types::SKIP_SENTINEL;
    use chrono::TimeZone;

    pub(crate) const TWO_DECISIONS: &str = "---
id: plan-001
agent: claude
session: sess-42
title: Storage layer choices
status: pending
priority: high
tag: backend
created_at: 2026-10-16T09:00:00Z
updated_at: 2026-10-16T09:00:00Z
total: 2
answered: 0
remaining: 2
notify_session: sess-notify
# producer comment kept verbatim
---

We need to pick a storage layer before the migration.

## Decision 1: Which database?

id: db
status: pending

**Context:** We need durable storage for queue items.
Latency matters more than throughput.

**Options:**
- `option-a` — PostgreSQL
- `option-b` — SQLite

## Decision 2: Cache eviction

id: cache
status: pending
allow_custom: true

**Context:** How should the cache evict entries?

**Options:**
- lru
- ttl: Time based expiry
";

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn decode_fixture(raw: &str) -> Result<Plan, DecodeError> {
        decode_at(raw, Path::new("pending/plan-001.md"), fixed_now())
    }

    #[test]
    fn test_decode_two_decision_plan() {
        let plan = decode_fixture(TWO_DECISIONS).unwrap();

        assert_eq!(plan.id, "plan-001");
        assert_eq!(plan.priority, Priority::High);
        assert_eq!(plan.tag, "backend");
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.total, 2);
        assert_eq!(plan.answered, 0);
        assert_eq!(plan.remaining, 2);
        assert_eq!(plan.decisions.len(), 2);
        assert_eq!(plan.notify_session.as_deref(), Some("sess-notify"));
        assert_eq!(
            plan.context,
            "We need to pick a storage layer before the migration."
        );

        let first = &plan.decisions[0];
        assert_eq!(first.id, "db");
        assert_eq!(first.number, 1);
        assert_eq!(first.title, "Which database?");
        let keys: Vec<_> = first.options.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["option-a", "option-b"]);
        assert_eq!(first.options[0].label, "PostgreSQL");
        assert!(!first.allow_custom);
        assert_eq!(
            first.context,
            "We need durable storage for queue items.\nLatency matters more than throughput."
        );

        let second = &plan.decisions[1];
        assert!(second.allow_custom);
        assert_eq!(second.options[0].label, "lru");
        assert_eq!(second.options[1].label, "Time based expiry");
    }

    #[test]
    fn test_decode_is_deterministic() {
        let a = decode_fixture(TWO_DECISIONS).unwrap();
        let b = decode_fixture(TWO_DECISIONS).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_status_is_rejected() {
        let raw = TWO_DECISIONS.replace("status: pending\npriority", "priority");
        assert_eq!(
            decode_fixture(&raw),
            Err(DecodeError::MissingField("status"))
        );
    }

    #[test]
    fn test_missing_fence_close_is_rejected() {
        let raw = "---\nid: x\nagent: a\n";
        assert_eq!(decode_fixture(raw), Err(DecodeError::NoMetadata));
    }

    #[test]
    fn test_optional_keys_default() {
        let raw = "id: p\nagent: a\nsession: s\ntitle: T\nstatus: pending\n\nJust context.\n";
        let plan = decode_fixture(raw).unwrap();
        assert_eq!(plan.version, 1);
        assert_eq!(plan.tag, "");
        assert_eq!(plan.priority, Priority::Normal);
        assert_eq!(plan.created_at, fixed_now());
        assert_eq!(plan.updated_at, fixed_now());
        assert_eq!(plan.completed_at, None);
        assert_eq!(plan.notify_session, None);
        assert!(plan.decisions.is_empty());
        assert!(!plan.is_presentable());
        assert_eq!((plan.total, plan.answered, plan.remaining), (0, 0, 0));
    }

    #[test]
    fn test_decision_without_id_is_discarded() {
        let raw = TWO_DECISIONS.replace("id: db\n", "");
        let plan = decode_fixture(&raw).unwrap();
        assert_eq!(plan.decisions.len(), 1);
        assert_eq!(plan.decisions[0].id, "cache");
        assert_eq!(plan.total, 1);
    }

    #[test]
    fn test_counters_recomputed_over_stale_metadata() {
        let raw = TWO_DECISIONS
            .replace("answered: 0", "answered: 7")
            .replace("status: pending\n\n**Context:** We need", "status: answered\nanswer: option-b\n\n**Context:** We need");
        let plan = decode_fixture(&raw).unwrap();
        assert_eq!(plan.answered, 1);
        assert_eq!(plan.remaining, 1);
        assert_eq!(plan.answered + plan.remaining, plan.total);
        assert_eq!(plan.status, PlanStatus::InProgress);
    }

    #[test]
    fn test_skip_sentinel_decodes_as_skipped() {
        let raw = TWO_DECISIONS.replace(
            "status: pending\n\n**Context:** We need",
            &format!("status: skipped\nanswer: {}\n\n**Context:** We need", SKIP_SENTINEL),
        );
        let plan = decode_fixture(&raw).unwrap();
        assert!(plan.decisions[0].is_skipped());
        assert_eq!(plan.answered, 1);
    }

    #[test]
    fn test_completed_with_open_decisions_is_sanitised() {
        let raw = TWO_DECISIONS.replace("status: pending\npriority", "status: completed\npriority");
        let plan = decode_fixture(&raw).unwrap();
        assert_eq!(plan.status, PlanStatus::Pending);
    }

    #[test]
    fn test_heading_inside_code_fence_is_ignored() {
        let raw = TWO_DECISIONS.replace(
            "We need to pick",
            "```\n## Decision 9: not real\nid: fake\n```\n\nWe need to pick",
        );
        let plan = decode_fixture(&raw).unwrap();
        assert_eq!(plan.decisions.len(), 2);
        assert!(plan.decision("fake").is_none());
    }

    #[test]
    fn test_bold_field_style() {
        let raw = "---\nid: p\nagent: a\nsession: s\ntitle: T\nstatus: pending\n---\n\n### Decision 1 - Name\n\n**id:** naming\n**Status**: pending\n\nContext: Pick a name.\n\nOptions:\n1. alpha\n2. beta - Second choice\n";
        let plan = decode_fixture(raw).unwrap();
        let decision = &plan.decisions[0];
        assert_eq!(decision.id, "naming");
        assert_eq!(decision.title, "Name");
        assert_eq!(decision.context, "Pick a name.");
        assert_eq!(decision.options.len(), 2);
        assert_eq!(decision.options[1].key, "beta");
        assert_eq!(decision.options[1].label, "Second choice");
    }

    const PROSE_FIELDS: &str = "---
id: p
agent: a
session: s
title: T
status: pending
---

## Decision 1: Deploy window

id: deploy

**Context:** We want to ship this week.
Status: staging is currently broken.
Answer: depends on QA.

**Options:**
- now
- later
";

    #[test]
    fn test_field_like_prose_stays_context() {
        let plan = decode_fixture(PROSE_FIELDS).unwrap();
        let decision = &plan.decisions[0];

        assert_eq!(decision.answer, None);
        assert_eq!(decision.status, DecisionStatus::Pending);
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.remaining, 1);
        assert_eq!(
            decision.context,
            "We want to ship this week.\nStatus: staging is currently broken.\nAnswer: depends on QA."
        );
        assert_eq!(decision.options.len(), 2);
    }

    #[test]
    fn test_fields_after_text_are_ignored() {
        let raw = PROSE_FIELDS.replace(
            "id: deploy\n",
            "id: deploy\nNote first.\nanswer: now\n",
        );
        let plan = decode_fixture(&raw).unwrap();
        assert!(plan.decisions[0].is_open());
    }

    #[test]
    fn test_duplicate_decision_id_keeps_first() {
        let raw = TWO_DECISIONS.replace("id: cache", "id: db");
        let plan = decode_fixture(&raw).unwrap();
        assert_eq!(plan.decisions.len(), 1);
        assert_eq!(plan.decisions[0].title, "Which database?");
    }

    #[test]
    fn test_parse_option_variants() {
        let opt = parse_option("`pg` — PostgreSQL").unwrap();
        assert_eq!((opt.key.as_str(), opt.label.as_str()), ("pg", "PostgreSQL"));
        let opt = parse_option("sqlite: Embedded").unwrap();
        assert_eq!((opt.key.as_str(), opt.label.as_str()), ("sqlite", "Embedded"));
        let opt = parse_option("option-a").unwrap();
        assert_eq!((opt.key.as_str(), opt.label.as_str()), ("option-a", "option-a"));
        assert!(parse_option("``").is_none());
    }
}
