//! Metadata block handling
//!
//! A document opens with either a `---` fenced block or a bare run of
//! `key: value` lines ended by the first blank line. Both decode and encode
//! work on the same line indices so edits land exactly where decode read.

use std::collections::HashMap;
use std::ops::Range;

const FENCE: &str = "---";

/// Where the metadata block and body sit, as line indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Lines holding `key: value` entries (fences excluded)
    pub meta: Range<usize>,

    /// Whether the block is wrapped in `---` fences
    pub fenced: bool,

    /// First line of the markdown body
    pub body_start: usize,
}

/// Split text into lines, keeping line endings so edits are byte-exact
pub fn split_lines(raw: &str) -> Vec<&str> {
    raw.split_inclusive('\n').collect()
}

/// Line content without its trailing `\n` / `\r\n`
pub fn strip_eol(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}

/// Line ending used by the document (first line decides)
pub fn detect_eol(raw: &str) -> &'static str {
    match raw.find('\n') {
        Some(idx) if idx > 0 && raw.as_bytes()[idx - 1] == b'\r' => "\r\n",
        _ => "\n",
    }
}

/// Locate the metadata block. `None` when a fence is opened but never closed.
pub fn layout(lines: &[&str]) -> Option<Layout> {
    let first = lines.first().map(|l| strip_eol(l).trim());

    if first == Some(FENCE) {
        let close = lines
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, l)| strip_eol(l).trim() == FENCE)
            .map(|(i, _)| i)?;
        return Some(Layout {
            meta: 1..close,
            fenced: true,
            body_start: close + 1,
        });
    }

    let end = lines
        .iter()
        .position(|l| strip_eol(l).trim().is_empty())
        .unwrap_or(lines.len());
    Some(Layout {
        meta: 0..end,
        fenced: false,
        body_start: end,
    })
}

/// Parse one metadata line into `(key, value)`. Comments yield `None`.
pub fn parse_entry(line: &str) -> Option<(String, Option<String>)> {
    let line = strip_eol(line).trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }

    Some((key.to_string(), clean_value(value)))
}

/// Trim, unquote and map the null spellings to `None`.
///
/// A quoted value is taken literally: `"null"` is the text null, and inside
/// double quotes `\"` and `\\` are escapes.
pub fn clean_value(value: &str) -> Option<String> {
    let value = value.trim();
    let quoted = |q: char| value.len() >= 2 && value.starts_with(q) && value.ends_with(q);

    let literal = if quoted('"') {
        unescape(&value[1..value.len() - 1])
    } else if quoted('\'') {
        value[1..value.len() - 1].to_string()
    } else {
        return match value {
            "" | "null" | "~" => None,
            v => Some(v.to_string()),
        };
    };

    (!literal.is_empty()).then_some(literal)
}

fn unescape(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next @ ('"' | '\\')) => out.push(next),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Wrap in double quotes, escaping backslashes and quotes
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render a single-line value so that it reads back unchanged, both as a
/// metadata entry and as a decision field. Plain text stays bare.
pub fn encode_value(value: &str) -> String {
    let bare = clean_value(value).as_deref() == Some(value)
        && !value.starts_with('*')
        && !value.ends_with('*');
    if bare {
        value.to_string()
    } else {
        quote(value)
    }
}

/// Collect metadata entries; the first occurrence of a key wins
pub fn entries(lines: &[&str], layout: &Layout) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in &lines[layout.meta.clone()] {
        if let Some((key, Some(value))) = parse_entry(line) {
            map.entry(key).or_insert(value);
        }
    }
    map
}

/// Index of the line defining `key`, if any
pub fn find_entry(lines: &[&str], layout: &Layout, key: &str) -> Option<usize> {
    layout
        .meta
        .clone()
        .find(|&i| parse_entry(lines[i]).is_some_and(|(k, _)| k == key))
}
