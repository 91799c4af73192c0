//! Rendering for the CLI adapter: plain text for people, JSON for scripts

mod text;

pub use text::{render_list, render_plan, render_stats};

use serde::Serialize;

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}
