//! Plan documents: typed model plus the decode/encode pair
//!
//! Decode is read-only and pure. Encode never re-serialises a whole plan; it
//! edits the handful of lines that change so producer formatting survives.

pub mod decode;
pub mod encode;
pub mod frontmatter;
pub mod types;

pub use decode::{decode, decode_at};
pub use encode::{encode_answer, encode_preamble, format_timestamp, normalize_answer, PreambleUpdate};
pub use types::{
    Decision, DecisionOption, DecisionStatus, Plan, PlanStatus, Priority, SKIP_SENTINEL,
};
