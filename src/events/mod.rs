//! Field extraction for classified log lines. Every extractor is a pure
//! function over the raw line; state changes happen in the tailing loop.

pub mod account;
pub mod actor_death;
pub mod presence;
pub mod vehicle;

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

static LOG_TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<(\d{4}-\d{2}-\d{2}T[^>]+)>").expect("valid timestamp regex"));

static INSTANCE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)_\d+$").expect("valid instance suffix regex"));

/// Timestamp the game stamps at the start of each line.
pub fn log_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let captures = LOG_TIMESTAMP_RE.captures(line)?;
    DateTime::parse_from_rfc3339(&captures[1])
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}

/// Strips the trailing `_<digits>` instance id from an entity name
/// (`ANVL_Arrow_3108612379131` -> `ANVL_Arrow`).
pub fn strip_instance_suffix(instance: &str) -> &str {
    INSTANCE_SUFFIX_RE
        .captures(instance)
        .and_then(|captures| captures.get(1))
        .map(|class| class.as_str())
        .unwrap_or(instance)
}

fn capture_text(regex: &Regex, line: &str, group: usize) -> Option<String> {
    regex
        .captures(line)?
        .get(group)
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}
