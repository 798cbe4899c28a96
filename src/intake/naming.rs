//! Stored file names for accepted documents.
//!
//! Shape: `<YYYYMMDD_HHMMSS>_<submitter name><.ext>`, timestamp in UTC+5.
//! Two uploads only collide when the same submitter name lands in the same
//! second. One session per chat makes that unlikely enough that no collision
//! check is done; a collision overwrites the earlier file.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use regex::Regex;

use super::validate::extension;

/// Offset used for the timestamp prefix (Tashkent, UTC+5).
pub const TIMESTAMP_OFFSET_SECS: i32 = 5 * 3600;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const SEPARATOR: char = '_';
const MAX_NAME_CHARS: usize = 64;
const FALLBACK_NAME: &str = "submitter";

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Characters that are unsafe in file names on common filesystems.
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f\x7f]"#).expect("valid regex"));

/// Build the stored name for a document.
///
/// `original_file_name` only contributes its extension (lowercased).
pub fn generate_name(
    timestamp: DateTime<Utc>,
    submitter_name: &str,
    original_file_name: &str,
) -> String {
    let extension = extension(original_file_name)
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default();

    format!(
        "{}{SEPARATOR}{}{extension}",
        format_timestamp(timestamp),
        sanitize_name(submitter_name)
    )
}

/// Second-resolution, lexically sortable timestamp in UTC+5.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    let offset = FixedOffset::east_opt(TIMESTAMP_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
    timestamp
        .with_timezone(&offset)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Make a submitter name safe to embed in a file name.
pub fn sanitize_name(name: &str) -> String {
    let stripped = UNSAFE_CHARS.replace_all(name.trim(), "");
    let joined = WHITESPACE.replace_all(stripped.trim(), SEPARATOR.to_string().as_str());
    let cleaned: String = joined
        .trim_start_matches('.')
        .chars()
        .take(MAX_NAME_CHARS)
        .collect();

    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}
