//! Small cross-cutting helpers shared by several modules.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as seconds since epoch, matching the `REAL` mtime columns
/// used throughout the schema (spec.md §3: "last-modified timestamp
/// (seconds, float)").
pub fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Content hash used for AST/CST uniqueness keys (spec.md §3).
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}
