//! Detection of moderation rejections in renderer output.
//!
//! This is a contract with the renderer's log format. The markers and the
//! index pattern below match renderer output revision
//! [`MODERATION_LOG_FORMAT`]; when the renderer's logging changes, update the
//! fixtures in the tests together with these constants.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

/// Renderer log format the parser was validated against.
pub const MODERATION_LOG_FORMAT: u32 = 1;

/// Case-insensitive substrings that identify a moderation rejection.
pub const MODERATION_MARKERS: &[&str] = &[
    "moderation_blocked",
    "content_policy_violation",
    "rejected as a result of our safety system",
];

fn failed_image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\}\s*image\s+(\d+)").expect("valid regex"))
}

/// Whether the output carries any moderation marker.
pub fn is_moderation_blocked(output: &str) -> bool {
    let lower = output.to_lowercase();
    MODERATION_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Beat indices whose image step failed.
///
/// The renderer logs `} image <N>` when unwinding a failed image step and
/// follows it with a line containing `> image`. Only lines in that position
/// count. An empty set means the failing beats could not be identified.
pub fn failed_image_indices(output: &str) -> BTreeSet<usize> {
    let lines: Vec<&str> = output.lines().collect();
    let pattern = failed_image_pattern();

    lines
        .windows(2)
        .filter(|pair| pair[1].contains("> image"))
        .filter_map(|pair| pattern.captures(pair[0]))
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect()
}
