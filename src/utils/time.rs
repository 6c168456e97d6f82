use chrono::{DateTime, Local};
use regex::Regex;
use std::sync::LazyLock;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\-_\.]").expect("sanitize pattern"));

/// `<sanitized target>_<YYYYMMDD_HHMMSS>`; doubles as the run directory name.
pub fn new_run_id(target: &str) -> String {
    run_id_at(target, Local::now())
}

pub fn run_id_at(target: &str, at: DateTime<Local>) -> String {
    format!("{}_{}", sanitize_target(target), at.format("%Y%m%d_%H%M%S"))
}

/// Replace characters that aren't safe in a directory name.
pub fn sanitize_target(target: &str) -> String {
    let sanitized = UNSAFE_CHARS.replace_all(target, "_");
    let trimmed = sanitized.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "target".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn format_duration_ms(ms: u128) -> String {
    let secs = ms / 1000;
    match secs {
        0 => format!("{}ms", ms),
        1..=59 => format!("{}.{}s", secs, (ms % 1000) / 100),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}
