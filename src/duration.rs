//! Compact duration strings (`30m`, `2h30m`, `45s`, `0`).

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").expect("duration regex is valid")
});

static ZERO_UNIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0[hms]$").expect("zero-unit regex is valid"));

/// Parse a compact duration. `"0"` means disabled and parses to zero.
///
/// Returns `None` for empty or malformed input, and for inputs whose
/// components are all zero unless written as a single zero unit (`0m`).
/// Durations whose millisecond count does not fit in a `u64` are rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let trimmed = input.trim().to_lowercase();
    if trimmed == "0" {
        return Some(Duration::ZERO);
    }

    let caps = DURATION_RE.captures(&trimmed)?;
    let component = |idx: usize| -> Option<u64> {
        match caps.get(idx) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    let hours = component(1)?;
    let minutes = component(2)?;
    let seconds = component(3)?;

    if hours == 0 && minutes == 0 && seconds == 0 && !ZERO_UNIT_RE.is_match(&trimmed) {
        return None;
    }

    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    total.checked_mul(1000)?;
    Some(Duration::from_secs(total))
}

/// Format a duration compactly. Seconds are only shown below one hour.
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0".to_string();
    }

    let seconds = duration.as_secs();
    let hours = seconds / 3600;
    let minutes = (seconds / 60) % 60;
    let secs = seconds % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if secs > 0 && hours == 0 {
        out.push_str(&format!("{secs}s"));
    }
    if out.is_empty() {
        out.push_str("0s");
    }
    out
}

/// Human wording, e.g. `2 hours 34 minutes`. Zero reads as `disabled`.
pub fn format_duration_verbose(duration: Duration) -> String {
    if duration.is_zero() {
        return "disabled".to_string();
    }

    let seconds = duration.as_secs();
    let total_minutes = seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    let secs = seconds % 60;

    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("{n} {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(plural(minutes, "minute"));
    }
    if secs > 0 && hours == 0 && total_minutes < 5 {
        parts.push(plural(secs, "second"));
    }

    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(" ")
    }
}
