//! Every FFmpeg diagnostic-text pattern the crate understands lives here.
//!
//! Two formats with different precision are parsed by separate patterns:
//! the banner header `Duration: HH:MM:SS.cc` (centiseconds) and the
//! `-progress` key/value line `out_time=HH:MM:SS.ffffff` (microseconds).

use regex::Regex;
use std::sync::LazyLock;

use crate::events::ProgressEvent;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration: (\d{2,}):(\d{2}):(\d{2})\.(\d{2})\b").expect("invalid duration regex")
});
static OUT_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^out_time=(\d{2,}):(\d{2}):(\d{2})\.(\d{6})$").expect("invalid out_time regex")
});

/// `-progress` output is a block of `key=value` lines per update.
static KEY_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+=").expect("invalid key=value regex"));

/// `None` when the hour field is too large to be a real timestamp.
fn hms_seconds(h: &str, m: &str, s: &str) -> Option<f64> {
    let hours: u64 = h.parse().ok()?;
    let minutes: u64 = m.parse().ok()?;
    let seconds: u64 = s.parse().ok()?;
    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60)?
        .checked_add(seconds)?;
    Some(total as f64)
}

/// Total duration from a banner line such as
/// `  Duration: 00:01:30.45, start: 0.000000, bitrate: 1411 kb/s`.
pub fn parse_duration_line(line: &str) -> Option<f64> {
    let caps = DURATION_RE.captures(line)?;
    let whole = hms_seconds(&caps[1], &caps[2], &caps[3])?;
    let centis: u32 = caps[4].parse().ok()?;
    Some(whole + f64::from(centis) / 100.0)
}

/// Elapsed output time from a `-progress` line. Negative or `N/A` values
/// (printed before the first frame) do not match.
pub fn parse_out_time(line: &str) -> Option<f64> {
    let caps = OUT_TIME_RE.captures(line.trim_end_matches(['\r', '\n']))?;
    let whole = hms_seconds(&caps[1], &caps[2], &caps[3])?;
    let micros: u32 = caps[4].parse().ok()?;
    Some(whole + f64::from(micros) / 1_000_000.0)
}

/// True for machine-readable `-progress` lines (`frame=42`, `out_time=…`,
/// `progress=continue`), false for human-readable diagnostics.
pub fn is_progress_key_value(line: &str) -> bool {
    KEY_VALUE_RE.is_match(line)
}

/// One line in, zero or one event out. Without a known positive total
/// duration no fraction is derivable and nothing is emitted.
pub fn parse_progress_line(line: &str, total_duration: Option<f64>) -> Option<ProgressEvent> {
    let total = total_duration.filter(|d| *d > 0.0)?;
    let elapsed = parse_out_time(line)?;
    Some(ProgressEvent {
        fraction: (elapsed / total).clamp(0.0, 1.0),
        elapsed_seconds: elapsed,
    })
}
