//! Map FFmpeg exit codes to user-friendly messages.
//!
//! Exit codes are from ffmpeg.c: 1 (general), 69 (rate exceeded),
//! 123 (hard exit), 255 (signal). -1 is used for spawn failure and for
//! children killed by a signal, which have no exit code.

use serde::Serialize;

/// Failure summary shown to the user; detail carries the diagnostic tail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FfmpegErrorPayload {
    pub summary: String,
    pub detail: String,
}

pub fn parse_ffmpeg_error(stderr: &str, exit_code: i32) -> FfmpegErrorPayload {
    let summary = known_exit_code_summary(exit_code)
        .unwrap_or_else(|| format!("FFmpeg failed (exit code {}).", exit_code));
    FfmpegErrorPayload {
        summary,
        detail: stderr.trim().to_string(),
    }
}

fn known_exit_code_summary(code: i32) -> Option<String> {
    match code {
        -1 => Some("FFmpeg failed to start or was killed by a signal.".into()),
        1 => Some("FFmpeg failed.".into()),
        69 => Some("Encoding rate limit exceeded.".into()),
        123 | 255 => Some("Encoding was stopped.".into()),
        _ => None,
    }
}

/// Last `n` non-empty lines joined with "; ", for log previews.
pub fn tail_preview(stderr: &str, n: usize) -> String {
    let mut lines: Vec<&str> = stderr
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(n)
        .collect();
    lines.reverse();
    lines.join("; ")
}
