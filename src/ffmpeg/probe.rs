//! Source duration via FFmpeg's metadata header.
//!
//! Runs `ffmpeg -i <input>` without an output, reads stderr until the first
//! `Duration:` header, then closes the pipe and reaps the child. The child's
//! exit status is not used to judge success: without an output file FFmpeg
//! always exits with an error.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use super::builder::build_probe_args;
use super::progress::parse_duration_line;
use crate::error::ConvertError;

/// Lines kept for the log message when no duration is found.
const DIAGNOSTIC_LINES_KEPT: usize = 3;

/// `Ok(None)` means the duration is unknown: progress fractions cannot be
/// computed for this source.
pub fn probe_duration(ffmpeg: &Path, input: &Path) -> Result<Option<f64>, ConvertError> {
    let args = build_probe_args(input);
    log::debug!(
        target: "media_convert::ffmpeg::probe",
        "Probing duration: path={}, input={}",
        ffmpeg.display(),
        input.display()
    );

    let mut cmd = Command::new(ffmpeg);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    let mut child = cmd
        .spawn()
        .map_err(|e| ConvertError::ProbeFailed(format!("failed to spawn FFmpeg: {}", e)))?;

    let Some(stderr) = child.stderr.take() else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(ConvertError::ProbeFailed("failed to capture stderr".into()));
    };

    let mut duration = None;
    let mut recent: Vec<String> = Vec::with_capacity(DIAGNOSTIC_LINES_KEPT);
    {
        let mut reader = BufReader::new(stderr);
        let mut line_buf = Vec::with_capacity(256);
        while reader.read_until(b'\n', &mut line_buf).unwrap_or(0) > 0 {
            let decoded = String::from_utf8_lossy(&line_buf).into_owned();
            let line = decoded.trim_end_matches(['\n', '\r']);
            if let Some(d) = parse_duration_line(line) {
                duration = Some(d);
                break;
            }
            if !line.trim().is_empty() {
                if recent.len() == DIAGNOSTIC_LINES_KEPT {
                    recent.remove(0);
                }
                recent.push(line.trim().to_string());
            }
            line_buf.clear();
        }
        // Reader dropped here: FFmpeg sees a closed pipe if it is still writing.
    }

    let status = child.wait().map_err(|e| {
        ConvertError::ProbeFailed(format!("failed to wait for FFmpeg: {}", e))
    })?;

    match duration {
        Some(d) => {
            log::debug!(
                target: "media_convert::ffmpeg::probe",
                "Duration of {}: {:.2}s",
                input.display(),
                d
            );
        }
        None => {
            log::warn!(
                target: "media_convert::ffmpeg::probe",
                "No duration found for {} (exit {}): {}",
                input.display(),
                status,
                recent.join("; ")
            );
        }
    }
    Ok(duration)
}
