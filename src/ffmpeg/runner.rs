//! FFmpeg transcode process spawning and progress tracking.
//!
//! Spawns FFmpeg with `-progress pipe:2`, so the machine-readable progress
//! lines arrive interleaved with the human-readable diagnostics on stderr. A
//! background thread drains stderr while the calling thread waits for the
//! process; completion is reported only after that thread has been joined.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};

#[cfg(windows)]
use std::os::windows::process::CommandExt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::builder::{build_transcode_args, format_args_for_display};
use super::error::tail_preview;
use super::progress::{is_progress_key_value, parse_out_time, parse_progress_line};
use super::{ConvertOptions, path_to_string};
use crate::cancel::CancelToken;
use crate::error::ConvertError;
use crate::events::{Notifier, ProgressEvent};

/// Turns parsed samples into notifications and never lets the fraction go
/// backwards. Every sample is forwarded unless a throttle interval is set;
/// a throttle applies the same way to progress and status.
pub struct ProgressTracker {
    total_duration: Option<f64>,
    throttle: Option<Duration>,
    notifier: Notifier,
    last_emit: Instant,
    last_fraction: f64,
    high_water: f64,
    last_elapsed: f64,
}

impl ProgressTracker {
    pub fn new(total_duration: Option<f64>, throttle: Option<Duration>, notifier: Notifier) -> Self {
        Self {
            total_duration: total_duration.filter(|d| *d > 0.0),
            throttle,
            notifier,
            last_emit: Instant::now(),
            last_fraction: 0.0,
            high_water: 0.0,
            last_elapsed: 0.0,
        }
    }

    pub fn observe_line(&mut self, line: &str) {
        if self.total_duration.is_none() {
            self.observe_elapsed_only(line);
            return;
        }
        let Some(event) = parse_progress_line(line, self.total_duration) else {
            return;
        };
        self.last_elapsed = self.last_elapsed.max(event.elapsed_seconds);
        let fraction = event.fraction.max(self.high_water);
        self.high_water = fraction;

        let now = Instant::now();
        let should_emit = match self.throttle {
            None => true,
            Some(interval) => {
                now.duration_since(self.last_emit) >= interval
                    || fraction - self.last_fraction >= 0.01
                    || (fraction >= 1.0 && self.last_fraction < 1.0)
            }
        };
        if should_emit {
            self.last_emit = now;
            self.last_fraction = fraction;
            self.notifier.progress(ProgressEvent {
                fraction,
                elapsed_seconds: event.elapsed_seconds,
            });
            self.notifier
                .status(format!("Converting: {:.1}%", fraction * 100.0));
        }
    }

    /// Unknown duration: no fraction, only an elapsed-time status.
    fn observe_elapsed_only(&mut self, line: &str) {
        let Some(elapsed) = parse_out_time(line) else {
            return;
        };
        self.last_elapsed = self.last_elapsed.max(elapsed);
        let now = Instant::now();
        let due = self
            .throttle
            .is_none_or(|interval| now.duration_since(self.last_emit) >= interval);
        if due {
            self.last_emit = now;
            self.notifier
                .status(format!("Converting: {} processed", format_clock(elapsed)));
        }
    }

    /// Final 100% event after a successful exit.
    pub fn complete(&mut self) {
        self.high_water = 1.0;
        self.last_fraction = 1.0;
        let elapsed = self.total_duration.unwrap_or(self.last_elapsed);
        self.notifier.progress(ProgressEvent::complete(elapsed));
    }

    pub fn last_fraction(&self) -> f64 {
        self.last_fraction
    }
}

fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

fn read_stream<R: std::io::Read + Send + 'static>(
    reader: R,
    stderr_tail: Arc<Mutex<Vec<u8>>>,
    max_tail_bytes: usize,
    mut tracker: ProgressTracker,
) -> thread::JoinHandle<ProgressTracker> {
    thread::spawn(move || {
        let mut stream_reader = BufReader::new(reader);
        let mut line_buf = Vec::with_capacity(256);
        while stream_reader.read_until(b'\n', &mut line_buf).unwrap_or(0) > 0 {
            let decoded = String::from_utf8_lossy(&line_buf).into_owned();
            let line = decoded.trim_end_matches(['\n', '\r']);
            if is_progress_key_value(line) {
                tracker.observe_line(line);
            } else if !line.is_empty() {
                let mut guard = stderr_tail.lock();
                guard.extend_from_slice(line.as_bytes());
                guard.push(b'\n');
                if guard.len() > max_tail_bytes {
                    let excess = guard.len() - max_tail_bytes;
                    guard.drain(..excess);
                }
            }
            line_buf.clear();
        }
        tracker
    })
}

/// Runs one transcode. Owned by a single session.
pub struct ConversionRunner<'a> {
    ffmpeg: &'a Path,
    options: &'a ConvertOptions,
}

impl<'a> ConversionRunner<'a> {
    pub fn new(ffmpeg: &'a Path, options: &'a ConvertOptions) -> Self {
        Self { ffmpeg, options }
    }

    /// Blocks until FFmpeg exits or `cancel` fires.
    ///
    /// - `total_duration`: `None` when the probe could not determine it; then
    ///   only elapsed-time status is reported until the final 100% event.
    pub fn run(
        &self,
        input: &Path,
        output: &Path,
        total_duration: Option<f64>,
        cancel: &CancelToken,
        notifier: &Notifier,
    ) -> Result<(), ConvertError> {
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        let args = build_transcode_args(input, output, self.options);
        log::debug!(
            target: "media_convert::ffmpeg::runner",
            "Spawning FFmpeg: path={}\n  {}",
            self.ffmpeg.display(),
            format_args_for_display(&args)
        );

        let mut cmd = Command::new(self.ffmpeg);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        let mut child = cmd.spawn().map_err(|e| {
            log::error!(
                target: "media_convert::ffmpeg::runner",
                "Failed to spawn {}: {}",
                self.ffmpeg.display(),
                e
            );
            ConvertError::ProcessStartFailed(e)
        })?;

        let stderr = match child.stderr.take() {
            Some(s) => s,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ConvertError::PipeSetupFailed("stderr was not captured".into()));
            }
        };

        let pid = child.id();
        cancel.attach(child);

        let stderr_tail = Arc::new(Mutex::new(Vec::new()));
        let tracker = ProgressTracker::new(
            total_duration,
            self.options.effective_progress_interval(),
            notifier.clone(),
        );
        let reader = read_stream(
            stderr,
            Arc::clone(&stderr_tail),
            self.options.effective_stderr_tail_bytes(),
            tracker,
        );

        let tracker = reader.join().ok();

        // Once the child is out of the token a late cancel can no longer
        // touch it; a clean exit stays a success.
        let status = match cancel.detach() {
            Some(mut c) => c.wait()?,
            None => return Err(ConvertError::Cancelled),
        };

        if cancel.is_cancelled() && !status.success() {
            log::warn!(
                target: "media_convert::ffmpeg::runner",
                "FFmpeg (pid={}) was cancelled: {}",
                pid,
                status
            );
            return Err(ConvertError::Cancelled);
        }

        let stderr_str = String::from_utf8_lossy(&stderr_tail.lock()).to_string();

        if status.success() {
            log::info!(
                target: "media_convert::ffmpeg::runner",
                "FFmpeg completed successfully: {}",
                path_to_string(output)
            );
            match tracker {
                Some(mut t) => t.complete(),
                None => notifier.progress(ProgressEvent::complete(total_duration.unwrap_or(0.0))),
            }
            Ok(())
        } else {
            // -1: ended by a signal, no exit code.
            let code = status.code().unwrap_or(-1);
            log::error!(
                target: "media_convert::ffmpeg::runner",
                "FFmpeg failed (code={}): {}",
                code,
                tail_preview(&stderr_str, 3)
            );
            Err(ConvertError::execution_failed(code, stderr_str))
        }
    }
}
