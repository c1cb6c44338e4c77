//! One conversion, end to end.
//!
//! `Idle → CheckingTool → AwaitingBackupDecision → Probing → Transcoding`,
//! then exactly one of `Succeeded`, `Failed` or `Cancelled`. Backup runs
//! before probing because when the output path equals the input path the
//! source is the file being moved, and everything after reads it from the
//! backup location.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::backup::{BackupRecord, backup_if_present};
use crate::cancel::CancelToken;
use crate::error::ConvertError;
use crate::events::Notifier;
use crate::ffmpeg::discovery::{check_ffmpeg, ffmpeg_path_for};
use crate::ffmpeg::{ConversionRunner, ConvertOptions, path_to_string, probe_duration};
use crate::paths::ConversionRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    CheckingTool,
    AwaitingBackupDecision,
    Probing,
    Transcoding,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug)]
pub enum ConversionOutcome {
    Succeeded(PathBuf),
    Failed(ConvertError),
    Cancelled,
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn output_path(&self) -> Option<&Path> {
        match self {
            Self::Succeeded(p) => Some(p.as_path()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ConvertError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn terminal_state(&self) -> SessionState {
        match self {
            Self::Succeeded(_) => SessionState::Succeeded,
            Self::Failed(_) => SessionState::Failed,
            Self::Cancelled => SessionState::Cancelled,
        }
    }
}

impl From<Result<PathBuf, ConvertError>> for ConversionOutcome {
    fn from(result: Result<PathBuf, ConvertError>) -> Self {
        match result {
            Ok(path) => Self::Succeeded(path),
            Err(ConvertError::Cancelled) => Self::Cancelled,
            Err(e) => Self::Failed(e),
        }
    }
}

/// Owns nothing shared with other sessions; run as many side by side as
/// needed, each with its own notifier and cancel token.
pub struct ConversionSession {
    options: ConvertOptions,
    state: Mutex<SessionState>,
    backup: Mutex<Option<BackupRecord>>,
}

impl ConversionSession {
    pub fn new(options: ConvertOptions) -> Self {
        Self {
            options,
            state: Mutex::new(SessionState::Idle),
            backup: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// The backup made by the last run, if any.
    pub fn backup_record(&self) -> Option<BackupRecord> {
        self.backup.lock().clone()
    }

    fn set_state(&self, next: SessionState) {
        let mut guard = self.state.lock();
        log::trace!(
            target: "media_convert::session",
            "state {:?} -> {:?}",
            *guard,
            next
        );
        *guard = next;
    }

    pub fn run(&self, input_path: &Path, notifier: &Notifier, cancel: &CancelToken) -> ConversionOutcome {
        *self.backup.lock() = None;
        let outcome = ConversionOutcome::from(self.run_steps(input_path, notifier, cancel));
        self.set_state(outcome.terminal_state());

        match &outcome {
            ConversionOutcome::Succeeded(path) => {
                log::info!(
                    target: "media_convert::session",
                    "Converted {} -> {}",
                    input_path.display(),
                    path.display()
                );
                notifier.status(format!("Conversion complete: {}", path_to_string(path)));
            }
            ConversionOutcome::Failed(e) => {
                let (summary, _) = e.summary_and_detail();
                log::error!(
                    target: "media_convert::session",
                    "Conversion of {} failed ({:?}): {}",
                    input_path.display(),
                    e.kind(),
                    summary
                );
                notifier.status(format!("Conversion failed: {}", summary));
            }
            ConversionOutcome::Cancelled => {
                log::info!(
                    target: "media_convert::session",
                    "Conversion of {} cancelled",
                    input_path.display()
                );
                notifier.status("Conversion cancelled");
            }
        }
        outcome
    }

    fn run_steps(
        &self,
        input_path: &Path,
        notifier: &Notifier,
        cancel: &CancelToken,
    ) -> Result<PathBuf, ConvertError> {
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }
        self.set_state(SessionState::CheckingTool);
        let ffmpeg = ffmpeg_path_for(&self.options)?;
        check_ffmpeg(&ffmpeg)?;
        let request = ConversionRequest::new(input_path)?;

        self.set_state(SessionState::AwaitingBackupDecision);
        let backup = backup_if_present(request.output_path(), notifier)?;
        let source = match &backup {
            Some(record) if request.overwrites_input() => record.backup_path.clone(),
            _ => request.input_path().to_path_buf(),
        };
        *self.backup.lock() = backup;

        self.set_state(SessionState::Probing);
        let duration = match probe_duration(&ffmpeg, &source) {
            Ok(d) => d,
            Err(e) => {
                log::warn!(
                    target: "media_convert::session",
                    "{}; progress will not be reported as a fraction",
                    e
                );
                None
            }
        };

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path_to_string(&source));
        notifier.status(format!("Starting conversion: {}", name));

        self.set_state(SessionState::Transcoding);
        let output = request.output_path();
        let runner = ConversionRunner::new(&ffmpeg, &self.options);
        match runner.run(&source, output, duration, cancel, notifier) {
            Ok(()) => Ok(output.to_path_buf()),
            Err(e) => {
                if matches!(
                    e,
                    ConvertError::Cancelled | ConvertError::ProcessExecutionFailed { .. }
                ) {
                    remove_partial_output(output);
                }
                Err(e)
            }
        }
    }
}

fn remove_partial_output(output: &Path) {
    if output.exists() {
        match fs::remove_file(output) {
            Ok(()) => log::debug!(
                target: "media_convert::session",
                "Removed partial output {}",
                output.display()
            ),
            Err(e) => log::warn!(
                target: "media_convert::session",
                "Could not remove partial output {}: {}",
                output.display(),
                e
            ),
        }
    }
}
