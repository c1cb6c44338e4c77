//! Conversion error type. Implements Display and Serialize for sidecar clients.

use std::path::PathBuf;

use crate::ffmpeg::parse_ffmpeg_error;

/// Fieldless discriminant of [`ConvertError`], for matching and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    BinaryNotFound,
    InvalidInput,
    ProbeFailed,
    PipeSetupFailed,
    ProcessStartFailed,
    ProcessExecutionFailed,
    BackupFailed,
    Cancelled,
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("{0}")]
    BinaryNotFound(String),

    #[error("Input file not found: {}", .0.display())]
    InvalidInput(PathBuf),

    #[error("Failed to probe duration: {0}")]
    ProbeFailed(String),

    #[error("Failed to attach FFmpeg diagnostic stream: {0}")]
    PipeSetupFailed(String),

    #[error("Failed to start FFmpeg: {0}")]
    ProcessStartFailed(#[source] std::io::Error),

    #[error("FFmpeg failed (code {code}): {stderr}")]
    ProcessExecutionFailed { code: i32, stderr: String },

    #[error("Backup of {} failed: {reason}", .path.display())]
    BackupFailed { path: PathBuf, reason: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BinaryNotFound(_) => ErrorKind::BinaryNotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::ProbeFailed(_) => ErrorKind::ProbeFailed,
            Self::PipeSetupFailed(_) => ErrorKind::PipeSetupFailed,
            Self::ProcessStartFailed(_) => ErrorKind::ProcessStartFailed,
            Self::ProcessExecutionFailed { .. } => ErrorKind::ProcessExecutionFailed,
            Self::BackupFailed { .. } => ErrorKind::BackupFailed,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub fn execution_failed(code: i32, stderr: impl Into<String>) -> Self {
        Self::ProcessExecutionFailed {
            code,
            stderr: stderr.into(),
        }
    }

    pub fn backup_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::BackupFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Short user-facing summary plus the full detail text.
    pub fn summary_and_detail(&self) -> (String, String) {
        match self {
            Self::ProcessExecutionFailed { code, stderr } => {
                let payload = parse_ffmpeg_error(stderr, *code);
                (payload.summary, payload.detail)
            }
            Self::ProcessStartFailed(e) => {
                let payload = parse_ffmpeg_error(&e.to_string(), -1);
                (payload.summary, payload.detail)
            }
            _ => (self.to_string(), self.to_string()),
        }
    }
}

impl serde::Serialize for ConvertError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let (summary, detail) = self.summary_and_detail();
        let json = serde_json::json!({
            "kind": self.kind(),
            "summary": summary,
            "detail": detail,
        });
        serializer.serialize_str(&json.to_string())
    }
}
