//! Output path resolution. Pure, no I/O.

use std::path::{Path, PathBuf};

use crate::error::ConvertError;

/// Extensions converted to MP3. Everything else is treated as video.
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "m4a", "flac", "aac"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        let is_audio = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| AUDIO_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)));
        if is_audio { Self::Audio } else { Self::Video }
    }

    pub fn output_extension(self) -> &'static str {
        match self {
            Self::Audio => "mp3",
            Self::Video => "mp4",
        }
    }
}

/// Same directory, same stem, `.mp3` for audio inputs and `.mp4` otherwise.
pub fn resolve_output_path(input: &Path) -> PathBuf {
    input.with_extension(MediaKind::from_path(input).output_extension())
}

/// One user-initiated conversion. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    input_path: PathBuf,
    output_path: PathBuf,
    media_kind: MediaKind,
}

impl ConversionRequest {
    pub fn new(input_path: impl Into<PathBuf>) -> Result<Self, ConvertError> {
        let input_path = input_path.into();
        if !input_path.is_file() {
            return Err(ConvertError::InvalidInput(input_path));
        }
        Ok(Self::resolve(input_path))
    }

    /// Derive the request without touching the filesystem.
    pub fn resolve(input_path: impl Into<PathBuf>) -> Self {
        let input_path = input_path.into();
        let media_kind = MediaKind::from_path(&input_path);
        let output_path = input_path.with_extension(media_kind.output_extension());
        Self {
            input_path,
            output_path,
            media_kind,
        }
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    /// True when converting would write over the input itself (`a.mp4` → `a.mp4`).
    pub fn overwrites_input(&self) -> bool {
        self.input_path == self.output_path
    }
}
