mod builder;
pub mod discovery;
mod error;
pub mod probe;
pub mod progress;
mod runner;

pub use builder::{build_probe_args, build_transcode_args, format_args_for_display};
pub use error::{FfmpegErrorPayload, parse_ffmpeg_error, tail_preview};
pub use probe::probe_duration;
pub use progress::{parse_duration_line, parse_out_time, parse_progress_line};
pub use runner::{ConversionRunner, ProgressTracker};

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_PRESET: &str = "ultrafast";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Codec for `.mp3` outputs, which accept nothing else.
pub const DEFAULT_MP3_CODEC: &str = "libmp3lame";
/// Keep only the last N bytes of stderr to avoid unbounded memory growth.
pub const DEFAULT_STDERR_TAIL_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Explicit FFmpeg binary. When unset, the binary is discovered
    /// (FFMPEG_PATH env, common install paths, PATH).
    pub ffmpeg_path: Option<PathBuf>,
    pub video_codec: Option<String>,
    pub preset: Option<String>,
    pub audio_codec: Option<String>,
    pub mp3_codec: Option<String>,
    /// Opt-in emit throttle. Unset forwards every progress sample.
    pub progress_interval_ms: Option<u64>,
    pub stderr_tail_bytes: Option<usize>,
}

impl ConvertOptions {
    pub fn with_ffmpeg_path(path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn effective_video_codec(&self) -> &str {
        self.video_codec
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_VIDEO_CODEC)
    }

    pub fn effective_preset(&self) -> &str {
        self.preset
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PRESET)
    }

    pub fn effective_audio_codec(&self) -> &str {
        self.audio_codec
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_AUDIO_CODEC)
    }

    pub fn effective_mp3_codec(&self) -> &str {
        self.mp3_codec
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_MP3_CODEC)
    }

    pub fn effective_progress_interval(&self) -> Option<Duration> {
        self.progress_interval_ms.map(Duration::from_millis)
    }

    pub fn effective_stderr_tail_bytes(&self) -> usize {
        self.stderr_tail_bytes
            .unwrap_or(DEFAULT_STDERR_TAIL_BYTES)
            .max(1024)
    }
}

/// Path to string for FFmpeg args or logging.
pub fn path_to_string(path: &(impl AsRef<std::path::Path> + ?Sized)) -> String {
    path.as_ref().to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_fixed_policy() {
        let opts = ConvertOptions::default();
        assert_eq!(opts.effective_video_codec(), "libx264");
        assert_eq!(opts.effective_preset(), "ultrafast");
        assert_eq!(opts.effective_audio_codec(), "aac");
        assert_eq!(opts.effective_mp3_codec(), "libmp3lame");
        assert_eq!(opts.effective_progress_interval(), None);
        assert_eq!(opts.effective_stderr_tail_bytes(), 64 * 1024);
    }

    #[test]
    fn deserializes_camel_case() {
        let opts: ConvertOptions = serde_json::from_str(
            r#"{"ffmpegPath":"/opt/ffmpeg","preset":"veryfast","stderrTailBytes":10,"progressIntervalMs":150}"#,
        )
        .unwrap();
        assert_eq!(opts.effective_progress_interval(), Some(Duration::from_millis(150)));
        assert_eq!(opts.ffmpeg_path, Some(PathBuf::from("/opt/ffmpeg")));
        assert_eq!(opts.effective_preset(), "veryfast");
        assert_eq!(opts.effective_stderr_tail_bytes(), 1024);
    }

    #[test]
    fn empty_strings_fall_back() {
        let opts = ConvertOptions {
            video_codec: Some(String::new()),
            ..ConvertOptions::default()
        };
        assert_eq!(opts.effective_video_codec(), "libx264");
    }
}
