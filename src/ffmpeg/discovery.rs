use crate::error::ConvertError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use super::ConvertOptions;

const INSTALL_HINT: &str = "FFmpeg not found. Please install FFmpeg on your system:\n  - macOS: brew install ffmpeg\n  - Linux: sudo apt install ffmpeg\n  - Windows: Download from https://ffmpeg.org/download.html";

fn common_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/opt/local/bin/ffmpeg"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin\\ffmpeg.exe"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe"),
        ]
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", unix)))]
    {
        vec![]
    }
}

/// Uncached lookup: FFMPEG_PATH env, then the user's PATH, then common
/// install paths.
pub fn resolve_ffmpeg_path() -> Result<PathBuf, ConvertError> {
    if let Ok(env_path) = std::env::var("FFMPEG_PATH") {
        let p = PathBuf::from(&env_path);
        if p.exists() {
            log::debug!(
                target: "media_convert::ffmpeg::discovery",
                "FFmpeg path from FFMPEG_PATH env: {}",
                p.display()
            );
            return Ok(p);
        }
        log::warn!(
            target: "media_convert::ffmpeg::discovery",
            "FFMPEG_PATH={} does not exist, falling back to discovery",
            env_path
        );
    }

    if let Some(p) = lookup(std::env::var_os("PATH"), &common_paths()) {
        return Ok(p);
    }

    log::error!(
        target: "media_convert::ffmpeg::discovery",
        "FFmpeg not found in PATH or common locations"
    );
    Err(ConvertError::BinaryNotFound(INSTALL_HINT.to_string()))
}

fn lookup(search_path: Option<OsString>, common: &[PathBuf]) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_default();
    if let Ok(p) = which::which_in("ffmpeg", search_path, cwd) {
        log::debug!(
            target: "media_convert::ffmpeg::discovery",
            "FFmpeg found in PATH: {}",
            p.display()
        );
        return Some(p);
    }

    let found = common.iter().find(|p| p.exists())?;
    log::debug!(
        target: "media_convert::ffmpeg::discovery",
        "FFmpeg found in common path: {}",
        found.display()
    );
    Some(found.clone())
}

static FFMPEG_PATH_CACHE: OnceLock<PathBuf> = OnceLock::new();

/// Discovered FFmpeg path, cached for the process lifetime once found.
pub fn get_ffmpeg_path() -> Result<&'static Path, ConvertError> {
    if let Some(path) = FFMPEG_PATH_CACHE.get() {
        log::trace!(
            target: "media_convert::ffmpeg::discovery",
            "FFmpeg path (cached): {}",
            path.display()
        );
        return Ok(path.as_path());
    }
    let path = resolve_ffmpeg_path()?;
    Ok(FFMPEG_PATH_CACHE.get_or_init(|| path).as_path())
}

/// The explicit `ffmpeg_path` option wins over discovery.
pub fn ffmpeg_path_for(options: &ConvertOptions) -> Result<PathBuf, ConvertError> {
    match &options.ffmpeg_path {
        Some(path) => Ok(path.clone()),
        None => get_ffmpeg_path().map(Path::to_path_buf),
    }
}

/// Presence check: run `ffmpeg -version`. Any failure to execute, or a
/// non-zero exit, means the binary is unusable.
pub fn check_ffmpeg(ffmpeg: &Path) -> Result<String, ConvertError> {
    let output = Command::new(ffmpeg)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| {
            log::error!(
                target: "media_convert::ffmpeg::discovery",
                "FFmpeg presence check failed for {}: {}",
                ffmpeg.display(),
                e
            );
            ConvertError::BinaryNotFound(format!(
                "Cannot run {}: {}\n{}",
                ffmpeg.display(),
                e,
                INSTALL_HINT
            ))
        })?;
    if !output.status.success() {
        return Err(ConvertError::BinaryNotFound(format!(
            "{} -version exited with {}\n{}",
            ffmpeg.display(),
            output.status,
            INSTALL_HINT
        )));
    }
    let version = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    log::debug!(
        target: "media_convert::ffmpeg::discovery",
        "FFmpeg available: {}",
        version
    );
    Ok(version)
}
