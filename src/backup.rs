//! Moves an existing output file out of the way before FFmpeg overwrites it.
//!
//! Backups live at `<output dir>/backup/<output name>[.<n>]`. The first free
//! slot is found by probing `name`, `name.1`, `name.2`, … in order. Each slot
//! is claimed with an exclusive create before the rename, so two sessions
//! targeting the same output never pick the same slot; the rename then
//! replaces the empty placeholder.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ConvertError;
use crate::events::Notifier;
use crate::ffmpeg::path_to_string;

pub const BACKUP_DIR_NAME: &str = "backup";

/// Upper bound on suffix probing; reaching it means something is badly wrong.
const MAX_BACKUP_SEQUENCE: u32 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    /// 0 means the backup carries no numeric suffix.
    pub sequence: u32,
}

fn is_cross_device_rename_error(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(18) // EXDEV
    }
    #[cfg(windows)]
    {
        e.raw_os_error() == Some(17) // ERROR_NOT_SAME_DEVICE
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = e;
        false
    }
}

/// Candidate name for slot `sequence`.
pub fn backup_candidate(backup_dir: &Path, file_name: &str, sequence: u32) -> PathBuf {
    if sequence == 0 {
        backup_dir.join(file_name)
    } else {
        backup_dir.join(format!("{}.{}", file_name, sequence))
    }
}

fn claim_slot(backup_dir: &Path, file_name: &str, output: &Path) -> Result<(PathBuf, u32), ConvertError> {
    for sequence in 0..MAX_BACKUP_SEQUENCE {
        let candidate = backup_candidate(backup_dir, file_name, sequence);
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok((candidate, sequence)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(ConvertError::backup_failed(
                    output,
                    format!("cannot create {}: {}", candidate.display(), e),
                ));
            }
        }
    }
    Err(ConvertError::backup_failed(
        output,
        format!("no free backup slot in {}", backup_dir.display()),
    ))
}

/// Back up `output` if it exists. Returns `Ok(None)` without touching the
/// filesystem when there is nothing to back up.
pub fn backup_if_present(
    output: &Path,
    notifier: &Notifier,
) -> Result<Option<BackupRecord>, ConvertError> {
    if fs::symlink_metadata(output).is_err() {
        log::trace!(
            target: "media_convert::backup",
            "No existing output at {}, nothing to back up",
            output.display()
        );
        return Ok(None);
    }

    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ConvertError::backup_failed(output, "output path has no file name"))?;
    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let backup_dir = parent.join(BACKUP_DIR_NAME);

    fs::create_dir_all(&backup_dir).map_err(|e| {
        ConvertError::backup_failed(
            output,
            format!("cannot create {}: {}", backup_dir.display(), e),
        )
    })?;

    let (backup_path, sequence) = claim_slot(&backup_dir, &file_name, output)?;

    notifier.status(format!("Backing up existing file to: {}", path_to_string(&backup_path)));
    log::info!(
        target: "media_convert::backup",
        "Backing up {} -> {}",
        output.display(),
        backup_path.display()
    );

    if let Err(e) = fs::rename(output, &backup_path) {
        let _ = fs::remove_file(&backup_path);
        let reason = if is_cross_device_rename_error(&e) {
            format!(
                "{} is on a different device than {}: {}",
                backup_dir.display(),
                output.display(),
                e
            )
        } else {
            format!("cannot move to {}: {}", backup_path.display(), e)
        };
        log::error!(target: "media_convert::backup", "Backup failed: {}", reason);
        return Err(ConvertError::backup_failed(output, reason));
    }

    Ok(Some(BackupRecord {
        original_path: output.to_path_buf(),
        backup_path,
        sequence,
    }))
}
