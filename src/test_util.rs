//! Shared helpers for unit tests.
//!
//! Unit tests live in each module; tests that drive a whole session against a
//! scripted stand-in for FFmpeg live under `tests/`.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Writes an executable `/bin/sh` script named `ffmpeg` into `dir`.
///
/// The script is executed once before returning. A freshly written executable
/// can fail with ETXTBSY while another test thread's forked child still holds
/// the write descriptor; after one successful exec that can no longer happen.
#[cfg(unix)]
pub fn write_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");

    for _ in 0..100 {
        match std::process::Command::new(&path)
            .arg("-version")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
        {
            Ok(_) => return path,
            Err(e) if e.raw_os_error() == Some(26) => std::thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("cannot execute {}: {}", path.display(), e),
        }
    }
    panic!("{} stayed busy", path.display());
}
