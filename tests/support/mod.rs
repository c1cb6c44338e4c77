#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::time::Duration;

use media_convert_core::{ConvertOptions, ProgressEvent, SessionEvent};

/// How the scripted transcode ends after printing its progress lines.
#[derive(Clone, Copy, Debug)]
pub enum Ending {
    Exit(i32),
    /// Keeps running (and keeps stderr open) until killed.
    Hang,
}

/// Builds a `/bin/sh` script that answers the three invocations a session
/// makes: `-version`, the metadata probe, and the `-progress` transcode.
/// Every non-version invocation appends its arguments to `calls.log` next to
/// the script.
#[derive(Clone, Debug)]
pub struct FakeFfmpeg {
    duration: Option<String>,
    out_times: Vec<String>,
    step_delay: Option<&'static str>,
    stderr_lines: Vec<String>,
    ending: Ending,
    write_output: bool,
}

impl Default for FakeFfmpeg {
    fn default() -> Self {
        Self {
            duration: Some("00:00:10.00".into()),
            out_times: Vec::new(),
            step_delay: None,
            stderr_lines: Vec::new(),
            ending: Ending::Exit(0),
            write_output: true,
        }
    }
}

impl FakeFfmpeg {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` makes the probe print `Duration: N/A`.
    pub fn duration(mut self, duration: Option<&str>) -> Self {
        self.duration = duration.map(str::to_string);
        self
    }

    pub fn out_times(mut self, times: &[&str]) -> Self {
        self.out_times = times.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn step_delay(mut self, seconds: &'static str) -> Self {
        self.step_delay = Some(seconds);
        self
    }

    pub fn stderr_line(mut self, line: &str) -> Self {
        self.stderr_lines.push(line.to_string());
        self
    }

    pub fn ending(mut self, ending: Ending) -> Self {
        self.ending = ending;
        self
    }

    pub fn write_output(mut self, write: bool) -> Self {
        self.write_output = write;
        self
    }

    fn script(&self) -> String {
        let mut s = String::new();
        s.push_str("if [ \"$1\" = \"-version\" ]; then\n");
        s.push_str("  echo 'ffmpeg version 6.1-scripted Copyright (c) 2000-2023'\n");
        s.push_str("  exit 0\nfi\n");
        s.push_str("echo \"$*\" >> \"$(dirname \"$0\")/calls.log\"\n");
        s.push_str("for a in \"$@\"; do last=\"$a\"; done\n");
        s.push_str("case \"$*\" in\n  *-progress*) ;;\n  *)\n");
        s.push_str("    echo \"Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'input':\" >&2\n");
        match &self.duration {
            Some(d) => s.push_str(&format!(
                "    echo '  Duration: {}, start: 0.000000, bitrate: 1411 kb/s' >&2\n",
                d
            )),
            None => s.push_str("    echo '  Duration: N/A, bitrate: N/A' >&2\n"),
        }
        s.push_str("    echo 'At least one output file must be specified' >&2\n");
        s.push_str("    exit 1;;\nesac\n");
        if self.write_output {
            s.push_str("printf 'scripted output' > \"$last\"\n");
        }
        for t in &self.out_times {
            s.push_str(&format!(
                "printf 'frame=1\\nout_time={}\\nspeed=1.0x\\nprogress=continue\\n' >&2\n",
                t
            ));
            if let Some(delay) = self.step_delay {
                s.push_str(&format!("sleep {}\n", delay));
            }
        }
        for line in &self.stderr_lines {
            s.push_str(&format!("echo '{}' >&2\n", line));
        }
        match self.ending {
            Ending::Exit(code) => s.push_str(&format!("exit {}\n", code)),
            Ending::Hang => s.push_str("exec sleep 30\n"),
        }
        s
    }

    /// Writes the script as `dir/ffmpeg` and executes it once.
    ///
    /// A freshly written executable can fail with ETXTBSY while another test
    /// thread's forked child still holds the write descriptor; after one
    /// successful exec that can no longer happen.
    pub fn install(&self, dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        fs::create_dir_all(dir).expect("create script dir");
        let path = dir.join("ffmpeg");
        fs::write(&path, format!("#!/bin/sh\n{}", self.script())).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");

        for _ in 0..100 {
            match std::process::Command::new(&path)
                .arg("-version")
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
            {
                Ok(_) => return path,
                Err(e) if e.raw_os_error() == Some(26) => {
                    std::thread::sleep(Duration::from_millis(10))
                }
                Err(e) => panic!("cannot execute {}: {}", path.display(), e),
            }
        }
        panic!("{} stayed busy", path.display());
    }
}

/// A scratch directory with media files at its root and the scripted
/// FFmpeg under `bin/`.
pub struct TestEnv {
    dir: tempfile::TempDir,
    pub ffmpeg: PathBuf,
}

impl TestEnv {
    pub fn new(fake: FakeFfmpeg) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let ffmpeg = fake.install(&dir.path().join("bin"));
        Self { dir, ffmpeg }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn media(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("write media file");
        path
    }

    pub fn options(&self) -> ConvertOptions {
        ConvertOptions::with_ffmpeg_path(&self.ffmpeg)
    }

    /// Argument lines of every probe and transcode invocation so far.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("bin").join("calls.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Everything already delivered on the channel, split by kind.
pub fn drain(rx: &Receiver<SessionEvent>) -> (Vec<ProgressEvent>, Vec<String>) {
    let mut progress = Vec::new();
    let mut status = Vec::new();
    for event in rx.try_iter() {
        match event {
            SessionEvent::Progress(p) => progress.push(p),
            SessionEvent::Status(s) => status.push(s),
        }
    }
    (progress, status)
}

pub fn fractions(events: &[ProgressEvent]) -> Vec<f64> {
    events.iter().map(|e| e.fraction).collect()
}
