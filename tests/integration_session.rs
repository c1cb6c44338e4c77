#![cfg(unix)]

mod support;

use std::fs;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::{Duration, Instant};

use media_convert_core::ffmpeg::path_to_string;
use media_convert_core::{
    CancelToken, ConversionOutcome, ConversionSession, ConvertError, ConvertOptions, ErrorKind,
    Notifier, SessionEvent, SessionState,
};
use support::{Ending, FakeFfmpeg, TestEnv, drain, fractions};

fn run(options: ConvertOptions, input: &std::path::Path) -> (ConversionOutcome, Vec<f64>, Vec<String>) {
    let (notifier, rx) = Notifier::channel();
    let session = ConversionSession::new(options);
    let outcome = session.run(input, &notifier, &CancelToken::new());
    let (progress, status) = drain(&rx);
    (outcome, fractions(&progress), status)
}

#[test]
fn video_conversion_reports_progress_and_completes() {
    let env = TestEnv::new(FakeFfmpeg::new().out_times(&[
        "00:00:02.500000",
        "00:00:05.000000",
        "00:00:07.500000",
    ]));
    let input = env.media("clip.mov", b"source");

    let (outcome, fractions, status) = run(env.options(), &input);

    let output = env.path("clip.mp4");
    assert_eq!(outcome.output_path(), Some(output.as_path()));
    assert_eq!(fractions, vec![0.25, 0.5, 0.75, 1.0]);
    assert_eq!(fs::read(&output).unwrap(), b"scripted output");
    assert_eq!(fs::read(&input).unwrap(), b"source");
    assert!(status.contains(&"Starting conversion: clip.mov".to_string()));
    assert_eq!(
        status.last().map(String::as_str),
        Some(format!("Conversion complete: {}", path_to_string(&output)).as_str())
    );

    let calls = env.calls();
    assert_eq!(calls.len(), 2, "probe then transcode: {:?}", calls);
    assert!(!calls[0].contains("-progress"));
    assert!(calls[1].contains(&format!("-i {}", path_to_string(&input))));
    assert!(calls[1].contains("-c:v libx264 -preset ultrafast -c:a aac"));
    assert!(calls[1].ends_with(&path_to_string(&output)));
}

#[test]
fn audio_input_becomes_mp3() {
    let env = TestEnv::new(FakeFfmpeg::new().out_times(&["00:00:05.000000"]));
    let input = env.media("song.WAV", b"pcm");

    let (outcome, fractions, _) = run(env.options(), &input);

    assert!(outcome.is_success());
    assert_eq!(fractions, vec![0.5, 1.0]);
    assert!(env.path("song.mp3").exists());
    let transcode = env.calls().pop().unwrap_or_default();
    assert!(transcode.contains("-vn -c:a libmp3lame"), "{}", transcode);
}

#[test]
fn failed_transcode_carries_diagnostic_tail_and_removes_output() {
    let env = TestEnv::new(
        FakeFfmpeg::new()
            .out_times(&["00:00:01.000000"])
            .stderr_line("[mov,mp4 @ 0x1] moov atom not found")
            .stderr_line("input.mov: Invalid data found when processing input")
            .ending(Ending::Exit(1)),
    );
    let input = env.media("broken.mov", b"garbage");

    let (outcome, _, status) = run(env.options(), &input);

    let Some(ConvertError::ProcessExecutionFailed { code, stderr }) = outcome.error() else {
        panic!("expected execution failure, got {:?}", outcome);
    };
    assert_eq!(*code, 1);
    assert!(stderr.contains("Invalid data found when processing input"));
    assert!(!stderr.contains("out_time="), "progress lines stay out of the tail");
    assert_eq!(status.last().map(String::as_str), Some("Conversion failed: FFmpeg failed."));
    assert!(!env.path("broken.mp4").exists());
}

#[test]
fn existing_output_is_backed_up_with_increasing_suffix() {
    let env = TestEnv::new(FakeFfmpeg::new().out_times(&["00:00:05.000000"]));
    let input = env.media("clip.mov", b"source");
    fs::write(env.path("clip.mp4"), b"first").unwrap();

    let (notifier, rx) = Notifier::channel();
    let session = ConversionSession::new(env.options());
    assert!(session.run(&input, &notifier, &CancelToken::new()).is_success());
    let (_, status) = drain(&rx);

    let first_backup = env.path("backup").join("clip.mp4");
    assert_eq!(fs::read(&first_backup).unwrap(), b"first");
    let backing_up = status
        .iter()
        .position(|s| s == &format!("Backing up existing file to: {}", path_to_string(&first_backup)))
        .expect("backup status");
    let starting = status
        .iter()
        .position(|s| s.starts_with("Starting conversion"))
        .expect("start status");
    assert!(backing_up < starting);
    assert_eq!(session.backup_record().map(|r| r.sequence), Some(0));

    assert!(session.run(&input, &notifier, &CancelToken::new()).is_success());
    let second_backup = env.path("backup").join("clip.mp4.1");
    assert_eq!(fs::read(&second_backup).unwrap(), b"scripted output");
    assert_eq!(fs::read(&first_backup).unwrap(), b"first");
    let record = session.backup_record().expect("second backup");
    assert_eq!(record.sequence, 1);
    assert_eq!(record.original_path, env.path("clip.mp4"));
}

#[test]
fn converting_an_mp4_reads_from_its_backup() {
    let env = TestEnv::new(FakeFfmpeg::new().out_times(&["00:00:05.000000"]));
    let input = env.media("movie.mp4", b"original");

    let (outcome, _, _) = run(env.options(), &input);

    assert!(outcome.is_success());
    let backup = env.path("backup").join("movie.mp4");
    assert_eq!(fs::read(&backup).unwrap(), b"original");
    assert_eq!(fs::read(&input).unwrap(), b"scripted output");
    let calls = env.calls();
    let source = format!("-i {}", path_to_string(&backup));
    assert!(calls.iter().all(|c| c.contains(&source)), "{:?}", calls);
}

#[test]
fn unknown_duration_reports_elapsed_time_and_a_final_event() {
    let env = TestEnv::new(
        FakeFfmpeg::new()
            .duration(None)
            .out_times(&["00:00:03.000000"]),
    );
    let input = env.media("stream.ts", b"ts");
    let options = ConvertOptions {
        progress_interval_ms: Some(0),
        ..env.options()
    };

    let (notifier, rx) = Notifier::channel();
    let outcome = ConversionSession::new(options).run(&input, &notifier, &CancelToken::new());
    let (progress, status) = drain(&rx);

    assert!(outcome.is_success());
    assert_eq!(fractions(&progress), vec![1.0]);
    assert_eq!(progress[0].elapsed_seconds, 3.0);
    assert!(status.contains(&"Converting: 00:00:03 processed".to_string()));
}

#[test]
fn cancel_stops_a_running_transcode() {
    let env = TestEnv::new(
        FakeFfmpeg::new()
            .out_times(&["00:00:01.000000"])
            .ending(Ending::Hang),
    );
    let input = env.media("long.mov", b"source");
    let (notifier, rx) = Notifier::channel();
    let cancel = CancelToken::new();
    let session = std::sync::Arc::new(ConversionSession::new(env.options()));

    let worker = {
        let cancel = cancel.clone();
        let session = std::sync::Arc::clone(&session);
        let input = input.clone();
        thread::spawn(move || session.run(&input, &notifier, &cancel))
    };

    loop {
        match rx.recv_timeout(Duration::from_secs(10)) {
            Ok(SessionEvent::Progress(_)) => break,
            Ok(SessionEvent::Status(_)) => continue,
            Err(RecvTimeoutError::Timeout) => panic!("no progress before timeout"),
            Err(RecvTimeoutError::Disconnected) => panic!("session ended early"),
        }
    }
    assert_eq!(session.state(), SessionState::Transcoding);

    let started = Instant::now();
    cancel.cancel();
    let outcome = worker.join().unwrap();

    assert!(matches!(outcome, ConversionOutcome::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(session.state(), SessionState::Cancelled);
    assert!(!env.path("long.mp4").exists());
    let (_, status) = drain(&rx);
    assert_eq!(status.last().map(String::as_str), Some("Conversion cancelled"));
}

#[test]
fn missing_tool_fails_without_side_effects() {
    let env = TestEnv::new(FakeFfmpeg::new());
    let input = env.media("clip.mov", b"source");
    fs::write(env.path("clip.mp4"), b"keep").unwrap();
    let options = ConvertOptions::with_ffmpeg_path(env.path("bin").join("not-ffmpeg"));

    let (outcome, fractions, _) = run(options, &input);

    assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::BinaryNotFound));
    assert!(fractions.is_empty());
    assert!(!env.path("backup").exists());
    assert_eq!(fs::read(env.path("clip.mp4")).unwrap(), b"keep");
    assert!(env.calls().is_empty());
}

#[test]
fn missing_input_is_rejected() {
    let env = TestEnv::new(FakeFfmpeg::new());

    let (outcome, _, _) = run(env.options(), &env.path("nope.mov"));

    assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::InvalidInput));
    assert!(env.calls().is_empty());
}

#[test]
fn sessions_run_side_by_side() {
    let env = TestEnv::new(
        FakeFfmpeg::new()
            .out_times(&["00:00:05.000000"])
            .step_delay("0.2"),
    );
    let inputs = [env.media("a.mov", b"a"), env.media("b.wav", b"b")];

    let handles: Vec<_> = inputs
        .iter()
        .cloned()
        .map(|input| {
            let options = env.options();
            thread::spawn(move || {
                let (notifier, rx) = Notifier::channel();
                let outcome = ConversionSession::new(options).run(&input, &notifier, &CancelToken::new());
                (outcome, fractions(&drain(&rx).0))
            })
        })
        .collect();

    for handle in handles {
        let (outcome, fractions) = handle.join().unwrap();
        assert!(outcome.is_success(), "{:?}", outcome);
        assert_eq!(fractions, vec![0.5, 1.0]);
    }
    assert!(env.path("a.mp4").exists());
    assert!(env.path("b.mp3").exists());
}

#[test]
#[ignore = "requires a real FFmpeg (FFMPEG_PATH or PATH)"]
fn real_ffmpeg_converts_generated_tone() {
    let ffmpeg = media_convert_core::ffmpeg::discovery::resolve_ffmpeg_path().expect("FFmpeg not found");
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tone.wav");
    let status = std::process::Command::new(&ffmpeg)
        .args(["-y", "-hide_banner", "-loglevel", "error", "-f", "lavfi", "-i", "sine=frequency=440:duration=2"])
        .arg(&input)
        .status()
        .expect("generate tone");
    assert!(status.success());

    let (notifier, rx) = Notifier::channel();
    let outcome = ConversionSession::new(ConvertOptions::with_ffmpeg_path(&ffmpeg))
        .run(&input, &notifier, &CancelToken::new());

    assert!(outcome.is_success(), "{:?}", outcome);
    let progress = drain(&rx).0;
    assert_eq!(progress.last().map(|p| p.fraction), Some(1.0));
    assert!(fs::metadata(dir.path().join("tone.mp3")).unwrap().len() > 0);
}
