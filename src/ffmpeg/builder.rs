use std::path::Path;

use super::{ConvertOptions, path_to_string};
use crate::paths::MediaKind;

/// Metadata-only invocation: input and no output. FFmpeg prints the header
/// (including `Duration:`) to stderr and exits non-zero because no output
/// file was given.
pub fn build_probe_args(input: &Path) -> Vec<String> {
    vec!["-hide_banner".into(), "-i".into(), path_to_string(input)]
}

/// Transcode with the fixed policy: overwrite destination, video codec with
/// a fast preset, standard audio codec, and `-progress` key/value lines
/// interleaved on stderr (pipe:2).
///
/// An `.mp3` destination only accepts MP3 audio, so audio outputs drop any
/// video stream (cover art included) and encode with the MP3 codec.
pub fn build_transcode_args(input: &Path, output: &Path, options: &ConvertOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-nostdin".into(),
        "-nostats".into(),
        "-i".into(),
        path_to_string(input),
    ];
    match MediaKind::from_path(output) {
        MediaKind::Audio => {
            args.extend([
                "-vn".into(),
                "-c:a".into(),
                options.effective_mp3_codec().into(),
            ]);
        }
        MediaKind::Video => {
            args.extend([
                "-c:v".into(),
                options.effective_video_codec().into(),
                "-preset".into(),
                options.effective_preset().into(),
                "-c:a".into(),
                options.effective_audio_codec().into(),
            ]);
        }
    }
    args.extend(["-progress".into(), "pipe:2".into(), path_to_string(output)]);
    args
}

/// One `-flag value` pair per line, for debug logs.
pub fn format_args_for_display(args: &[String]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let takes_value = arg.starts_with('-')
            && args
                .get(i + 1)
                .is_some_and(|next| !next.starts_with('-') || next.parse::<f64>().is_ok());
        if takes_value && i + 1 < args.len() - 1 {
            lines.push(format!("{} {}", arg, quote(&args[i + 1])));
            i += 2;
        } else {
            lines.push(quote(arg));
            i += 1;
        }
    }
    lines.join(" \\\n  ")
}

fn quote(s: &str) -> String {
    if s.contains(char::is_whitespace) {
        format!("\"{}\"", s)
    } else {
        s.to_string()
    }
}
