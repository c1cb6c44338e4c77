//! Several independent sessions at once.
//!
//! Each input gets its own [`ConversionSession`], notifier and child cancel
//! token, and runs on tokio's blocking pool. Inputs that resolve to the same
//! output path (`a.wav` and `a.flac` both become `a.mp3`) run one after the
//! other inside a single task so their backups and FFmpeg writes never
//! interleave.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::cancel::CancelToken;
use crate::error::ConvertError;
use crate::events::Notifier;
use crate::ffmpeg::ConvertOptions;
use crate::paths::resolve_output_path;
use crate::session::{ConversionOutcome, ConversionSession};

#[derive(Debug)]
pub struct BatchItem {
    pub input_path: PathBuf,
    pub outcome: ConversionOutcome,
}

/// Inputs grouped by resolved output path, groups in first-seen order.
fn group_by_output(inputs: &[PathBuf]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut index_of: HashMap<PathBuf, usize> = HashMap::new();
    for (i, input) in inputs.iter().enumerate() {
        let output = resolve_output_path(input);
        match index_of.get(&output) {
            Some(&g) => groups[g].push(i),
            None => {
                index_of.insert(output, groups.len());
                groups.push(vec![i]);
            }
        }
    }
    groups
}

/// Runs every input, at most `max_parallel` groups at a time, and returns
/// outcomes in input order. `make_notifier` is called once per input with
/// its index.
pub async fn run_batch<F>(
    inputs: Vec<PathBuf>,
    options: ConvertOptions,
    max_parallel: usize,
    cancel: CancelToken,
    make_notifier: F,
) -> Vec<BatchItem>
where
    F: Fn(usize, &Path) -> Notifier,
{
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let groups = group_by_output(&inputs);
    log::info!(
        target: "media_convert::batch",
        "Starting batch: {} inputs, {} output groups, max_parallel={}",
        inputs.len(),
        groups.len(),
        max_parallel.max(1)
    );

    let mut handles = Vec::with_capacity(groups.len());
    for group in groups {
        let jobs: Vec<(usize, PathBuf, Notifier, CancelToken)> = group
            .into_iter()
            .map(|i| {
                let input = inputs[i].clone();
                let notifier = make_notifier(i, &input);
                (i, input, notifier, cancel.child_token())
            })
            .collect();
        let indices: Vec<usize> = jobs.iter().map(|(i, ..)| *i).collect();
        let options = options.clone();
        let permit = Arc::clone(&semaphore).acquire_owned().await;
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            jobs.into_iter()
                .map(|(i, input, notifier, token)| {
                    let session = ConversionSession::new(options.clone());
                    let outcome = session.run(&input, &notifier, &token);
                    (i, outcome)
                })
                .collect::<Vec<_>>()
        });
        handles.push((indices, handle));
    }

    let mut outcomes: Vec<Option<ConversionOutcome>> = inputs.iter().map(|_| None).collect();
    for (indices, handle) in handles {
        match handle.await {
            Ok(results) => {
                for (i, outcome) in results {
                    outcomes[i] = Some(outcome);
                }
            }
            Err(join_err) => {
                log::error!(
                    target: "media_convert::batch",
                    "Batch worker failed: {}",
                    join_err
                );
                for i in indices {
                    outcomes[i] = Some(ConversionOutcome::Failed(ConvertError::Io(
                        std::io::Error::other(join_err.to_string()),
                    )));
                }
            }
        }
    }

    inputs
        .into_iter()
        .zip(outcomes)
        .map(|(input_path, outcome)| BatchItem {
            input_path,
            outcome: outcome.unwrap_or(ConversionOutcome::Cancelled),
        })
        .collect()
}

/// Drives an async batch from synchronous code.
pub fn block_on_async<T>(future: impl Future<Output = T>) -> Result<T, ConvertError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            ConvertError::Io(std::io::Error::other(format!(
                "Failed to initialize async runtime: {}",
                e
            )))
        })?;
    Ok(runtime.block_on(future))
}
