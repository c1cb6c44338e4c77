use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::batch::{BatchItem, block_on_async, run_batch};
use crate::cancel::CancelToken;
use crate::error::ConvertError;
use crate::events::{Notifier, ProgressEvent};
use crate::ffmpeg::discovery::{check_ffmpeg, ffmpeg_path_for};
use crate::ffmpeg::{ConvertOptions, path_to_string};
use crate::paths::{ConversionRequest, MediaKind};
use crate::session::{ConversionOutcome, ConversionSession};

pub const PROTOCOL_VERSION: u8 = 1;
pub const DEFAULT_MAX_PARALLEL: usize = 2;

/// Receives `(event name, payload)` pairs for one job.
pub type SidecarEventEmitter = Arc<dyn Fn(&'static str, Value) + Send + Sync>;

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCheckResult {
    pub protocol_version: u8,
    pub ffmpeg_path: String,
    pub version: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResult {
    pub input_path: String,
    pub output_path: String,
    pub media_kind: MediaKind,
    pub overwrites_input: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub summary: String,
    pub detail: String,
}

impl ErrorPayload {
    pub fn new(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
        }
    }
}

impl From<&ConvertError> for ErrorPayload {
    fn from(err: &ConvertError) -> Self {
        let (summary, detail) = err.summary_and_detail();
        Self { summary, detail }
    }
}

pub fn tool_check(options: &ConvertOptions) -> Result<ToolCheckResult, ConvertError> {
    let ffmpeg = ffmpeg_path_for(options)?;
    let version = check_ffmpeg(&ffmpeg)?;
    Ok(ToolCheckResult {
        protocol_version: PROTOCOL_VERSION,
        ffmpeg_path: path_to_string(&ffmpeg),
        version,
    })
}

pub fn resolve(input_path: PathBuf) -> ResolveResult {
    let request = ConversionRequest::resolve(input_path);
    ResolveResult {
        input_path: path_to_string(request.input_path()),
        output_path: path_to_string(request.output_path()),
        media_kind: request.media_kind(),
        overwrites_input: request.overwrites_input(),
    }
}

/// Every running job, keyed by id. Jobs run side by side; each owns its
/// own cancel token.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<u64, CancelToken>>>,
    next_job_id: Arc<AtomicU64>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_job_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Registers a job. It stays cancellable until the returned guard drops.
    pub fn begin_job(&self) -> JobGuard {
        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let token = CancelToken::new();
        self.jobs.lock().insert(job_id, token.clone());
        log::debug!(target: "media_convert::sidecar", "Job {} registered", job_id);
        JobGuard {
            registry: self.clone(),
            job_id,
            token,
        }
    }

    fn finish_job(&self, job_id: u64) {
        self.jobs.lock().remove(&job_id);
    }

    /// Cancels one job, or every job when `job_id` is `None`. Returns the ids
    /// that were cancelled.
    pub fn cancel(&self, job_id: Option<u64>) -> Result<Vec<u64>, ConvertError> {
        let guard = self.jobs.lock();
        let targets: Vec<(u64, CancelToken)> = match job_id {
            Some(id) => match guard.get(&id) {
                Some(token) => vec![(id, token.clone())],
                None => {
                    return Err(ConvertError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("Unknown jobId: {}", id),
                    )));
                }
            },
            None => guard.iter().map(|(id, t)| (*id, t.clone())).collect(),
        };
        drop(guard);

        let mut ids = Vec::with_capacity(targets.len());
        for (id, token) in targets {
            log::info!(target: "media_convert::sidecar", "Cancelling job {}", id);
            token.cancel();
            ids.push(id);
        }
        ids.sort_unstable();
        Ok(ids)
    }

    pub fn active_job_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.jobs.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

pub struct JobGuard {
    registry: JobRegistry,
    job_id: u64,
    token: CancelToken,
}

impl JobGuard {
    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.registry.finish_job(self.job_id);
    }
}

fn with_index(mut payload: Value, index: Option<usize>) -> Value {
    if let (Some(i), Some(map)) = (index, payload.as_object_mut()) {
        map.insert("index".to_string(), json!(i));
    }
    payload
}

/// Forwards a session's progress and status to the emitter as
/// `convert.job.progress` / `convert.job.status` events.
pub fn job_notifier(job_id: u64, index: Option<usize>, emit: SidecarEventEmitter) -> Notifier {
    let emit_progress = Arc::clone(&emit);
    Notifier::new()
        .with_progress(move |event: ProgressEvent| {
            emit_progress(
                "convert.job.progress",
                with_index(
                    json!({
                        "jobId": job_id,
                        "fraction": event.fraction,
                        "elapsedSeconds": event.elapsed_seconds,
                    }),
                    index,
                ),
            );
        })
        .with_status(move |message: &str| {
            emit(
                "convert.job.status",
                with_index(json!({ "jobId": job_id, "message": message }), index),
            );
        })
}

/// The terminal event for an outcome.
pub fn outcome_event(job_id: u64, index: Option<usize>, outcome: &ConversionOutcome) -> (&'static str, Value) {
    match outcome {
        ConversionOutcome::Succeeded(path) => (
            "convert.job.complete",
            with_index(
                json!({ "jobId": job_id, "outputPath": path_to_string(path) }),
                index,
            ),
        ),
        ConversionOutcome::Failed(err) => {
            let payload = ErrorPayload::from(err);
            (
                "convert.job.error",
                with_index(
                    json!({
                        "jobId": job_id,
                        "kind": err.kind(),
                        "summary": payload.summary,
                        "detail": payload.detail,
                    }),
                    index,
                ),
            )
        }
        ConversionOutcome::Cancelled => (
            "convert.job.cancelled",
            with_index(json!({ "jobId": job_id }), index),
        ),
    }
}

/// Runs one conversion to its terminal event.
pub fn run_conversion_job(
    input_path: PathBuf,
    options: ConvertOptions,
    job: &JobGuard,
    emit: SidecarEventEmitter,
) -> ConversionOutcome {
    let notifier = job_notifier(job.job_id(), None, Arc::clone(&emit));
    let session = ConversionSession::new(options);
    let outcome = session.run(&input_path, &notifier, job.token());
    let (event, payload) = outcome_event(job.job_id(), None, &outcome);
    emit(event, payload);
    outcome
}

/// Runs a batch; every item reports under the batch's job id with its index.
pub fn run_batch_job(
    input_paths: Vec<PathBuf>,
    options: ConvertOptions,
    max_parallel: Option<usize>,
    job: &JobGuard,
    emit: SidecarEventEmitter,
) -> Result<Vec<BatchItem>, ConvertError> {
    let job_id = job.job_id();
    let emit_for_items = Arc::clone(&emit);
    let items = block_on_async(run_batch(
        input_paths,
        options,
        max_parallel.unwrap_or(DEFAULT_MAX_PARALLEL),
        job.token().clone(),
        move |index, _| job_notifier(job_id, Some(index), Arc::clone(&emit_for_items)),
    ))?;
    for (index, item) in items.iter().enumerate() {
        let (event, payload) = outcome_event(job_id, Some(index), &item.outcome);
        emit(event, payload);
    }
    Ok(items)
}
