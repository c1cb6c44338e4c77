use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use media_convert_core::ffmpeg::{ConvertOptions, path_to_string};
use media_convert_core::resolve_output_path;
use media_convert_core::sidecar_api::{self, ErrorPayload, JobGuard, JobRegistry, SidecarEventEmitter};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcSuccess {
    id: u64,
    result: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcFailure {
    id: u64,
    error: ErrorPayload,
}

#[derive(Debug, serde::Serialize)]
struct RpcEvent {
    event: String,
    payload: Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ToolCheckParams {
    #[serde(default)]
    options: ConvertOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveParams {
    input_path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartParams {
    input_path: PathBuf,
    #[serde(default)]
    options: ConvertOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchParams {
    input_paths: Vec<PathBuf>,
    #[serde(default)]
    options: ConvertOptions,
    max_parallel: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CancelParams {
    job_id: Option<u64>,
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line_shared<T: serde::Serialize>(writer: &SharedWriter, value: &T) -> io::Result<()> {
    let mut guard = writer.lock();
    write_json_line(&mut *guard, value)
}

fn event_emitter(writer: &SharedWriter) -> SidecarEventEmitter {
    let writer = Arc::clone(writer);
    Arc::new(move |event: &'static str, payload: Value| {
        let message = RpcEvent {
            event: event.to_string(),
            payload,
        };
        let _ = write_json_line_shared(&writer, &message);
    })
}

fn params_from_value<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ErrorPayload> {
    // A request without params arrives as `null`; treat it as an empty object.
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| ErrorPayload::new("Invalid params payload", e.to_string()))
}

fn to_result_value<T: serde::Serialize>(value: T) -> Result<Value, ErrorPayload> {
    serde_json::to_value(value).map_err(|e| ErrorPayload::new("Serialization error", e.to_string()))
}

fn respond(writer: &SharedWriter, id: u64, result: Result<Value, ErrorPayload>) {
    let _ = match result {
        Ok(result) => write_json_line_shared(writer, &RpcSuccess { id, result }),
        Err(error) => write_json_line_shared(writer, &RpcFailure { id, error }),
    };
}

fn dispatch_sync(method: &str, params: Value, jobs: &JobRegistry) -> Result<Value, ErrorPayload> {
    match method {
        "tool.check" => {
            let parsed: ToolCheckParams = params_from_value(params)?;
            let result = sidecar_api::tool_check(&parsed.options).map_err(|e| ErrorPayload::from(&e))?;
            to_result_value(result)
        }
        "convert.resolve" => {
            let parsed: ResolveParams = params_from_value(params)?;
            to_result_value(sidecar_api::resolve(parsed.input_path))
        }
        "convert.cancel" => {
            let parsed: CancelParams = params_from_value(params)?;
            let cancelled = jobs.cancel(parsed.job_id).map_err(|e| ErrorPayload::from(&e))?;
            Ok(json!({ "cancelled": !cancelled.is_empty(), "jobIds": cancelled }))
        }
        _ => Err(ErrorPayload::new(
            format!("Unknown method: {}", method),
            format!("Unknown method: {}", method),
        )),
    }
}

fn is_async_request(method: &str) -> bool {
    matches!(method, "convert.start" | "convert.batch")
}

/// Registers the job and answers the request right away, so the caller has a
/// job id to cancel with; the worker thread then reports through events.
fn start_async_job(
    request: RpcRequest,
    writer: &SharedWriter,
    jobs: &JobRegistry,
) -> Option<thread::JoinHandle<()>> {
    let emit = event_emitter(writer);
    match request.method.as_str() {
        "convert.start" => {
            let parsed: StartParams = match params_from_value(request.params) {
                Ok(parsed) => parsed,
                Err(err) => {
                    respond(writer, request.id, Err(err));
                    return None;
                }
            };
            let job = jobs.begin_job();
            let output_path = resolve_output_path(&parsed.input_path);
            respond(
                writer,
                request.id,
                Ok(json!({ "jobId": job.job_id(), "outputPath": path_to_string(&output_path) })),
            );
            Some(thread::spawn(move || run_start(job, parsed, emit)))
        }
        "convert.batch" => {
            let parsed: BatchParams = match params_from_value(request.params) {
                Ok(parsed) => parsed,
                Err(err) => {
                    respond(writer, request.id, Err(err));
                    return None;
                }
            };
            let job = jobs.begin_job();
            let items: Vec<Value> = parsed
                .input_paths
                .iter()
                .enumerate()
                .map(|(index, input)| {
                    json!({
                        "index": index,
                        "inputPath": path_to_string(input),
                        "outputPath": path_to_string(&resolve_output_path(input)),
                    })
                })
                .collect();
            respond(writer, request.id, Ok(json!({ "jobId": job.job_id(), "items": items })));
            Some(thread::spawn(move || run_batch(job, parsed, emit)))
        }
        other => {
            respond(
                writer,
                request.id,
                Err(ErrorPayload::new(
                    "Invalid async method",
                    format!("{} is not an async method", other),
                )),
            );
            None
        }
    }
}

fn run_start(job: JobGuard, params: StartParams, emit: SidecarEventEmitter) {
    let outcome = sidecar_api::run_conversion_job(params.input_path, params.options, &job, emit);
    log::debug!(
        target: "media_convert::sidecar",
        "Job {} finished (success={})",
        job.job_id(),
        outcome.is_success()
    );
}

fn run_batch(job: JobGuard, params: BatchParams, emit: SidecarEventEmitter) {
    let result = sidecar_api::run_batch_job(
        params.input_paths,
        params.options,
        params.max_parallel,
        &job,
        Arc::clone(&emit),
    );
    if let Err(err) = result {
        let payload = ErrorPayload::from(&err);
        emit(
            "convert.job.error",
            json!({
                "jobId": job.job_id(),
                "kind": err.kind(),
                "summary": payload.summary,
                "detail": payload.detail,
            }),
        );
    }
}

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let stdin = io::stdin();
    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let jobs = JobRegistry::new();
    let mut async_workers: Vec<thread::JoinHandle<()>> = Vec::new();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: ErrorPayload::new("Invalid input stream", err.to_string()),
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: ErrorPayload::new("Invalid request", err.to_string()),
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        if is_async_request(&request.method) {
            if let Some(worker) = start_async_job(request, &stdout, &jobs) {
                async_workers.push(worker);
            }
        } else {
            let id = request.id;
            let result = dispatch_sync(&request.method, request.params, &jobs);
            respond(&stdout, id, result);
        }
        async_workers.retain(|worker| !worker.is_finished());
    }

    // stdin closed: nobody is left to read results, so stop running jobs.
    if let Ok(ids) = jobs.cancel(None)
        && !ids.is_empty()
    {
        log::info!(target: "media_convert::sidecar", "Input closed; cancelled jobs {:?}", ids);
    }
    for worker in async_workers {
        let _ = worker.join();
    }
    Ok(())
}
