// Batch command handlers: plan, run, cancel and report PHASE batches
use super::settings::load_settings;
use crate::error::BatchError;
use crate::history;
use crate::models::{
    BatchEvent, BatchOutcome, BatchRun, BatchRunRecord, CancelAck, InputFile, RunParameters,
};
use crate::planner::{build_plan, validate_request, AdvancedOptions};
use crate::process_manager::{BatchExecutor, ExecutorConfig};
use crate::utils::get_batch_runs_json_path;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use tauri::{AppHandle, Emitter, State};
use tokio::sync::mpsc;

pub const OUTPUT_EVENT: &str = "phase-output";
pub const ERROR_EVENT: &str = "phase-error";
pub const PROGRESS_EVENT: &str = "phase-progress";
pub const COMPLETE_EVENT: &str = "phase-complete";

fn forward_event(app: &AppHandle, event: BatchEvent) {
    let result = match event {
        BatchEvent::Output(line) => app.emit(OUTPUT_EVENT, line),
        BatchEvent::Error(line) => app.emit(ERROR_EVENT, line),
        BatchEvent::Progress(update) => app.emit(PROGRESS_EVENT, update),
        BatchEvent::Completed(report) => app.emit(COMPLETE_EVENT, report),
    };
    if let Err(e) = result {
        warn!("Failed to emit batch event: {}", e);
    }
}

/// Plan and run a batch, resolving once every job has terminated.
#[tauri::command]
pub async fn run_batch(
    app: AppHandle,
    executor: State<'_, BatchExecutor>,
    input_files: Vec<String>,
    worker_binary: Option<String>,
    parameters: Option<RunParameters>,
    advanced: Option<AdvancedOptions>,
) -> Result<BatchOutcome, String> {
    let settings = load_settings()?;

    let worker = worker_binary
        .filter(|p| !p.trim().is_empty())
        .or_else(|| settings.worker_binary_path.clone())
        .map(PathBuf::from)
        .ok_or_else(|| BatchError::config("PHASE binary path not specified").to_string())?;

    let files = input_files
        .iter()
        .map(InputFile::from_path)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    validate_request(&worker, &files).map_err(|e| e.to_string())?;

    let mut params = parameters.unwrap_or_else(|| settings.default_parameters.clone());
    if let Some(advanced) = advanced {
        let mut args = advanced.to_args().map_err(|e| e.to_string())?;
        args.append(&mut params.extra_args);
        params.extra_args = args;
    }

    let plan = build_plan(&files, &params, &worker).map_err(|e| e.to_string())?;
    debug!(
        "Planned {} jobs into {:?} with concurrency {}",
        plan.total_jobs(),
        plan.output_directory,
        plan.concurrency_limit
    );

    let (tx, mut rx) = mpsc::channel::<BatchEvent>(256);
    let handle = executor
        .start_with_config(
            plan,
            ExecutorConfig {
                mode: settings.execution_mode,
                log_tail_lines: settings.log_tail_lines,
            },
            tx,
        )
        .await
        .map_err(|e| e.to_string())?;
    let run_id = handle.id().to_string();

    let forward_app = app.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            forward_event(&forward_app, event);
        }
    });

    let result = handle.wait().await;
    let _ = forwarder.await;

    if let Some(run) = executor.current_run().filter(|run| run.id == run_id) {
        let record = BatchRunRecord::from_run(&run, &files);
        if let Err(e) = history::record_batch_run(
            &get_batch_runs_json_path(),
            record,
            settings.history_limit,
        ) {
            error!("Failed to record batch run {}: {}", run_id, e);
        }
    }

    match result {
        Ok(outcome) => {
            info!(
                "Batch {} processed {} jobs into {:?}",
                run_id, outcome.processed_job_count, outcome.output_directory
            );
            Ok(outcome)
        }
        Err(e) => {
            warn!("Batch {} did not succeed: {}", run_id, e);
            Err(e.to_string())
        }
    }
}

#[tauri::command]
pub fn cancel_batch(executor: State<'_, BatchExecutor>) -> CancelAck {
    executor.cancel()
}

/// Snapshot of the live or most recent batch.
#[tauri::command]
pub fn get_batch_status(executor: State<'_, BatchExecutor>) -> Option<BatchRun> {
    executor.current_run()
}

#[tauri::command]
pub fn list_batch_runs() -> Result<Vec<BatchRunRecord>, String> {
    history::list_batch_runs(&get_batch_runs_json_path()).map_err(|e| e.to_string())
}
