// Direct process pool runner
// Spawns worker processes behind a semaphore instead of emitting a script

use super::executor::{RunContext, RunControl};
use super::signal::{exit_code, terminate, Termination};
use crate::error::{BatchError, BatchResult};
use crate::models::{BatchOutcome, BatchPlan, JobSpec};
use crate::progress::markers::{marker_line, summary_line, MarkerKind, LOG_BANNER, LOG_RULE};
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

#[cfg(windows)]
use super::executor::CREATE_NO_WINDOW;

/// Exit codes reported for a cancelled pool, matching a signalled shell.
const CANCELLED_EXIT_CODE: i32 = 143;
const KILLED_EXIT_CODE: i32 = 137;

enum PoolMessage {
    Started { name: String, seed: u64 },
    Finished { name: String, seed: u64, success: bool },
}

/// Truncate the execution log and write its header.
pub(super) fn write_log_header(plan: &BatchPlan) -> BatchResult<()> {
    let context = || format!("Failed to write log file {:?}", plan.log_file_path);
    let mut file = File::create(&plan.log_file_path).map_err(|e| BatchError::io(context(), e))?;

    let header = format!(
        "{}\nTimestamp: {}\nJobs: {}, concurrency: {}\n{}\n",
        LOG_BANNER,
        chrono::Local::now().format("%a %b %e %H:%M:%S %Z %Y"),
        plan.total_jobs(),
        plan.concurrency_limit,
        LOG_RULE
    );
    file.write_all(header.as_bytes())
        .map_err(|e| BatchError::io(context(), e))
}

fn append_log(path: &Path, line: &str) {
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{}", line));
    if let Err(e) = result {
        warn!("Failed to append to {:?}: {}", path, e);
    }
}

pub(super) async fn drive_pool(
    plan: BatchPlan,
    mut ctx: RunContext,
) -> BatchResult<BatchOutcome> {
    let semaphore = Arc::new(Semaphore::new(plan.concurrency_limit));
    let (tx, mut rx) = mpsc::channel::<PoolMessage>(plan.total_jobs() * 2);
    let control = ctx.control.clone();

    let mut workers = JoinSet::new();
    for job in plan.jobs.iter().cloned() {
        workers.spawn(run_job(
            job,
            plan.worker_binary.clone(),
            plan.output_directory.clone(),
            plan.log_file_path.clone(),
            semaphore.clone(),
            control.clone(),
            tx.clone(),
        ));
    }
    drop(tx);

    let mut cancel_noted = false;
    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(PoolMessage::Started { name, seed }) => {
                    ctx.aggregator.record_started(&name, seed);
                    ctx.forward_output(marker_line(MarkerKind::Started, &name, seed));
                }
                Some(PoolMessage::Finished { name, seed, success }) => {
                    let kind = if success { MarkerKind::Succeeded } else { MarkerKind::Failed };
                    let update = ctx.aggregator.record_outcome(&name, seed, success);
                    ctx.forward_output(marker_line(kind, &name, seed));
                    ctx.on_progress(update);
                }
                None => break,
            },
            _ = control.cancel.cancelled(), if !cancel_noted => {
                cancel_noted = true;
                ctx.mark_cancelling();
            },
        }
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!("Pool worker task failed: {}", e);
        }
    }

    let progress = ctx.aggregator.snapshot();
    let summary = summary_line(progress.total, progress.succeeded, progress.failed);
    append_log(&plan.log_file_path, &summary);
    ctx.forward_output(summary);

    let code = if progress.succeeded == progress.total {
        0
    } else if control.kill.is_cancelled() {
        KILLED_EXIT_CODE
    } else if control.cancel.is_cancelled() {
        CANCELLED_EXIT_CODE
    } else {
        1
    };

    ctx.finish(&plan, code)
}

fn spawn_worker(job: &JobSpec, worker: &Path, cwd: &Path, log_path: &Path) -> std::io::Result<Child> {
    let log = OpenOptions::new().create(true).append(true).open(log_path)?;
    let log_err = log.try_clone()?;

    let mut cmd = Command::new(worker);
    cmd.args(&job.argument_vector)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    cmd.spawn()
}

async fn run_job(
    job: JobSpec,
    worker: PathBuf,
    cwd: PathBuf,
    log_path: PathBuf,
    semaphore: Arc<Semaphore>,
    control: RunControl,
    tx: mpsc::Sender<PoolMessage>,
) {
    let _permit = tokio::select! {
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
        _ = control.cancel.cancelled() => return,
        _ = control.kill.cancelled() => return,
    };
    if control.is_cancelled() {
        return;
    }

    let _ = tx
        .send(PoolMessage::Started {
            name: job.name.clone(),
            seed: job.seed,
        })
        .await;

    let success = match spawn_worker(&job, &worker, &cwd, &log_path) {
        Ok(mut child) => {
            let pgid = if cfg!(unix) { child.id() } else { None };
            debug!("Started {} seed {} (pid {:?})", job.name, job.seed, child.id());

            let mut sent: Option<Termination> = None;
            let status = loop {
                let mut pending = None;
                tokio::select! {
                    status = child.wait() => break status,
                    _ = control.cancel.cancelled(), if sent.is_none() => {
                        pending = Some(Termination::Graceful);
                    },
                    _ = control.kill.cancelled(), if sent != Some(Termination::Hard) => {
                        pending = Some(Termination::Hard);
                    },
                }
                if let Some(how) = pending {
                    terminate(&mut child, pgid, how);
                    sent = Some(how);
                }
            };

            match status {
                Ok(status) => {
                    let code = exit_code(&status);
                    if code != 0 {
                        append_log(&log_path, &format!("  worker exited with status {}", code));
                    }
                    code == 0
                }
                Err(e) => {
                    append_log(&log_path, &format!("  failed to wait for worker: {}", e));
                    false
                }
            }
        }
        Err(e) => {
            append_log(&log_path, &format!("  failed to start worker: {}", e));
            false
        }
    };

    // A job killed by cancellation reports nothing, like a killed subshell.
    if !success && control.is_cancelled() {
        return;
    }

    let kind = if success {
        MarkerKind::Succeeded
    } else {
        MarkerKind::Failed
    };
    append_log(&log_path, &marker_line(kind, &job.name, job.seed));

    let _ = tx
        .send(PoolMessage::Finished {
            name: job.name,
            seed: job.seed,
            success,
        })
        .await;
}
