// Batch executor
// Runs a batch plan as detached worker processes and streams its events

use super::pool;
use super::signal::{exit_code, terminate, Termination};
use crate::error::{BatchError, BatchResult};
use crate::models::{
    BatchEvent, BatchOutcome, BatchPlan, BatchRun, BatchStatus, CancelAck, CompletionReport,
    ExecutionMode, ExecutorState, ProgressUpdate,
};
use crate::progress::ProgressAggregator;
use crate::script;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Split};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[cfg(windows)]
pub(super) const CREATE_NO_WINDOW: u32 = 0x08000000;

/// How long to keep reading output after the runner exits, in case a
/// surviving grandchild still holds the pipes open.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub mode: ExecutionMode,
    pub log_tail_lines: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            log_tail_lines: 200,
        }
    }
}

/// Cancellation tokens for one run. The driver task is the only place that
/// turns them into signals.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pub cancel: CancellationToken,
    pub kill: CancellationToken,
}

impl RunControl {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.kill.is_cancelled()
    }
}

#[derive(Default)]
struct ExecutorInner {
    current: Option<BatchRun>,
    control: Option<RunControl>,
}

/// Runs at most one batch at a time.
#[derive(Clone)]
pub struct BatchExecutor {
    inner: Arc<Mutex<ExecutorInner>>,
    config: ExecutorConfig,
}

/// Returned by `start`; owned by the caller.
pub struct BatchHandle {
    id: String,
    control: RunControl,
    task: JoinHandle<BatchResult<BatchOutcome>>,
}

impl BatchHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request cancellation. Returns once the request is recorded; wait for
    /// the `Completed` event or `wait()` to observe termination.
    pub fn cancel(&self) -> CancelAck {
        self.control.cancel.cancel();
        CancelAck::acknowledged("Batch signaled to stop.")
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.control.cancel.clone()
    }

    pub async fn wait(self) -> BatchResult<BatchOutcome> {
        self.task
            .await
            .map_err(|e| BatchError::Spawn(format!("Batch task failed: {}", e)))?
    }
}

impl BatchExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ExecutorInner::default())),
            config,
        }
    }

    pub fn with_mode(mode: ExecutionMode) -> Self {
        Self::new(ExecutorConfig {
            mode,
            ..ExecutorConfig::default()
        })
    }

    pub fn mode(&self) -> ExecutionMode {
        self.config.mode
    }

    pub fn state(&self) -> ExecutorState {
        self.inner
            .lock()
            .current
            .as_ref()
            .map(|run| ExecutorState::from(run.status))
            .unwrap_or(ExecutorState::Idle)
    }

    /// Snapshot of the live or most recent run.
    pub fn current_run(&self) -> Option<BatchRun> {
        self.inner.lock().current.clone()
    }

    /// Start executing `plan`. Events go to `events` until the run ends;
    /// the sender is dropped afterwards so receivers see the channel close.
    ///
    /// A subscriber that stops reading never stalls the run: events are
    /// relayed through an unbounded queue.
    pub async fn start(
        &self,
        plan: BatchPlan,
        events: mpsc::Sender<BatchEvent>,
    ) -> BatchResult<BatchHandle> {
        let config = self.config.clone();
        self.start_with_config(plan, config, events).await
    }

    /// Like `start`, with per-run execution mode and log tail size.
    pub async fn start_with_config(
        &self,
        plan: BatchPlan,
        config: ExecutorConfig,
        events: mpsc::Sender<BatchEvent>,
    ) -> BatchResult<BatchHandle> {
        let mode = config.mode;
        if plan.jobs.is_empty() {
            return Err(BatchError::config("Batch plan has no jobs"));
        }
        if plan.concurrency_limit < 1 {
            return Err(BatchError::config("Concurrency limit must be at least 1"));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let control = RunControl::default();

        {
            let mut inner = self.inner.lock();
            if let Some(run) = &inner.current {
                if !run.status.is_terminal() {
                    return Err(BatchError::State(format!(
                        "A batch is already {:?}",
                        run.status
                    )));
                }
            }
            inner.current = Some(BatchRun::new(
                id.clone(),
                mode,
                plan.total_jobs(),
                plan.output_directory.clone(),
                plan.log_file_path.clone(),
                config.log_tail_lines,
            ));
            inner.control = Some(control.clone());
        }

        let ctx = RunContext {
            id: id.clone(),
            inner: self.inner.clone(),
            events: relay_events(events),
            control: control.clone(),
            aggregator: ProgressAggregator::for_jobs(&plan.jobs),
        };

        if let Err(e) = tokio::fs::create_dir_all(&plan.output_directory).await {
            ctx.abort_before_start();
            return Err(BatchError::io(
                format!("Failed to create output directory {:?}", plan.output_directory),
                e,
            ));
        }

        info!(
            "Starting batch {}: {} jobs, concurrency {}, mode {:?}",
            id,
            plan.total_jobs(),
            plan.concurrency_limit,
            mode
        );

        let task = match mode {
            ExecutionMode::Script => {
                let child = match spawn_script(&plan).await {
                    Ok(child) => child,
                    Err(e) => {
                        remove_script(&plan.script_path).await;
                        ctx.abort_before_start();
                        return Err(e);
                    }
                };
                ctx.set_status(BatchStatus::Running);
                tokio::spawn(drive_script(child, plan, ctx))
            }
            ExecutionMode::Pool => {
                if let Err(e) = pool::write_log_header(&plan) {
                    ctx.abort_before_start();
                    return Err(e);
                }
                ctx.set_status(BatchStatus::Running);
                tokio::spawn(pool::drive_pool(plan, ctx))
            }
        };

        Ok(BatchHandle { id, control, task })
    }

    /// Request cancellation of the live batch, if any.
    pub fn cancel(&self) -> CancelAck {
        let inner = self.inner.lock();
        match (&inner.current, &inner.control) {
            (Some(run), Some(control)) if !run.status.is_terminal() => {
                control.cancel.cancel();
                CancelAck::acknowledged("Batch signaled to stop.")
            }
            _ => CancelAck::rejected("No active batch to stop."),
        }
    }

    /// True while a run exists and has not reached a terminal status.
    pub fn is_busy(&self) -> bool {
        self.inner
            .lock()
            .current
            .as_ref()
            .map_or(false, |run| !run.status.is_terminal())
    }

    /// Poll until no run is live or `limit` elapses. Returns whether the
    /// executor went idle.
    pub async fn wait_until_idle(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while self.is_busy() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
        true
    }

    /// Hard-kill the live batch. Used when the application is closing.
    pub fn kill(&self) {
        let inner = self.inner.lock();
        if let (Some(run), Some(control)) = (&inner.current, &inner.control) {
            if !run.status.is_terminal() {
                control.kill.cancel();
            }
        }
    }
}

/// Per-run state owned by the driver task.
pub(super) struct RunContext {
    pub(super) id: String,
    inner: Arc<Mutex<ExecutorInner>>,
    pub(super) events: mpsc::UnboundedSender<BatchEvent>,
    pub(super) control: RunControl,
    pub(super) aggregator: ProgressAggregator,
}

impl RunContext {
    fn update_run<F: FnOnce(&mut BatchRun)>(&self, f: F) {
        let mut inner = self.inner.lock();
        if let Some(run) = inner.current.as_mut().filter(|run| run.id == self.id) {
            f(run);
        }
    }

    pub(super) fn set_status(&self, status: BatchStatus) {
        self.update_run(|run| run.status = status);
    }

    fn abort_before_start(&self) {
        self.update_run(|run| {
            run.status = BatchStatus::Failed;
            run.finished_at = Some(chrono::Utc::now().to_rfc3339());
        });
    }

    pub(super) fn mark_cancelling(&self) {
        self.update_run(|run| {
            if !run.status.is_terminal() {
                run.status = BatchStatus::Cancelling;
            }
        });
    }

    /// Forward a line of runner stdout and count any job it finished.
    pub(super) fn on_output(&mut self, line: String) {
        let update = self.aggregator.observe_line(&line);
        self.update_run(|run| run.push_log_line(&line));
        let _ = self.events.send(BatchEvent::Output(line));
        if let Some(update) = update {
            self.on_progress(update);
        }
    }

    /// Forward a line without parsing it for markers.
    pub(super) fn forward_output(&mut self, line: String) {
        self.update_run(|run| run.push_log_line(&line));
        let _ = self.events.send(BatchEvent::Output(line));
    }

    pub(super) fn on_error(&mut self, line: String) {
        self.update_run(|run| run.push_log_line(&line));
        let _ = self.events.send(BatchEvent::Error(line));
    }

    pub(super) fn on_progress(&mut self, update: ProgressUpdate) {
        self.update_run(|run| run.apply_progress(&update));
        let _ = self.events.send(BatchEvent::Progress(update));
    }

    /// Record the terminal state, emit `Completed` and build the result.
    pub(super) fn finish(
        &mut self,
        plan: &BatchPlan,
        code: i32,
    ) -> BatchResult<BatchOutcome> {
        let cancelled = self.control.is_cancelled() && code != 0;
        let success = code == 0;
        let status = if success {
            BatchStatus::Succeeded
        } else if cancelled {
            BatchStatus::Cancelled
        } else {
            BatchStatus::Failed
        };

        let snapshot = self.aggregator.snapshot();
        self.update_run(|run| {
            run.apply_progress(&snapshot);
            run.finish(status, code);
        });

        info!(
            "Batch {} finished: {:?} (exit code {}, {}/{} jobs succeeded)",
            self.id, status, code, snapshot.succeeded, snapshot.total
        );

        let _ = self.events.send(BatchEvent::Completed(CompletionReport {
            success,
            exit_code: code,
            cancelled,
        }));

        if success {
            Ok(BatchOutcome {
                output_directory: plan.output_directory.clone(),
                processed_job_count: plan.total_jobs(),
            })
        } else if cancelled {
            Err(BatchError::Cancelled { exit_code: code })
        } else {
            Err(BatchError::BatchFailure {
                exit_code: code,
                log_file: plan.log_file_path.clone(),
            })
        }
    }
}

/// Relay run events to the caller's channel from a separate task, so the
/// driver never waits on a slow subscriber. The relay stops when the
/// caller drops its receiver.
fn relay_events(events: mpsc::Sender<BatchEvent>) -> mpsc::UnboundedSender<BatchEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if events.send(event).await.is_err() {
                break;
            }
        }
    });
    tx
}

async fn write_script(path: &Path, contents: &str) -> BatchResult<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| BatchError::io(format!("Failed to write script {:?}", path), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| BatchError::io(format!("Failed to make {:?} executable", path), e))?;
    }

    Ok(())
}

async fn remove_script(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove script {:?}: {}", path, e);
        }
    }
}

async fn spawn_script(plan: &BatchPlan) -> BatchResult<Child> {
    write_script(&plan.script_path, &script::emit(plan)).await?;

    let mut cmd = Command::new("bash");
    cmd.arg(&plan.script_path)
        .current_dir(&plan.output_directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);

    // Own process group so cancellation reaches every worker.
    #[cfg(unix)]
    cmd.process_group(0);

    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    debug!("Spawning batch script: {:?}", plan.script_path);

    cmd.spawn()
        .map_err(|e| BatchError::Spawn(format!("Failed to spawn bash: {}", e)))
}

async fn drive_script(
    mut child: Child,
    plan: BatchPlan,
    mut ctx: RunContext,
) -> BatchResult<BatchOutcome> {
    // With process_group(0) the group id equals the child's pid.
    let pgid = if cfg!(unix) { child.id() } else { None };

    let mut out_lines = child.stdout.take().map(|s| BufReader::new(s).split(b'\n'));
    let mut err_lines = child.stderr.take().map(|s| BufReader::new(s).split(b'\n'));

    let control = ctx.control.clone();
    let mut cancel_sent = false;
    let mut kill_sent = false;
    let mut exit_status = None;
    let drain_deadline = tokio::time::sleep(Duration::MAX);
    tokio::pin!(drain_deadline);

    loop {
        if exit_status.is_some() && out_lines.is_none() && err_lines.is_none() {
            break;
        }

        let mut pending = None;

        tokio::select! {
            line = next_line(&mut out_lines), if out_lines.is_some() => match line {
                Some(line) => ctx.on_output(line),
                None => out_lines = None,
            },
            line = next_line(&mut err_lines), if err_lines.is_some() => match line {
                Some(line) => ctx.on_error(line),
                None => err_lines = None,
            },
            status = child.wait(), if exit_status.is_none() => {
                let status = status.map_err(|e| BatchError::io("Failed to wait for batch", e));
                exit_status = Some(status);
                drain_deadline
                    .as_mut()
                    .reset(tokio::time::Instant::now() + OUTPUT_DRAIN_GRACE);
            },
            _ = control.cancel.cancelled(), if !cancel_sent && exit_status.is_none() => {
                cancel_sent = true;
                pending = Some(Termination::Graceful);
            },
            _ = control.kill.cancelled(), if !kill_sent && exit_status.is_none() => {
                kill_sent = true;
                pending = Some(Termination::Hard);
            },
            _ = &mut drain_deadline, if exit_status.is_some() => {
                warn!("Batch {} exited but its output is still open; not waiting further", ctx.id);
                break;
            },
        }

        if let Some(how) = pending {
            info!("Cancelling batch {} ({:?})", ctx.id, how);
            ctx.mark_cancelling();
            terminate(&mut child, pgid, how);
        }
    }

    remove_script(&plan.script_path).await;

    let code = match exit_status {
        Some(Ok(status)) => exit_code(&status),
        Some(Err(e)) => {
            warn!("{}", e);
            -1
        }
        None => -1,
    };

    ctx.finish(&plan, code)
}

/// Next line of a child stream, decoded lossily. `None` once the stream ends.
async fn next_line<R>(lines: &mut Option<Split<BufReader<R>>>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let segment = lines.as_mut()?.next_segment().await.ok().flatten()?;
    let line = String::from_utf8_lossy(&segment);
    Some(line.trim_end_matches('\r').to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::{InputFile, Parallelism, RunParameters};
    use crate::planner::build_plan_with_host;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(20);

    fn write_stub(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("PHASE");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn write_inputs(dir: &Path, names: &[&str]) -> Vec<InputFile> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(format!("{}.inp", name));
                std::fs::write(&path, "2\n3\n").unwrap();
                InputFile::from_path(&path).unwrap()
            })
            .collect()
    }

    fn plan_for(dir: &Path, worker: &Path, names: &[&str], parallelism: u32) -> BatchPlan {
        let files = write_inputs(dir, names);
        let params = RunParameters {
            parallelism: Parallelism::Fixed(parallelism),
            base_seed: Some(7),
            ..RunParameters::default()
        };
        build_plan_with_host(&files, &params, worker, Some(8)).unwrap()
    }

    fn collect(mut rx: mpsc::Receiver<BatchEvent>) -> JoinHandle<Vec<BatchEvent>> {
        tokio::spawn(async move {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        })
    }

    fn log_lines_with(plan: &BatchPlan, prefix: &str) -> usize {
        std::fs::read_to_string(&plan.log_file_path)
            .unwrap()
            .lines()
            .filter(|l| l.starts_with(prefix))
            .count()
    }

    fn last_progress(events: &[BatchEvent]) -> Option<ProgressUpdate> {
        events.iter().rev().find_map(|e| match e {
            BatchEvent::Progress(p) => Some(*p),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_script_batch_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "exit 0");
        let plan = plan_for(dir.path(), &worker, &["sample", "other"], 1);
        let script_path = plan.script_path.clone();
        let stale_status = plan.output_directory.join(".ez_phase_status.stale");
        std::fs::create_dir_all(&stale_status).unwrap();

        let executor = BatchExecutor::with_mode(ExecutionMode::Script);
        let (tx, rx) = mpsc::channel(100);
        let events = collect(rx);

        let handle = executor.start(plan.clone(), tx).await.unwrap();
        let outcome = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap().unwrap();
        let events = events.await.unwrap();

        assert_eq!(outcome.processed_job_count, 2);
        assert_eq!(outcome.output_directory, plan.output_directory);
        assert_eq!(log_lines_with(&plan, "SUCCESS:"), 2);
        assert_eq!(log_lines_with(&plan, "FAILED:"), 0);
        assert!(!script_path.exists());
        let leftovers = std::fs::read_dir(&plan.output_directory)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".ez_phase_status."))
            .count();
        assert_eq!(leftovers, 0);

        assert!(events.contains(&BatchEvent::Output("SUCCESS: sample seed 7".to_string())));
        assert_eq!(last_progress(&events).unwrap().percent, 100);
        assert_eq!(
            events.last(),
            Some(&BatchEvent::Completed(CompletionReport {
                success: true,
                exit_code: 0,
                cancelled: false,
            }))
        );
        assert_eq!(executor.state(), ExecutorState::Succeeded);
    }

    #[tokio::test]
    async fn test_script_batch_with_one_failed_job() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "case \"$2\" in *second.inp) exit 1;; esac\nexit 0");
        let plan = plan_for(dir.path(), &worker, &["first", "second"], 2);

        let executor = BatchExecutor::with_mode(ExecutionMode::Script);
        let (tx, rx) = mpsc::channel(100);
        let events = collect(rx);

        let handle = executor.start(plan.clone(), tx).await.unwrap();
        let err = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap().unwrap_err();
        let events = events.await.unwrap();

        match err {
            BatchError::BatchFailure { exit_code, log_file } => {
                assert_ne!(exit_code, 0);
                assert_eq!(log_file, plan.log_file_path);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(log_lines_with(&plan, "SUCCESS:"), 1);
        assert_eq!(log_lines_with(&plan, "FAILED:"), 1);
        assert_eq!(log_lines_with(&plan, "All jobs completed."), 1);

        let progress = last_progress(&events).unwrap();
        assert_eq!(progress.succeeded, 1);
        assert_eq!(progress.failed, 1);
        assert!(matches!(
            events.last(),
            Some(BatchEvent::Completed(CompletionReport { success: false, cancelled: false, .. }))
        ));
        assert_eq!(executor.state(), ExecutorState::Failed);
    }

    #[tokio::test]
    async fn test_script_batch_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "sleep 1000");
        let plan = plan_for(dir.path(), &worker, &["a", "b", "c"], 2);

        let executor = BatchExecutor::with_mode(ExecutionMode::Script);
        let (tx, rx) = mpsc::channel(100);
        let events = collect(rx);

        let handle = executor.start(plan.clone(), tx).await.unwrap();
        let ack = handle.cancel();
        assert!(ack.acknowledged);

        let err = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap().unwrap_err();
        let events = events.await.unwrap();

        assert!(err.is_cancelled());
        assert!(!events
            .iter()
            .any(|e| matches!(e, BatchEvent::Output(line) if line.starts_with("SUCCESS:"))));
        assert!(matches!(
            events.last(),
            Some(BatchEvent::Completed(CompletionReport { success: false, cancelled: true, exit_code })) if *exit_code != 0
        ));
        assert_eq!(executor.state(), ExecutorState::Cancelled);
        assert!(!plan.script_path.exists());
    }

    #[tokio::test]
    async fn test_unread_subscriber_does_not_block_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "sleep 1000");
        let plan = plan_for(dir.path(), &worker, &["a", "b", "c"], 3);

        let executor = BatchExecutor::with_mode(ExecutionMode::Script);
        // Capacity one and never read: every send after the first would wait.
        let (tx, _rx) = mpsc::channel(1);
        let handle = executor.start(plan, tx).await.unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(executor.cancel().acknowledged);

        let err = timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("batch should stop even if nobody reads its events")
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(executor.state(), ExecutorState::Cancelled);
    }

    #[tokio::test]
    async fn test_script_missing_worker_fails_before_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("PHASE");
        let plan = plan_for(dir.path(), &missing, &["a"], 1);

        let executor = BatchExecutor::with_mode(ExecutionMode::Script);
        let (tx, rx) = mpsc::channel(100);
        let events = collect(rx);

        let handle = executor.start(plan.clone(), tx).await.unwrap();
        let err = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap().unwrap_err();
        let events = events.await.unwrap();

        assert!(matches!(err, BatchError::BatchFailure { exit_code: 127, .. }));
        assert!(events.iter().any(
            |e| matches!(e, BatchEvent::Error(line) if line.starts_with("PHASE binary not found:"))
        ));
        assert!(matches!(
            events.last(),
            Some(BatchEvent::Completed(CompletionReport { success: false, cancelled: false, .. }))
        ));
        assert_eq!(log_lines_with(&plan, "PHASE binary not found:"), 1);
        assert_eq!(log_lines_with(&plan, "SUCCESS:"), 0);
    }

    #[tokio::test]
    async fn test_script_repairs_worker_exec_bit() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "exit 0");
        std::fs::set_permissions(&worker, std::fs::Permissions::from_mode(0o644)).unwrap();
        let plan = plan_for(dir.path(), &worker, &["a"], 1);

        let executor = BatchExecutor::with_mode(ExecutionMode::Script);
        let (tx, rx) = mpsc::channel(100);
        let events = collect(rx);

        let handle = executor.start(plan.clone(), tx).await.unwrap();
        let outcome = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap().unwrap();
        let _ = events.await;

        assert_eq!(outcome.processed_job_count, 1);
        let mode = std::fs::metadata(&worker).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(log_lines_with(&plan, "SUCCESS:"), 1);
    }

    #[tokio::test]
    async fn test_log_tail_size_is_set_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "exit 0");
        let plan = plan_for(dir.path(), &worker, &["a", "b", "c"], 3);

        let executor = BatchExecutor::with_mode(ExecutionMode::Script);
        let (tx, rx) = mpsc::channel(100);
        let events = collect(rx);
        let config = ExecutorConfig {
            mode: ExecutionMode::Script,
            log_tail_lines: 2,
        };

        let handle = executor.start_with_config(plan, config, tx).await.unwrap();
        timeout(TEST_TIMEOUT, handle.wait()).await.unwrap().unwrap();
        let _ = events.await;

        let run = executor.current_run().unwrap();
        assert_eq!(run.raw_log_tail.len(), 2);
        assert!(run.raw_log_tail.back().unwrap().starts_with("All jobs completed."));
        assert_eq!(run.completed_jobs, 3);
    }

    #[tokio::test]
    async fn test_second_start_while_running_is_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "sleep 1000");
        let plan = plan_for(dir.path(), &worker, &["a"], 1);

        let executor = BatchExecutor::with_mode(ExecutionMode::Script);
        let (tx, rx) = mpsc::channel(100);
        let events = collect(rx);
        let handle = executor.start(plan.clone(), tx).await.unwrap();
        assert_eq!(executor.state(), ExecutorState::Running);

        let (tx2, _rx2) = mpsc::channel(100);
        let err = executor.start(plan, tx2).await.err().unwrap();
        assert!(matches!(err, BatchError::State(_)));

        assert!(executor.cancel().acknowledged);
        let _ = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap();
        let _ = events.await;
        assert!(!executor.cancel().acknowledged);
    }

    #[tokio::test]
    async fn test_kill_stops_batch_for_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "trap '' TERM\nsleep 1000");
        let plan = plan_for(dir.path(), &worker, &["a", "b"], 2);

        let executor = BatchExecutor::with_mode(ExecutionMode::Script);
        let (tx, rx) = mpsc::channel(100);
        let events = collect(rx);
        let handle = executor.start(plan, tx).await.unwrap();
        assert!(executor.is_busy());

        executor.kill();
        assert!(executor.wait_until_idle(TEST_TIMEOUT).await);

        let err = handle.wait().await.unwrap_err();
        let _ = events.await;
        assert!(err.is_cancelled());
        assert_eq!(err.exit_code(), Some(137));
        assert!(!executor.is_busy());
    }

    #[tokio::test]
    async fn test_restart_after_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "exit 0");
        let plan = plan_for(dir.path(), &worker, &["a"], 1);
        let executor = BatchExecutor::with_mode(ExecutionMode::Script);

        for _ in 0..2 {
            let (tx, rx) = mpsc::channel(100);
            let events = collect(rx);
            let handle = executor.start(plan.clone(), tx).await.unwrap();
            timeout(TEST_TIMEOUT, handle.wait()).await.unwrap().unwrap();
            let _ = events.await;
        }
        assert_eq!(executor.state(), ExecutorState::Succeeded);
        let run = executor.current_run().unwrap();
        assert_eq!(run.completed_jobs, 1);
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_pool_batch_succeeds_without_script() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "echo working on \"$2\"\nexit 0");
        let plan = plan_for(dir.path(), &worker, &["x", "y", "z"], 2);

        let executor = BatchExecutor::with_mode(ExecutionMode::Pool);
        let (tx, rx) = mpsc::channel(100);
        let events = collect(rx);

        let handle = executor.start(plan.clone(), tx).await.unwrap();
        let outcome = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap().unwrap();
        let events = events.await.unwrap();

        assert_eq!(outcome.processed_job_count, 3);
        assert!(!plan.script_path.exists());
        assert_eq!(log_lines_with(&plan, "SUCCESS:"), 3);
        assert_eq!(log_lines_with(&plan, "working on"), 3);
        assert_eq!(log_lines_with(&plan, "=== EZ-PHASE Execution Log ==="), 1);
        assert_eq!(last_progress(&events).unwrap().percent, 100);
        assert!(matches!(
            events.last(),
            Some(BatchEvent::Completed(CompletionReport { success: true, .. }))
        ));
    }

    #[tokio::test]
    async fn test_pool_batch_with_one_failed_job() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "case \"$2\" in *second.inp) exit 3;; esac\nexit 0");
        let plan = plan_for(dir.path(), &worker, &["first", "second"], 1);

        let executor = BatchExecutor::with_mode(ExecutionMode::Pool);
        let (tx, rx) = mpsc::channel(100);
        let events = collect(rx);

        let handle = executor.start(plan.clone(), tx).await.unwrap();
        let err = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap().unwrap_err();
        let _ = events.await;

        assert!(matches!(err, BatchError::BatchFailure { exit_code: 1, .. }));
        assert_eq!(log_lines_with(&plan, "SUCCESS:"), 1);
        assert_eq!(log_lines_with(&plan, "FAILED: second seed 7"), 1);
        assert_eq!(log_lines_with(&plan, "  worker exited with status 3"), 1);
    }

    #[tokio::test]
    async fn test_pool_batch_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "sleep 1000");
        let plan = plan_for(dir.path(), &worker, &["a", "b", "c"], 1);

        let executor = BatchExecutor::with_mode(ExecutionMode::Pool);
        let (tx, rx) = mpsc::channel(100);
        let events = collect(rx);

        let handle = executor.start(plan.clone(), tx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(executor.cancel().acknowledged);

        let err = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap().unwrap_err();
        let events = events.await.unwrap();

        assert!(err.is_cancelled());
        assert_eq!(log_lines_with(&plan, "SUCCESS:"), 0);
        assert!(matches!(
            events.last(),
            Some(BatchEvent::Completed(CompletionReport { cancelled: true, .. }))
        ));
    }

    #[tokio::test]
    async fn test_missing_worker_in_pool_counts_as_job_failures() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_for(dir.path(), &dir.path().join("missing"), &["a", "b"], 2);

        let executor = BatchExecutor::with_mode(ExecutionMode::Pool);
        let (tx, rx) = mpsc::channel(100);
        let events = collect(rx);

        let handle = executor.start(plan.clone(), tx).await.unwrap();
        let err = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap().unwrap_err();
        let _ = events.await;

        assert!(matches!(err, BatchError::BatchFailure { .. }));
        assert_eq!(log_lines_with(&plan, "FAILED:"), 2);
    }

    #[tokio::test]
    async fn test_empty_plan_rejected_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let worker = write_stub(dir.path(), "exit 0");
        let mut plan = plan_for(dir.path(), &worker, &["a"], 1);
        plan.jobs.clear();

        let executor = BatchExecutor::with_mode(ExecutionMode::Script);
        let (tx, _rx) = mpsc::channel(100);
        let err = executor.start(plan, tx).await.err().unwrap();
        assert!(matches!(err, BatchError::Config(_)));
        assert_eq!(executor.state(), ExecutorState::Idle);
    }
}
