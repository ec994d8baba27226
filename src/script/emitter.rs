// Shell script emission for a batch plan
//
// The emitted program runs jobs in waves of `concurrency_limit` background
// subshells separated by `wait` barriers, writes every worker's combined
// output to the execution log, and prints exactly one marker line per job.
use crate::models::BatchPlan;
use crate::progress::markers::{
    marker_line, MarkerKind, LOG_BANNER, LOG_RULE, SUMMARY_PREFIX,
};
use std::fmt::Write;

/// Per-run scratch directory for job outcomes, created inside the output
/// directory.
pub const STATUS_DIR_PREFIX: &str = ".ez_phase_status.";

/// Quote a word for POSIX sh. Plain words are left untouched.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

pub fn emit(plan: &BatchPlan) -> String {
    let total = plan.jobs.len();
    let limit = plan.concurrency_limit.max(1);
    let waves = plan.wave_count();
    let mut script = String::new();

    let _ = write!(
        script,
        r#"#!/bin/bash
# Generated by EZ-PHASE. Removed when the batch finishes.
OUTPUT_DIR={output_dir}
LOG_FILE={log}
WORKER={worker}
TOTAL_JOBS={total}

: > "$LOG_FILE"
echo "{banner}" >> "$LOG_FILE"
echo "Timestamp: $(date)" >> "$LOG_FILE"
echo "Jobs: $TOTAL_JOBS, concurrency: {limit}" >> "$LOG_FILE"
echo "{rule}" >> "$LOG_FILE"

if [ ! -f "$WORKER" ]; then
  echo "PHASE binary not found: $WORKER" | tee -a "$LOG_FILE" >&2
  exit 127
fi
if [ ! -x "$WORKER" ]; then
  chmod 755 "$WORKER" 2>/dev/null
  if [ ! -x "$WORKER" ]; then
    echo "PHASE binary is not executable: $WORKER" | tee -a "$LOG_FILE" >&2
    exit 126
  fi
fi

# A hard-killed run skips the EXIT trap; sweep what it left behind.
rm -rf "$OUTPUT_DIR"/{status_prefix}*
STATUS_DIR="$(mktemp -d "$OUTPUT_DIR/{status_prefix}XXXXXX")" || exit 1
trap 'rm -rf "$STATUS_DIR"' EXIT
trap 'exit 143' TERM
trap 'exit 130' INT
"#,
        output_dir = shell_quote(&plan.output_directory.to_string_lossy()),
        status_prefix = STATUS_DIR_PREFIX,
        log = shell_quote(&plan.log_file_path.to_string_lossy()),
        worker = shell_quote(&plan.worker_binary.to_string_lossy()),
        total = total,
        banner = LOG_BANNER,
        limit = limit,
        rule = LOG_RULE,
    );

    for (index, job) in plan.jobs.iter().enumerate() {
        let position = index + 1;
        if index % limit == 0 {
            let _ = writeln!(script, "\n# wave {}/{}", index / limit + 1, waves);
        }

        let args = job
            .argument_vector
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ");

        let _ = write!(
            script,
            r#"(
  echo {started}
  if "$WORKER" {args} >> "$LOG_FILE" 2>&1; then
    : > "$STATUS_DIR/{position}.ok"
    echo {succeeded} | tee -a "$LOG_FILE"
  else
    status=$?
    echo {failed} | tee -a "$LOG_FILE"
    echo "  worker exited with status $status" >> "$LOG_FILE"
  fi
) &
"#,
            started = shell_quote(&marker_line(MarkerKind::Started, &job.name, job.seed)),
            args = args,
            position = position,
            succeeded = shell_quote(&marker_line(MarkerKind::Succeeded, &job.name, job.seed)),
            failed = shell_quote(&marker_line(MarkerKind::Failed, &job.name, job.seed)),
        );

        // Barrier between waves; the last wave is drained by the final wait.
        if position % limit == 0 && position < total {
            script.push_str("wait\n");
        }
    }

    let _ = write!(
        script,
        r#"
wait
SUCCEEDED=$(find "$STATUS_DIR" -name '*.ok' | wc -l | tr -d ' ')
FAILED=$((TOTAL_JOBS - SUCCEEDED))
echo "{summary} Total: $TOTAL_JOBS, Succeeded: $SUCCEEDED, Failed: $FAILED" | tee -a "$LOG_FILE"
if [ "$SUCCEEDED" -eq "$TOTAL_JOBS" ]; then
  exit 0
fi
exit 1
"#,
        summary = SUMMARY_PREFIX,
    );

    script
}
