// Progress aggregation from marker lines
use super::markers::{parse_marker, Marker, MarkerKind};
use crate::models::{JobSpec, ProgressUpdate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub name: String,
    pub seed: u64,
    pub status: JobStatus,
}

/// Counts finished jobs and tracks per-job status.
///
/// Every `SUCCESS:` or `FAILED:` line counts as one completed job. Duplicate
/// markers are counted again; the wrappers print each marker exactly once.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    total: usize,
    succeeded: usize,
    failed: usize,
    jobs: Vec<JobProgress>,
    index: HashMap<(String, u64), usize>,
}

impl ProgressAggregator {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            failed: 0,
            jobs: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Aggregator pre-populated with every job of a plan as `Queued`.
    pub fn for_jobs(jobs: &[JobSpec]) -> Self {
        let mut aggregator = Self::new(jobs.len());
        for job in jobs {
            aggregator
                .index
                .insert((job.name.clone(), job.seed), aggregator.jobs.len());
            aggregator.jobs.push(JobProgress {
                name: job.name.clone(),
                seed: job.seed,
                status: JobStatus::Queued,
            });
        }
        aggregator
    }

    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn jobs(&self) -> &[JobProgress] {
        &self.jobs
    }

    pub fn status_of(&self, name: &str, seed: u64) -> Option<JobStatus> {
        self.index
            .get(&(name.to_string(), seed))
            .map(|&i| self.jobs[i].status)
    }

    pub fn snapshot(&self) -> ProgressUpdate {
        ProgressUpdate {
            percent: percent(self.completed(), self.total),
            completed: self.completed(),
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }

    /// Feed one line of runner stdout. Returns a progress update when the
    /// line finished a job.
    pub fn observe_line(&mut self, line: &str) -> Option<ProgressUpdate> {
        let marker = parse_marker(line)?;
        self.apply(marker)
    }

    /// Record a job outcome known from its exit status.
    pub fn record_outcome(&mut self, name: &str, seed: u64, success: bool) -> ProgressUpdate {
        let kind = if success {
            MarkerKind::Succeeded
        } else {
            MarkerKind::Failed
        };
        let marker = Marker {
            kind,
            name: name.to_string(),
            seed,
        };
        self.apply(marker).unwrap_or_else(|| self.snapshot())
    }

    pub fn record_started(&mut self, name: &str, seed: u64) {
        self.set_status(name, seed, JobStatus::Running);
    }

    fn apply(&mut self, marker: Marker) -> Option<ProgressUpdate> {
        match marker.kind {
            MarkerKind::Started => {
                self.set_status(&marker.name, marker.seed, JobStatus::Running);
                None
            }
            MarkerKind::Succeeded => {
                self.succeeded += 1;
                self.set_status(&marker.name, marker.seed, JobStatus::Succeeded);
                Some(self.snapshot())
            }
            MarkerKind::Failed => {
                self.failed += 1;
                self.set_status(&marker.name, marker.seed, JobStatus::Failed);
                Some(self.snapshot())
            }
        }
    }

    fn set_status(&mut self, name: &str, seed: u64, status: JobStatus) {
        if let Some(&i) = self.index.get(&(name.to_string(), seed)) {
            self.jobs[i].status = status;
        }
    }
}

/// `round(100 * completed / total)` clamped to `[0, 100]`.
pub fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (100.0 * completed as f64 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}
