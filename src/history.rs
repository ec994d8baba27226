// Batch run history, newest first
use crate::error::{BatchError, BatchResult};
use crate::file_manager::{read_json_file_or_default, update_json_file};
use crate::models::BatchRunRecord;
use log::debug;
use std::path::Path;

/// Insert `record` at the front, replacing any entry with the same id, and
/// keep at most `limit` entries.
pub fn record_batch_run(path: &Path, record: BatchRunRecord, limit: usize) -> BatchResult<()> {
    let id = record.id.clone();
    update_json_file(path, |runs: &mut Vec<BatchRunRecord>| {
        runs.retain(|r| r.id != record.id);
        runs.insert(0, record);
        runs.truncate(limit.max(1));
    })
    .map_err(BatchError::Persistence)?;

    debug!("Recorded batch run {} in {:?}", id, path);
    Ok(())
}

pub fn list_batch_runs(path: &Path) -> BatchResult<Vec<BatchRunRecord>> {
    read_json_file_or_default(path).map_err(BatchError::Persistence)
}
