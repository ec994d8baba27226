//! Logging utilities for EZ-PHASE
//! Handles log file cleanup for 7-day retention

use crate::utils::get_logs_dir;
use log::info;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

const LOG_RETENTION_DAYS: u64 = 7;

pub fn cleanup_old_logs() {
    let retention = Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
    let removed = cleanup_logs_in(&get_logs_dir(), retention, SystemTime::now());
    if removed > 0 {
        info!("Removed {} expired log file(s)", removed);
    }
}

/// Delete `.log` files in `dir` last modified more than `retention` before `now`.
pub fn cleanup_logs_in(dir: &Path, retention: Duration, now: SystemTime) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "log") {
            continue;
        }
        let expired = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .map_or(false, |age| age > retention);
        if expired && fs::remove_file(&path).is_ok() {
            info!("Cleaned up old log: {:?}", path.file_name());
            removed += 1;
        }
    }
    removed
}
