// Pre-spawn validation of the worker binary and input files
use crate::error::{BatchError, BatchResult};
use crate::models::InputFile;
use log::{debug, warn};
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Set mode 0755 on a binary that lost its executable bit.
#[cfg(unix)]
pub fn ensure_executable(path: &Path) -> BatchResult<()> {
    if is_executable(path) {
        return Ok(());
    }
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| BatchError::io(format!("Could not make {:?} executable", path), e))?;
    debug!("Repaired executable bit on {:?}", path);
    Ok(())
}

#[cfg(not(unix))]
pub fn ensure_executable(_path: &Path) -> BatchResult<()> {
    Ok(())
}

pub fn validate_worker_binary(path: &Path) -> BatchResult<()> {
    if path.as_os_str().is_empty() {
        return Err(BatchError::config("PHASE binary path not specified"));
    }
    if !path.exists() {
        return Err(BatchError::config(format!(
            "PHASE binary not found at: {}",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(BatchError::config(format!(
            "PHASE binary is not a file: {}",
            path.display()
        )));
    }
    if let Err(e) = ensure_executable(path) {
        warn!("{}", e);
    }
    if !is_executable(path) {
        return Err(BatchError::config(format!(
            "PHASE binary is not executable: {}",
            path.display()
        )));
    }
    Ok(())
}

pub fn validate_input_files(files: &[InputFile]) -> BatchResult<()> {
    if files.is_empty() {
        return Err(BatchError::config("No input files specified"));
    }
    for file in files {
        if file.path.as_os_str().is_empty() {
            return Err(BatchError::config("Invalid input file - missing path"));
        }
        if !file.path.is_file() {
            return Err(BatchError::config(format!(
                "Input file not found: {}",
                file.path.display()
            )));
        }
    }
    Ok(())
}

/// Everything that must hold before a batch may spawn anything.
pub fn validate_request(worker_binary: &Path, files: &[InputFile]) -> BatchResult<()> {
    validate_worker_binary(worker_binary)?;
    validate_input_files(files)
}
