// File selection, host info and shell integration
use crate::host::host_parallelism;
use crate::models::{InputFile, INPUT_EXTENSION};
use crate::planner::{ensure_executable, validate_worker_binary};
use log::debug;
use std::path::PathBuf;
use tauri::AppHandle;
use tauri_plugin_dialog::{DialogExt, FilePath};
use tauri_plugin_opener::OpenerExt;
use tokio::sync::oneshot;

fn into_paths(picked: Option<Vec<FilePath>>) -> Vec<PathBuf> {
    picked
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.into_path().ok())
        .collect()
}

/// Let the user pick one or more `.inp` files.
#[tauri::command]
pub async fn select_input_files(app: AppHandle) -> Result<Vec<InputFile>, String> {
    let (tx, rx) = oneshot::channel();
    app.dialog()
        .file()
        .set_title("Select PHASE input files")
        .add_filter("PHASE input", &[INPUT_EXTENSION])
        .pick_files(move |picked| {
            let _ = tx.send(picked);
        });

    let paths = into_paths(rx.await.map_err(|e| format!("Dialog closed unexpectedly: {}", e))?);
    debug!("Selected {} input files", paths.len());

    paths
        .iter()
        .map(InputFile::from_path)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())
}

/// Let the user pick the PHASE binary. A missing exec bit is repaired.
#[tauri::command]
pub async fn select_worker_binary(app: AppHandle) -> Result<Option<String>, String> {
    let (tx, rx) = oneshot::channel();
    app.dialog()
        .file()
        .set_title("Select PHASE binary")
        .pick_file(move |picked| {
            let _ = tx.send(picked);
        });

    let picked = rx.await.map_err(|e| format!("Dialog closed unexpectedly: {}", e))?;
    let Some(path) = into_paths(picked.map(|p| vec![p])).into_iter().next() else {
        return Ok(None);
    };

    ensure_executable(&path).map_err(|e| e.to_string())?;
    validate_worker_binary(&path).map_err(|e| e.to_string())?;

    Ok(Some(path.to_string_lossy().to_string()))
}

#[tauri::command]
pub fn get_host_parallelism() -> Option<usize> {
    host_parallelism()
}

#[tauri::command]
pub fn open_output_directory(app: AppHandle, path: String) -> Result<(), String> {
    if !PathBuf::from(&path).is_dir() {
        return Err(format!("Output directory not found: {}", path));
    }
    app.opener()
        .open_path(path, None::<&str>)
        .map_err(|e| format!("Failed to open output directory: {}", e))
}

#[tauri::command]
pub fn get_app_version(app: AppHandle) -> String {
    app.package_info().version.to_string()
}
