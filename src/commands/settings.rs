// Settings command handlers backed by settings.json
use crate::file_manager::{read_json_file, write_json_file};
use crate::models::{ExecutionMode, RunParameters, Settings};
use crate::utils::get_settings_json_path;
use log::debug;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsParams {
    pub worker_binary_path: Option<String>,
    pub default_parameters: Option<RunParameters>,
    pub execution_mode: Option<ExecutionMode>,
    pub history_limit: Option<usize>,
    pub log_tail_lines: Option<usize>,
}

/// Load settings, falling back to defaults when the file does not exist yet.
pub fn load_settings() -> Result<Settings, String> {
    let path = get_settings_json_path();

    if !path.exists() {
        return Ok(Settings::default());
    }

    read_json_file(&path)
}

/// Apply the fields present in `update`. An empty binary path clears it.
pub fn apply_settings_update(current: &mut Settings, update: UpdateSettingsParams) {
    if let Some(worker_binary_path) = update.worker_binary_path {
        current.worker_binary_path = if worker_binary_path.trim().is_empty() {
            None
        } else {
            Some(worker_binary_path)
        };
    }
    if let Some(default_parameters) = update.default_parameters {
        current.default_parameters = default_parameters;
    }
    if let Some(execution_mode) = update.execution_mode {
        current.execution_mode = execution_mode;
    }
    if let Some(history_limit) = update.history_limit {
        current.history_limit = history_limit.max(1);
    }
    if let Some(log_tail_lines) = update.log_tail_lines {
        current.log_tail_lines = log_tail_lines;
    }
}

/// Get current settings from the JSON file
#[tauri::command]
pub fn get_settings() -> Result<Settings, String> {
    load_settings()
}

/// Update settings with partial update support
#[tauri::command]
pub fn update_settings(settings: UpdateSettingsParams) -> Result<Settings, String> {
    let mut current_settings = load_settings()?;
    apply_settings_update(&mut current_settings, settings);

    write_json_file(&get_settings_json_path(), &current_settings)?;

    debug!("Updated settings: {:?}", current_settings);

    Ok(current_settings)
}
