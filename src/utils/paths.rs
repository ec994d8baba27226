use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

static APP_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

pub const APP_DIR_NAME: &str = "EZ-PHASE";

pub fn get_app_data_dir() -> PathBuf {
    APP_DATA_DIR
        .get_or_init(|| {
            let base_dir = dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."));
            base_dir.join(APP_DIR_NAME)
        })
        .clone()
}

pub fn get_data_dir() -> PathBuf {
    get_app_data_dir().join("data")
}

pub fn get_logs_dir() -> PathBuf {
    get_app_data_dir().join("logs")
}

pub fn get_settings_json_path() -> PathBuf {
    get_data_dir().join("settings.json")
}

pub fn get_batch_runs_json_path() -> PathBuf {
    get_data_dir().join("batch_runs.json")
}

pub fn initialize_data_directories() -> Result<(), String> {
    let directories = [get_data_dir(), get_logs_dir()];

    for dir in &directories {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| {
                format!("Failed to create directory {:?}: {}", dir, e)
            })?;
            info!("Created directory: {:?}", dir);
        }
    }

    info!("Data directories initialized at: {:?}", get_app_data_dir());
    Ok(())
}
