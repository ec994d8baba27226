pub mod error;
pub mod file_manager;
pub mod history;
pub mod host;
pub mod logging;
pub mod models;
pub mod planner;
pub mod process_manager;
pub mod progress;
pub mod script;
pub mod utils;

#[cfg(feature = "desktop")]
mod commands;

pub use error::{BatchError, BatchResult};
pub use process_manager::{BatchExecutor, BatchHandle, ExecutorConfig};

#[cfg(feature = "desktop")]
mod desktop {
    use crate::commands::{
        batch::{cancel_batch, get_batch_status, list_batch_runs, run_batch},
        files::{
            get_app_version, get_host_parallelism, open_output_directory, select_input_files,
            select_worker_binary,
        },
        settings::{get_settings, update_settings},
    };
    use crate::file_manager::initialize_json_file;
    use crate::logging::cleanup_old_logs;
    use crate::models::{BatchRunRecord, Settings};
    use crate::process_manager::{BatchExecutor, ExecutorConfig};
    use crate::utils::{
        get_batch_runs_json_path, get_logs_dir, get_settings_json_path,
        initialize_data_directories,
    };
    use log::{error, info, warn};
    use std::time::Duration;
    use tauri::{Manager, WindowEvent};
    use tauri_plugin_log::{Target, TargetKind};

    /// How long a closing window waits for a killed batch to be reaped.
    const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

    fn initialize_app_data() -> Result<(), String> {
        // Create directory structure
        initialize_data_directories()?;

        initialize_json_file(&get_settings_json_path(), &Settings::default())?;
        initialize_json_file(&get_batch_runs_json_path(), &Vec::<BatchRunRecord>::new())?;

        info!("App data initialized successfully");
        Ok(())
    }

    pub fn run() {
        // run_batch passes the current mode and tail size with every run
        let executor = BatchExecutor::new(ExecutorConfig::default());

        tauri::Builder::default()
            .plugin(
                tauri_plugin_log::Builder::new()
                    .targets([
                        Target::new(TargetKind::Stdout),
                        Target::new(TargetKind::Folder {
                            path: get_logs_dir(),
                            file_name: Some("ez-phase".to_string()),
                        }),
                    ])
                    .level(log::LevelFilter::Info)
                    .build(),
            )
            .plugin(tauri_plugin_opener::init())
            .plugin(tauri_plugin_dialog::init())
            .plugin(tauri_plugin_single_instance::init(|app, _argv, _cwd| {
                // Another instance tried to launch - show and focus the existing window
                if let Some(window) = app.get_webview_window("main") {
                    let _ = window.show();
                    let _ = window.unminimize();
                    let _ = window.set_focus();
                }
            }))
            .on_window_event(|window, event| {
                if let WindowEvent::CloseRequested { api, .. } = event {
                    let executor = window.state::<BatchExecutor>().inner().clone();
                    if executor.is_busy() {
                        // Keep the window until the batch's process group is gone
                        api.prevent_close();
                        executor.kill();
                        let app = window.app_handle().clone();
                        tauri::async_runtime::spawn(async move {
                            if !executor.wait_until_idle(SHUTDOWN_GRACE).await {
                                warn!("Batch still running at shutdown");
                            }
                            app.exit(0);
                        });
                    }
                }
            })
            .manage(executor)
            .setup(|_app| {
                if let Err(e) = initialize_app_data() {
                    error!("Failed to initialize app data: {}", e);
                }
                cleanup_old_logs();
                Ok(())
            })
            .invoke_handler(tauri::generate_handler![
                // Batch commands
                run_batch,
                cancel_batch,
                get_batch_status,
                list_batch_runs,
                // File and host commands
                select_input_files,
                select_worker_binary,
                get_host_parallelism,
                open_output_directory,
                get_app_version,
                // Settings
                get_settings,
                update_settings,
            ])
            .run(tauri::generate_context!())
            .expect("error while running tauri application");
    }
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    desktop::run()
}
