// Tauri command handlers - one file per domain
pub mod batch;
pub mod files;
pub mod settings;
