// Input file data model
use crate::error::{BatchError, BatchResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extension the worker binary expects on its input files.
pub const INPUT_EXTENSION: &str = "inp";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl InputFile {
    /// Build an InputFile from a path on disk, reading its size.
    pub fn from_path(path: impl AsRef<Path>) -> BatchResult<Self> {
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| BatchError::io("Failed to resolve current directory", e))?
                .join(path)
        };

        let meta = std::fs::metadata(&path)
            .map_err(|_| BatchError::config(format!("Input file not found: {}", path.display())))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Self {
            name,
            path,
            size_bytes: meta.len(),
        })
    }

    /// File name with a trailing `.inp` removed; other extensions are kept.
    pub fn base_name(&self) -> String {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.name.clone());

        match file_name.strip_suffix(&format!(".{}", INPUT_EXTENSION)) {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => file_name,
        }
    }
}
