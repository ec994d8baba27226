// Atomic JSON file operations

use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

lazy_static::lazy_static! {
    static ref FILE_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
}

fn read_unlocked<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    if !path.exists() {
        return Err(format!("File not found: {:?}", path));
    }

    let mut file = File::open(path).map_err(|e| format!("Failed to open {:?}: {}", path, e))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;

    serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse JSON from {:?}: {}", path, e))
}

fn write_unlocked<T: Serialize>(path: &Path, data: &T) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create directory {:?}: {}", parent, e))?;
    }

    let json_string = serde_json::to_string_pretty(data)
        .map_err(|e| format!("Failed to serialize data: {}", e))?;

    let temp_path = path.with_extension("tmp");

    let mut temp_file = File::create(&temp_path)
        .map_err(|e| format!("Failed to create temp file {:?}: {}", temp_path, e))?;

    temp_file
        .write_all(json_string.as_bytes())
        .map_err(|e| format!("Failed to write to temp file: {}", e))?;

    temp_file
        .sync_all()
        .map_err(|e| format!("Failed to sync temp file: {}", e))?;

    fs::rename(&temp_path, path)
        .map_err(|e| format!("Failed to rename temp file to {:?}: {}", path, e))
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let _lock = FILE_LOCK.lock();
    read_unlocked(path)
}

/// Writes JSON atomically using write-to-temp-then-rename
pub fn write_json_file<T: Serialize>(path: &Path, data: &T) -> Result<(), String> {
    let _lock = FILE_LOCK.lock();
    write_unlocked(path, data)
}

pub fn initialize_json_file<T: Serialize>(path: &Path, default: &T) -> Result<(), String> {
    if !path.exists() {
        log::info!("Initializing JSON file: {:?}", path);
        write_json_file(path, default)?;
    }
    Ok(())
}

pub fn read_json_file_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, String> {
    if path.exists() {
        read_json_file(path)
    } else {
        Ok(T::default())
    }
}

/// Read-modify-write under one lock. A missing file starts from `T::default()`.
pub fn update_json_file<T, F>(path: &Path, update_fn: F) -> Result<T, String>
where
    T: DeserializeOwned + Serialize + Clone + Default,
    F: FnOnce(&mut T),
{
    let _lock = FILE_LOCK.lock();
    let mut data: T = if path.exists() {
        read_unlocked(path)?
    } else {
        T::default()
    };
    update_fn(&mut data);
    write_unlocked(path, &data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_then_read_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("values.json");

        write_json_file(&path, &vec![1u32, 2, 3]).unwrap();
        let values: Vec<u32> = read_json_file(&path).unwrap();

        assert_eq!(values, vec![1, 2, 3]);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_missing_file_errors_or_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        assert!(read_json_file::<Vec<u32>>(&path).is_err());
        assert_eq!(read_json_file_or_default::<Vec<u32>>(&path).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn test_initialize_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        write_json_file(&path, &vec!["kept"]).unwrap();
        initialize_json_file(&path, &Vec::<String>::new()).unwrap();

        let values: Vec<String> = read_json_file(&path).unwrap();
        assert_eq!(values, vec!["kept"]);
    }

    #[test]
    fn test_update_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.json");

        let updated = update_json_file(&path, |counts: &mut BTreeMap<String, u32>| {
            *counts.entry("runs".to_string()).or_default() += 1;
        })
        .unwrap();
        assert_eq!(updated.get("runs"), Some(&1));

        let again = update_json_file(&path, |counts: &mut BTreeMap<String, u32>| {
            *counts.entry("runs".to_string()).or_default() += 1;
        })
        .unwrap();
        assert_eq!(again.get("runs"), Some(&2));
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = read_json_file::<Vec<u32>>(&path).unwrap_err();
        assert!(err.contains("broken.json"));
    }
}
