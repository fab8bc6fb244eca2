//! Whole-keyspace snapshots.
//!
//! The entire map is serialized to one JSON file. Writes go to a sibling
//! temp file first and are renamed into place, so a crash mid-write leaves
//! the previous snapshot intact. Mutations after the last snapshot are lost
//! on crash.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::value::Entry;
use crate::core::RuntimeError;

/// Load a snapshot. A missing file is an empty store.
///
/// A file that exists but cannot be parsed is moved aside to
/// `<path>.corrupt` and the store starts empty.
///
/// # Errors
///
/// `Io` when the file exists but cannot be read or moved aside.
pub fn load(path: &Path) -> Result<HashMap<String, Entry>, RuntimeError> {
    if !path.exists() {
        info!(path = %path.display(), "no snapshot found; starting empty");
        return Ok(HashMap::new());
    }
    let raw = fs::read(path)?;
    match serde_json::from_slice::<HashMap<String, Entry>>(&raw) {
        Ok(entries) => {
            info!(path = %path.display(), keys = entries.len(), "snapshot loaded");
            Ok(entries)
        }
        Err(e) => {
            let aside = corrupt_path(path);
            warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                error = %e,
                "snapshot unreadable; starting empty"
            );
            fs::rename(path, &aside)?;
            Ok(HashMap::new())
        }
    }
}

/// Atomically replace the snapshot at `path` with `entries`.
///
/// # Errors
///
/// `Io` or `Serialization` failures; the previous snapshot is left untouched.
pub fn write(path: &Path, entries: &HashMap<String, Entry>) -> Result<(), RuntimeError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_path(path);
    let bytes = serde_json::to_vec(entries)?;
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".corrupt");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::value::Value;

    #[test]
    fn test_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("none.json")).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, b"{not json").unwrap();

        assert!(load(&path).unwrap().is_empty());
        assert!(!path.exists());
        assert!(dir.path().join("store.json.corrupt").exists());
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let mut entries = HashMap::new();
        entries.insert("k".to_string(), Entry::new(Value::String("v".into())));

        write(&path, &entries).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested").join("store.json.tmp").exists());
        assert_eq!(load(&path).unwrap(), entries);
    }
}
