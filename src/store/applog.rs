//! Day-partitioned append-only logs.
//!
//! These live beside the keyspace, not in it: every entry is written
//! straight to `<root>/<name>/<YYYY-MM-DD>.log` as one JSON string per
//! line, so log shipping does not depend on the snapshot cycle.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::RuntimeError;

/// Append-only log files under one root directory.
///
/// Line counts are scanned from disk once per partition and then kept
/// running, so appends do not re-read the file.
#[derive(Debug, Clone)]
pub struct AppendLog {
    root: PathBuf,
    counts: Arc<Mutex<HashMap<PathBuf, u64>>>,
}

impl AppendLog {
    /// Use `root` as the log directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// `Io` if the directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            counts: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn validate_segment(kind: &str, value: &str) -> Result<(), RuntimeError> {
        let valid = !value.is_empty()
            && value != "."
            && value != ".."
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
        if valid {
            Ok(())
        } else {
            Err(RuntimeError::InvalidConfig(format!("invalid log {kind} `{value}`")))
        }
    }

    fn partition(&self, name: &str, day: &str) -> Result<PathBuf, RuntimeError> {
        Self::validate_segment("name", name)?;
        Self::validate_segment("day", day)?;
        Ok(self.root.join(name).join(format!("{day}.log")))
    }

    /// Append `entry` to today's partition of `name` and return the
    /// partition's new line count.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for names that are not plain path segments, `Io` on
    /// write failures.
    pub fn append(&self, name: &str, day: &str, entry: &str) -> Result<u64, RuntimeError> {
        let path = self.partition(name, day)?;
        let before = self.cached_count(&path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{line}")?;
        let after = before + 1;
        self.counts.lock().insert(path, after);
        Ok(after)
    }

    /// Number of entries in one partition; zero when it does not exist.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for bad names, `Io` on read failures.
    pub fn count(&self, name: &str, day: &str) -> Result<u64, RuntimeError> {
        let path = self.partition(name, day)?;
        self.cached_count(&path)
    }

    fn cached_count(&self, path: &Path) -> Result<u64, RuntimeError> {
        if let Some(count) = self.counts.lock().get(path) {
            return Ok(*count);
        }
        let count = Self::scan(path)?;
        self.counts.lock().insert(path.to_path_buf(), count);
        Ok(count)
    }

    fn scan(path: &Path) -> Result<u64, RuntimeError> {
        if !path.exists() {
            return Ok(0);
        }
        let reader = BufReader::new(fs::File::open(path)?);
        let mut count = 0u64;
        for line in reader.lines() {
            if !line?.is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Read up to `limit` entries starting at zero-based line `start`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for bad names, `Io` on read failures, `Serialization`
    /// for corrupt lines.
    pub fn read(
        &self,
        name: &str,
        day: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<String>, RuntimeError> {
        let path = self.partition(name, day)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&path)?);
        let mut out = Vec::new();
        for line in reader.lines().skip(start).take(limit) {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            out.push(serde_json::from_str::<String>(&line)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_count_read() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendLog::open(dir.path()).unwrap();

        assert_eq!(log.append("audit", "2026-01-02", "first").unwrap(), 1);
        assert_eq!(log.append("audit", "2026-01-02", "second\nline").unwrap(), 2);
        assert_eq!(log.append("audit", "2026-01-03", "other day").unwrap(), 1);

        assert_eq!(log.count("audit", "2026-01-02").unwrap(), 2);
        assert_eq!(
            log.read("audit", "2026-01-02", 0, 10).unwrap(),
            vec!["first".to_string(), "second\nline".to_string()]
        );
        assert_eq!(log.read("audit", "2026-01-02", 1, 1).unwrap(), vec!["second\nline"]);
        assert!(log.read("audit", "1999-01-01", 0, 10).unwrap().is_empty());
    }

    #[test]
    fn test_count_resumes_from_existing_partition() {
        let dir = tempfile::tempdir().unwrap();
        let first = AppendLog::open(dir.path()).unwrap();
        first.append("audit", "2026-01-02", "a").unwrap();
        first.append("audit", "2026-01-02", "b").unwrap();

        // A fresh handle scans the file once, then keeps counting.
        let reopened = AppendLog::open(dir.path()).unwrap();
        assert_eq!(reopened.append("audit", "2026-01-02", "c").unwrap(), 3);
        assert_eq!(reopened.append("audit", "2026-01-02", "d").unwrap(), 4);
        assert_eq!(reopened.count("audit", "2026-01-02").unwrap(), 4);
        assert_eq!(reopened.read("audit", "2026-01-02", 0, 10).unwrap().len(), 4);
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendLog::open(dir.path()).unwrap();
        assert!(log.append("../escape", "2026-01-02", "x").is_err());
        assert!(log.append("audit", "..", "x").is_err());
    }
}
