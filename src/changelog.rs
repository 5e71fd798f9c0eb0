//! Per-row change log files (`<dir>/<PREFIX>_<row>.log`).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Append-only text logs, one file per ledger row.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    dir: PathBuf,
    prefix: String,
}

impl ChangeLog {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, line: i64) -> PathBuf {
        self.dir.join(format!("{}_{}.log", self.prefix, line))
    }

    /// Append one entry to the log of `line`, creating the directory if needed.
    pub fn append(&self, line: i64, entry: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create log directory {}", self.dir.display()))?;
        let path = self.path_for(line);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open change log {}", path.display()))?;
        writeln!(file, "{}", entry)
            .with_context(|| format!("Failed to write change log {}", path.display()))?;
        Ok(path)
    }

    /// File names of this log's entries, sorted. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}_", self.prefix);
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read log directory {}", self.dir.display()))?
        {
            let entry = entry.context("Failed to read directory entry")?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && name.ends_with(".log") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_creates_one_file_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChangeLog::new(dir.path().join("order"), "ORDER");

        log.append(4, "first").unwrap();
        let path = log.append(4, "second").unwrap();
        log.append(5, "other row").unwrap();

        assert_eq!(path, dir.path().join("order").join("ORDER_4.log"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
        assert_eq!(log.list().unwrap(), vec!["ORDER_4.log", "ORDER_5.log"]);
    }

    #[test]
    fn list_ignores_foreign_files_and_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChangeLog::new(dir.path(), "DISPATCH");
        assert!(log.list().unwrap().is_empty());

        std::fs::write(dir.path().join("ORDER_4.log"), "x").unwrap();
        std::fs::write(dir.path().join("DISPATCH_4.txt"), "x").unwrap();
        log.append(9, "entry").unwrap();
        assert_eq!(log.list().unwrap(), vec!["DISPATCH_9.log"]);

        let missing = ChangeLog::new(dir.path().join("nope"), "X");
        assert!(missing.list().unwrap().is_empty());
    }
}
