use std::fs;
use std::path::{Path, PathBuf};

use perimetry_core::{PerimetryError, Result};
use tracing::info;

/// One numbered run folder under the log root, with `raw/`, `processed/`
/// and `reports/` subfolders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    number: u32,
    root: PathBuf,
}

impl RunDirectory {
    /// Creates `log_root/runN` for the first unused N starting at 1.
    pub fn create(log_root: &Path) -> Result<Self> {
        let unavailable = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PerimetryError::SinkUnavailable { path, source }
        };

        fs::create_dir_all(log_root).map_err(unavailable(log_root))?;

        let mut number = 1u32;
        let root = loop {
            let candidate = log_root.join(format!("run{number}"));
            // create_dir fails on an existing entry, so two hosts racing for
            // the same root cannot share a folder.
            match fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => number += 1,
                Err(e) => return Err(unavailable(&candidate)(e)),
            }
        };

        let dir = Self { number, root };
        for sub in [dir.raw(), dir.processed(), dir.reports()] {
            fs::create_dir_all(&sub).map_err(unavailable(&sub))?;
        }
        info!(run = number, path = %dir.root.display(), "run directory created");
        Ok(dir)
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn processed(&self) -> PathBuf {
        self.root.join("processed")
    }

    pub fn reports(&self) -> PathBuf {
        self.root.join("reports")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_runs_sequentially() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("logs");

        let first = RunDirectory::create(&root).unwrap();
        let second = RunDirectory::create(&root).unwrap();
        assert_eq!(first.number(), 1);
        assert_eq!(second.number(), 2);
        assert!(second.raw().is_dir());
        assert!(second.processed().is_dir());
        assert!(second.reports().is_dir());
    }

    #[test]
    fn fills_the_first_gap() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("run1")).unwrap();
        fs::create_dir_all(tmp.path().join("run3")).unwrap();
        let dir = RunDirectory::create(tmp.path()).unwrap();
        assert_eq!(dir.number(), 2);
        assert_eq!(dir.root(), tmp.path().join("run2"));
    }

    #[test]
    fn root_that_is_a_file_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            RunDirectory::create(&file),
            Err(PerimetryError::SinkUnavailable { .. })
        ));
    }
}
