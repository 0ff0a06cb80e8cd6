//! Interrupt sentinel (component G): a zero-byte local file whose existence means
//! "a run is (or was) in progress". Not a mutex — see the design note.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::errors::RirbResult;

pub struct Sentinel {
    path: PathBuf,
}

impl Sentinel {
    pub fn for_uuid(cache_dir: &Path, uuid: &str) -> Self {
        Self {
            path: cache_dir.join("rirb").join("stat").join(uuid),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempt to create the sentinel exclusively. Returns `true` if a prior sentinel
    /// already existed (a previous run did not reach finalization).
    pub fn create_exclusive(&self) -> RirbResult<bool> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(_) => Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the sentinel. Called only on successful completion; errors deleting a
    /// sentinel that no longer exists are not surfaced.
    pub fn remove(&self) -> RirbResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_create_reports_no_prior_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = Sentinel::for_uuid(dir.path(), "abc-123");
        assert!(!sentinel.create_exclusive().unwrap());
        assert!(sentinel.exists());
    }

    #[test]
    fn second_create_reports_prior_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = Sentinel::for_uuid(dir.path(), "abc-123");
        assert!(!sentinel.create_exclusive().unwrap());
        assert!(sentinel.create_exclusive().unwrap());
    }

    #[test]
    fn remove_then_recreate_reports_no_prior_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = Sentinel::for_uuid(dir.path(), "abc-123");
        sentinel.create_exclusive().unwrap();
        sentinel.remove().unwrap();
        assert!(!sentinel.exists());
        assert!(!sentinel.create_exclusive().unwrap());
    }

    #[test]
    fn remove_on_missing_sentinel_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = Sentinel::for_uuid(dir.path(), "never-created");
        assert!(sentinel.remove().is_ok());
    }
}
