//! Explicit, non-global log value (component J). Every component that needs to log
//! is handed a `&Log` (or an `Arc<Log>` when shared across the two listing tasks)
//! rather than reaching for a process-global logging facade — see the design note
//! on the "hot-wired global logger".

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

use crate::errors::RirbResult;

pub struct Log {
    tmpdir: PathBuf,
    log_file: PathBuf,
    debug_file: PathBuf,
    debug_mode: bool,
    inner: Mutex<()>,
}

impl Log {
    /// Start a log rooted at `tmpdir`, creating it if necessary. When `debug_mode` is
    /// set, debug lines are also written to the primary log (mirroring the reference
    /// behavior where `--debug` elevates the debug stream).
    pub fn new(tmpdir: impl Into<PathBuf>, debug_mode: bool) -> RirbResult<Self> {
        let tmpdir = tmpdir.into();
        std::fs::create_dir_all(&tmpdir)?;
        let log_file = tmpdir.join("log.log");
        let debug_file = if debug_mode {
            log_file.clone()
        } else {
            tmpdir.join("debug.log")
        };
        let log = Self {
            tmpdir,
            log_file,
            debug_file,
            debug_mode,
            inner: Mutex::new(()),
        };
        log.line(&log.log_file, &format!("log started. tmpdir={}", log.tmpdir.display()));
        Ok(log)
    }

    pub fn tmpdir(&self) -> &Path {
        &self.tmpdir
    }

    /// Path to the primary log file, for uploading alongside the run's manifests.
    pub fn primary_log_path(&self) -> &Path {
        &self.log_file
    }

    /// Log a line to the primary log and to stderr, timestamped.
    pub fn log(&self, message: impl AsRef<str>) {
        self.line(&self.log_file, message.as_ref());
        eprintln!("{}", message.as_ref());
    }

    /// Log a debug line. Only echoed to stderr when `debug_mode` is set.
    pub fn debug(&self, message: impl AsRef<str>) {
        self.line(&self.debug_file, message.as_ref());
        if self.debug_mode {
            eprintln!("{}", message.as_ref());
        }
    }

    fn line(&self, path: &Path, message: &str) {
        let _guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S:");
        let rendered = format!("{stamp} {message}\n");
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = file.write_all(rendered.as_bytes());
        }
    }

    /// Remove the tmpdir. Only called after a successful run, matching the reference
    /// implementation's "delete tmpdir only if run successfully" rule.
    pub fn cleanup(&self) {
        let _ = std::fs::remove_dir_all(&self.tmpdir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_and_debug_write_to_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::new(dir.path().join("run"), false).unwrap();
        log.log("hello");
        log.debug("quiet detail");

        let primary = std::fs::read_to_string(dir.path().join("run/log.log")).unwrap();
        let debug = std::fs::read_to_string(dir.path().join("run/debug.log")).unwrap();
        assert!(primary.contains("hello"));
        assert!(!primary.contains("quiet detail"));
        assert!(debug.contains("quiet detail"));
    }

    #[test]
    fn debug_mode_merges_streams() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::new(dir.path().join("run"), true).unwrap();
        log.debug("merged");
        let primary = std::fs::read_to_string(dir.path().join("run/log.log")).unwrap();
        assert!(primary.contains("merged"));
    }

    #[test]
    fn concurrent_writers_never_interleave_partial_lines() {
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Log::new(dir.path().join("run"), false).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|writer| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        log.log(format!("writer-{writer}-line-{i}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let rendered = std::fs::read_to_string(dir.path().join("run/log.log")).unwrap();
        let lines: Vec<&str> = rendered.lines().filter(|l| l.contains("-line-")).collect();
        assert_eq!(lines.len(), 8 * 50);
        for line in lines {
            assert!(line.trim_end().ends_with(char::is_numeric), "truncated/interleaved line: {line}");
        }
    }
}
