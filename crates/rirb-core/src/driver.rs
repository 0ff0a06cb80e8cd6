//! Sync-tool driver (component B): one entry per sync-tool subcommand, uniform
//! stdout/stderr capture, error propagation, and a shared elapsed-time accumulator.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::errors::{RirbError, RirbResult};
use crate::log::Log;

/// Disables the sync tool's interactive password prompt; named generically in the
/// design because the concrete sync tool is swappable.
const PASSWORD_PROMPT_DISABLE_ENV: &str = "RCLONE_ASK_PASSWORD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// stderr redirected into stdout; consumed line-by-line and logged as it arrives.
    Streamed,
    /// stdout/stderr captured to distinct temp files, logged once the call completes.
    Buffered,
}

#[derive(Debug, Clone, Default)]
pub struct CallOutput {
    pub stdout: String,
    pub stderr: String,
}

pub struct SyncToolDriver {
    exe: String,
    extra_flags: Vec<String>,
    env: BTreeMap<String, String>,
    metadata: bool,
    /// Accumulated wall-clock time spent inside sync-tool calls, in milliseconds.
    rclonetime_ms: Arc<AtomicU64>,
}

impl SyncToolDriver {
    pub fn new(exe: impl Into<String>, extra_flags: Vec<String>, env: BTreeMap<String, String>, metadata: bool) -> Self {
        Self {
            exe: exe.into(),
            extra_flags,
            env,
            metadata,
            rclonetime_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn rclonetime_ms(&self) -> u64 {
        self.rclonetime_ms.load(Ordering::Relaxed)
    }

    /// Invoke the sync tool. `argv` excludes the executable name; the configured
    /// extra flags and `--metadata` (when enabled) are appended automatically.
    pub async fn call(&self, argv: &[String], mode: CallMode, log: &Log) -> RirbResult<CallOutput> {
        let mut full_argv = argv.to_vec();
        full_argv.extend(self.extra_flags.iter().cloned());
        if self.metadata {
            full_argv.push("--metadata".to_string());
        }

        let start = Instant::now();
        let result = match mode {
            CallMode::Streamed => self.call_streamed(&full_argv, log).await,
            CallMode::Buffered => self.call_buffered(&full_argv, log).await,
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.rclonetime_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        result
    }

    fn command(&self, argv: &[String]) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.args(argv);
        cmd.envs(std::env::vars());
        cmd.envs(self.env.iter());
        cmd.env(PASSWORD_PROMPT_DISABLE_ENV, "false");
        cmd
    }

    /// stdout and stderr are merged into one logged stream, mirroring the reference
    /// implementation's `stderr=STDOUT` subprocess mode. The two pipes are drained
    /// concurrently since tokio has no single combined handle for them.
    async fn call_streamed(&self, argv: &[String], log: &Log) -> RirbResult<CallOutput> {
        let mut cmd = self.command(argv);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();

        let mut collected = String::new();
        let mut out_done = false;
        let mut err_done = false;
        while !out_done || !err_done {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => match line? {
                    Some(line) => {
                        log.log(&line);
                        collected.push_str(&line);
                        collected.push('\n');
                    }
                    None => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line? {
                    Some(line) => {
                        log.log(&line);
                        collected.push_str(&line);
                        collected.push('\n');
                    }
                    None => err_done = true,
                },
            }
        }

        let status = child.wait().await?;
        self.finish(argv, status.code(), collected, String::new(), log)
    }

    async fn call_buffered(&self, argv: &[String], log: &Log) -> RirbResult<CallOutput> {
        let suffix = random_suffix();
        let tmp = std::env::temp_dir();
        let out_path = tmp.join(format!("std.{suffix}.out"));
        let err_path = tmp.join(format!("std.{suffix}.err"));

        let out_file = std::fs::File::create(&out_path)?;
        let err_file = std::fs::File::create(&err_path)?;

        let mut cmd = self.command(argv);
        cmd.stdout(Stdio::from(out_file));
        cmd.stderr(Stdio::from(err_file));
        let mut child = cmd.spawn()?;
        let status = child.wait().await?;

        let stdout = std::fs::read_to_string(&out_path).unwrap_or_default();
        let stderr = std::fs::read_to_string(&err_path).unwrap_or_default();
        let _ = std::fs::remove_file(&out_path);
        let _ = std::fs::remove_file(&err_path);

        if !stdout.is_empty() {
            log.debug(format!("[stdout] {stdout}"));
        }
        if !stderr.is_empty() {
            log.debug(format!("[stderr] {stderr}"));
        }

        self.finish(argv, status.code(), stdout, stderr, log)
    }

    fn finish(
        &self,
        argv: &[String],
        code: Option<i32>,
        stdout: String,
        stderr: String,
        log: &Log,
    ) -> RirbResult<CallOutput> {
        if code.unwrap_or(1) != 0 {
            log.log(format!(
                "sync tool call failed (exit {code:?}): {} {}",
                self.exe,
                argv.join(" ")
            ));
            let mut full_argv = vec![self.exe.clone()];
            full_argv.extend(argv.iter().cloned());
            return Err(RirbError::ToolInvocation {
                argv: full_argv,
                exit_code: code,
                stdout,
                stderr,
            });
        }
        Ok(CallOutput { stdout, stderr })
    }
}

fn random_suffix() -> String {
    let bytes: [u8; 6] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
