//! Shell-hook runner (component K), grounded in the reference implementation's
//! `shell_runner` helper: run `pre_shell`/`post_shell` through the platform shell,
//! stream output into the log, and fail (or not) according to `stop_on_shell_error`.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::errors::{RirbError, RirbResult};
use crate::log::Log;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    Pre,
    Post,
}

impl HookPoint {
    fn label(self) -> &'static str {
        match self {
            HookPoint::Pre => "pre_shell",
            HookPoint::Post => "post_shell",
        }
    }
}

/// Run `command` through `/bin/sh -c` (or `cmd /C` on Windows), streaming output
/// to `log`. A blank command is a no-op. Returns `Ok(())` when the command either
/// succeeds or fails and `stop_on_shell_error` is false.
pub async fn run_hook(point: HookPoint, command: &str, stop_on_error: bool, log: &Log) -> RirbResult<()> {
    if command.trim().is_empty() {
        return Ok(());
    }

    log.log(format!("running {}: {command}", point.label()));

    let mut cmd = shell_command(command);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    let mut child = cmd.spawn()?;

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");
    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();

    let mut out_done = false;
    let mut err_done = false;
    while !out_done || !err_done {
        tokio::select! {
            line = out_lines.next_line(), if !out_done => match line? {
                Some(line) => log.log(format!("[{}] {line}", point.label())),
                None => out_done = true,
            },
            line = err_lines.next_line(), if !err_done => match line? {
                Some(line) => log.log(format!("[{}] {line}", point.label())),
                None => err_done = true,
            },
        }
    }

    let status = child.wait().await?;
    if !status.success() {
        let err = RirbError::Shell {
            mode: point.label().to_string(),
            command: command.to_string(),
            exit_code: status.code(),
        };
        log.log(format!("{err}"));
        if stop_on_error {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(target_os = "windows")]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(target_os = "windows"))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(command);
    cmd
}
