//! Runs external media tools with captured output and a hard timeout.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use log::debug;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Short name of a tool for error messages (`/usr/bin/ffmpeg` -> `ffmpeg`)
pub fn tool_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string())
}

/// Run `program` to completion, killing it if `timeout` elapses.
///
/// Non-zero exit is reported as [`MediaError::ToolFailed`] with the captured stderr.
pub async fn run_tool(program: &str, args: &[String], timeout: Duration) -> MediaResult<Output> {
    let tool = tool_name(program);
    debug!("Running: {program} {}", args.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(MediaError::ToolNotFound(tool)),
        Err(e) => return Err(MediaError::Io(e)),
    };

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(MediaError::Timeout {
                tool,
                secs: timeout.as_secs(),
            });
        }
    };

    if !output.status.success() {
        return Err(MediaError::ToolFailed {
            tool,
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(output)
}
