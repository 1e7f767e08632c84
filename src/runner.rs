//! Runs the deployment script and streams its output into the log.

use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::SplitStream;
use tracing::{Instrument, error, info, warn};

use crate::error::{HookError, Result};
use crate::job::{DeployReport, DeploymentJob, OutputStream, ScriptExit};

/// Log target used for every line the script prints
pub const SCRIPT_LOG_TARGET: &str = "deploy::script";

/// Runs `<shell> <script>` to completion.
///
/// Both pipes are drained by their own task while the process runs, and the
/// report is only returned once the process has exited and both drains have
/// finished, so every line is logged before anything that follows the run.
/// Only a failure to start the process is an error; a non-zero exit or a
/// failed wait ends up in the report.
pub async fn run_script(job: &DeploymentJob) -> Result<DeployReport> {
    let started = Instant::now();

    info!("Running: {}", job.command_line());
    let mut child = Command::new(&job.shell)
        .arg(&job.script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            error!("couldn't start {}: {}", job.command_line(), e);
            HookError::ScriptExecutionFailed(format!(
                "couldn't start {}: {}",
                job.command_line(),
                e
            ))
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_task =
        tokio::spawn(drain_optional(stdout, OutputStream::Stdout).in_current_span());
    let stderr_task =
        tokio::spawn(drain_optional(stderr, OutputStream::Stderr).in_current_span());

    info!("waiting for output");
    let (status, stdout_lines, stderr_lines) =
        tokio::join!(child.wait(), stdout_task, stderr_task);

    let exit = match status {
        Ok(status) => ScriptExit::from_status(status),
        Err(e) => {
            warn!("err waiting for script: {}", e);
            ScriptExit::WaitFailed(e.to_string())
        }
    };

    let report = DeployReport {
        exit,
        stdout_lines: joined_count(stdout_lines, OutputStream::Stdout),
        stderr_lines: joined_count(stderr_lines, OutputStream::Stderr),
        duration: started.elapsed(),
    };

    match &report.exit {
        ScriptExit::Success => info!(
            "script finished in {:?} ({} stdout lines, {} stderr lines)",
            report.duration, report.stdout_lines, report.stderr_lines
        ),
        ScriptExit::Failed { code } => warn!(
            "script exited with code {:?} after {:?}",
            code, report.duration
        ),
        ScriptExit::WaitFailed(_) => {}
    }

    Ok(report)
}

fn joined_count(
    result: std::result::Result<usize, tokio::task::JoinError>,
    stream: OutputStream,
) -> usize {
    result.unwrap_or_else(|e| {
        error!("{} reader task failed: {}", stream, e);
        0
    })
}

async fn drain_optional<R>(reader: Option<R>, stream: OutputStream) -> usize
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(reader) => drain_lines(reader, stream).await,
        None => {
            warn!("couldn't get {}", stream);
            0
        }
    }
}

/// Reads `reader` line by line until EOF, logging each line with the prefix of
/// `stream`. Returns the number of lines logged.
///
/// Lines are split on `\n` and decoded lossily so output that is not valid
/// UTF-8 can't stop the drain.
pub async fn drain_lines<R>(reader: R, stream: OutputStream) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut lines = SplitStream::new(BufReader::new(reader).split(b'\n'));
    let mut count = 0;

    while let Some(next) = lines.next().await {
        match next {
            Ok(raw) => {
                let line = String::from_utf8_lossy(&raw);
                let line = line.strip_suffix('\r').unwrap_or(&*line);
                info!(
                    target: SCRIPT_LOG_TARGET,
                    stream = stream.as_str(),
                    "{} {}",
                    stream.prefix(),
                    line
                );
                count += 1;
            }
            Err(e) => {
                warn!("error reading script {}: {}", stream, e);
                break;
            }
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_lines_counts_lines() {
        let input: &[u8] = b"first\nsecond\r\nthird";
        assert_eq!(drain_lines(input, OutputStream::Stdout).await, 3);
    }

    #[tokio::test]
    async fn test_drain_lines_survives_invalid_utf8() {
        let input: &[u8] = b"ok\n\xff\xfe broken\nafter\n";
        assert_eq!(drain_lines(input, OutputStream::Stderr).await, 3);
    }

    #[tokio::test]
    async fn test_drain_lines_empty_input() {
        let input: &[u8] = b"";
        assert_eq!(drain_lines(input, OutputStream::Stdout).await, 0);
    }
}
