use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use uuid::Uuid;

use crate::webhook::PushEvent;

/// Represents one triggered run of the deployment script.
/// The id only correlates log lines; nothing about a job is persisted.
#[derive(Debug, Clone)]
pub struct DeploymentJob {
    pub id: Uuid,
    pub shell: PathBuf,
    pub script: PathBuf,
    pub git_ref: String,
    pub commit_sha: Option<String>,
}

impl DeploymentJob {
    /// Create a job for an accepted push event
    pub fn new(shell: impl Into<PathBuf>, script: impl Into<PathBuf>, event: PushEvent) -> Self {
        Self {
            id: Uuid::now_v7(),
            shell: shell.into(),
            script: script.into(),
            git_ref: event.git_ref,
            commit_sha: event.commit_sha,
        }
    }

    /// Shell command line, for logging
    pub fn command_line(&self) -> String {
        format!("{} {}", self.shell.display(), self.script.display())
    }
}

/// One of the two captured output pipes of the script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    /// Prefix put in front of every logged line
    pub fn prefix(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "--->",
            OutputStream::Stderr => "!!->",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a started script ended
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptExit {
    Success,
    /// Non-zero exit; `code` is None when the process was killed by a signal
    Failed { code: Option<i32> },
    /// Waiting on the process failed
    WaitFailed(String),
}

impl ScriptExit {
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            ScriptExit::Success
        } else {
            ScriptExit::Failed {
                code: status.code(),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScriptExit::Success)
    }
}

/// Summary of a finished run, produced once both output pipes are drained
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub exit: ScriptExit,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
    pub duration: Duration,
}
