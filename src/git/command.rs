//! Running the git executable with streamed output

use gitlines::{LineListener, OutputStream};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::progress::CancellationToken;

/// A git invocation: subcommand, arguments and extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommand {
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl GitCommand {
    pub fn new(subcommand: &str) -> Self {
        Self {
            args: vec![subcommand.to_string()],
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// The subcommand, e.g. `rebase`
    pub fn subcommand(&self) -> &str {
        &self.args[0]
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn environment(&self) -> &[(String, String)] {
        &self.envs
    }
}

impl fmt::Display for GitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "git {}", self.args.join(" "))
    }
}

/// Exit status and captured output of a finished git command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    pub output: Vec<String>,
    pub error_output: Vec<String>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Error output joined into one message, falling back to stdout
    pub fn error_text(&self) -> String {
        let lines = if self.error_output.is_empty() {
            &self.output
        } else {
            &self.error_output
        };
        lines.join("\n")
    }
}

/// Splits a byte stream into segments on `\n` and `\r`
#[derive(Default)]
struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' || b == b'\r' {
                if !self.pending.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            } else {
                self.pending.push(b);
            }
        }
        lines
    }

    fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            Some(line)
        }
    }
}

fn emit(
    line: String,
    stream: OutputStream,
    listeners: &mut [&mut (dyn LineListener + Send)],
    result: &mut CommandResult,
) {
    if line.trim().is_empty() {
        return;
    }
    debug!(target: "forksync::git::output", "{:?}: {}", stream, line);
    gitlines::dispatch(&line, stream, listeners);
    match stream {
        OutputStream::Stdout => result.output.push(line),
        OutputStream::Stderr => result.error_output.push(line),
    }
}

async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    reader.read(buf).await
}

/// Run `command` in `dir`, feeding every output line to `listeners`
///
/// The child is killed when `cancel` fires; the call then returns
/// [`Error::Cancelled`].
pub async fn run_git(
    git: &str,
    dir: &Path,
    command: &GitCommand,
    listeners: &mut [&mut (dyn LineListener + Send)],
    cancel: &CancellationToken,
) -> Result<CommandResult> {
    cancel.check()?;
    debug!(dir = %dir.display(), "Running {}", command);

    let mut child = Command::new(git)
        .args(command.arguments())
        .current_dir(dir)
        // Detectors match English messages; never block on a credential prompt
        .env("LC_ALL", "C")
        .env("LANGUAGE", "C")
        .env("GIT_TERMINAL_PROMPT", "0")
        .envs(command.environment().iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| Error::GitSpawn {
            command: command.to_string(),
            source,
        })?;

    let mut stdout = child.stdout.take().ok_or_else(|| Error::GitError {
        message: format!("no stdout for {command}"),
        source: None,
    })?;
    let mut stderr = child.stderr.take().ok_or_else(|| Error::GitError {
        message: format!("no stderr for {command}"),
        source: None,
    })?;

    let mut result = CommandResult::default();
    let mut out_split = LineSplitter::default();
    let mut err_split = LineSplitter::default();
    let mut out_buf = [0u8; 8192];
    let mut err_buf = [0u8; 8192];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = read_chunk(&mut stdout, &mut out_buf), if out_open => {
                let n = read?;
                if n == 0 {
                    out_open = false;
                    if let Some(line) = out_split.flush() {
                        emit(line, OutputStream::Stdout, listeners, &mut result);
                    }
                } else {
                    for line in out_split.push(&out_buf[..n]) {
                        emit(line, OutputStream::Stdout, listeners, &mut result);
                    }
                }
            }
            read = read_chunk(&mut stderr, &mut err_buf), if err_open => {
                let n = read?;
                if n == 0 {
                    err_open = false;
                    if let Some(line) = err_split.flush() {
                        emit(line, OutputStream::Stderr, listeners, &mut result);
                    }
                } else {
                    for line in err_split.push(&err_buf[..n]) {
                        emit(line, OutputStream::Stderr, listeners, &mut result);
                    }
                }
            }
            _ = cancel.cancelled() => {
                debug!("Killing {}", command);
                let _ = child.kill().await;
                return Err(Error::Cancelled);
            }
        }
    }

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            return Err(Error::Cancelled);
        }
    };

    result.exit_code = status.code();
    gitlines::finish(result.exit_code, listeners);
    debug!(exit_code = ?result.exit_code, "Finished {}", command);
    Ok(result)
}
