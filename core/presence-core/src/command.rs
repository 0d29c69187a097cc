//! Bounded execution of external commands.
//!
//! Inventory queries and control-script calls are short-lived utilities, but a
//! wedged child must never stall the controller loop, so every call carries a
//! timeout. A timed-out child is killed and reaped.

use crate::error::{PresenceError, Result};
use crossbeam_channel::{bounded, Receiver};
use serde::Deserialize;
use std::fmt;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);
// Grace period for draining pipes after the child exits. A detached grandchild
// can keep the pipe open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// A program and its arguments, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout as text, failing on a non-zero exit or non-UTF-8 bytes.
    pub fn into_text(self, spec: &CommandSpec) -> Result<String> {
        if !self.success() {
            return Err(PresenceError::CommandFailed {
                command: spec.to_string(),
                details: self.failure_details(),
            });
        }
        String::from_utf8(self.stdout).map_err(|_| PresenceError::InvalidOutput {
            command: spec.to_string(),
        })
    }

    /// Combined stdout and stderr, lossily decoded, for log lines.
    pub fn combined_lossy(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&self.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr);
        }
        text
    }

    fn failure_details(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = String::from_utf8_lossy(&self.stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            status
        } else {
            format!("{}: {}", status, stderr)
        }
    }
}

/// Process launcher seam. The controller only ever calls this from its own
/// thread, so implementations need not be `Sync`.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<CommandOutput>;
}

/// Runs commands with `std::process`, polling the child until it exits or the
/// timeout elapses.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<CommandOutput> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PresenceError::Spawn {
                command: spec.to_string(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let deadline = Instant::now() + timeout;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(PresenceError::Timeout {
                        command: spec.to_string(),
                        timeout,
                    });
                }
                Ok(None) => thread::sleep(WAIT_POLL_INTERVAL),
                Err(source) => {
                    let _ = child.kill();
                    return Err(PresenceError::Io {
                        context: format!("waiting for {}", spec),
                        source,
                    });
                }
            }
        };

        let drain_deadline = Instant::now() + DRAIN_GRACE;
        Ok(CommandOutput {
            code: status.code(),
            stdout: stdout.recv_deadline(drain_deadline).unwrap_or_default(),
            stderr: stderr.recv_deadline(drain_deadline).unwrap_or_default(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = bounded(1);
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
    } else {
        let _ = tx.send(Vec::new());
    }
    rx
}
