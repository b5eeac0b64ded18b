//! Cross-process queue handoff
//!
//! Some runners exit before asynchronous work finishes. The queue is then
//! written into the stdin of a detached `testrelay flush --snapshot -`
//! process which completes delivery on its own.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::info;

use crate::error::{Error, Result};
use crate::snapshot::QueueSnapshot;

/// Overrides the flush binary location
pub const ENV_FLUSH_BIN: &str = "TESTRELAY_BIN";

/// How to launch the process that finishes delivery
#[derive(Debug, Clone)]
pub struct HandoffCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl HandoffCommand {
    /// `<program> flush --snapshot -`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec!["flush".into(), "--snapshot".into(), "-".into()],
            envs: Vec::new(),
        }
    }

    /// Use `$TESTRELAY_BIN`, or `testrelay` from `PATH`
    pub fn from_env() -> Self {
        let program = std::env::var_os(ENV_FLUSH_BIN)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("testrelay"));
        Self::new(program)
    }

    /// Replace the argument list
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Spawn the child and stream the snapshot into its stdin.
    ///
    /// The child inherits the environment (credentials included) and is not
    /// waited on; dropping the returned handle leaves it running.
    ///
    /// Writing the snapshot is blocking I/O: a payload larger than the pipe
    /// buffer blocks until the child reads it. From async code call this
    /// through `tokio::task::spawn_blocking`.
    pub fn spawn(&self, snapshot: &QueueSnapshot) -> Result<Child> {
        let payload = snapshot.to_json()?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Error::Handoff(format!("failed to spawn {}: {}", self.program.display(), e))
            })?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| Error::Handoff("child stdin unavailable".to_string()))?;
            stdin.write_all(payload.as_bytes())?;
        }

        info!(
            "Handed {} queued event(s) to {} (pid {})",
            snapshot.len(),
            self.program.display(),
            child.id()
        );
        Ok(child)
    }
}
