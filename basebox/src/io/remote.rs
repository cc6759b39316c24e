//! Remote command execution on the provisioned VM.
//!
//! The [`Remote`] trait decouples provisioning logic from the transport.
//! Production uses [`SshRemote`] (the `ssh`/`scp` binaries driven by the
//! config file `vagrant ssh-config` prints); tests use a scripted fake host.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::shell;
use crate::error::BaseboxError;
use crate::io::process::{RunOptions, run_checked, run_command};

/// A shell command line to run on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// The command as the action wrote it, before login-shell wrapping.
    pub line: String,
    pub sudo: bool,
    /// Suppress echoing output to the operator's terminal.
    pub quiet: bool,
    /// Directory to `cd` into first (`~` allowed).
    pub cwd: Option<String>,
}

impl RemoteCommand {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            sudo: false,
            quiet: false,
            cwd: None,
        }
    }

    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn in_dir(mut self, dir: Option<&str>) -> Self {
        self.cwd = dir.map(str::to_string);
        self
    }

    /// The full line handed to the remote login shell.
    pub fn render(&self) -> String {
        shell::wrap(&self.line, self.sudo, self.cwd.as_deref())
    }
}

/// Result of a remote command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code, or -1 when killed by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.code == 0
    }

    /// Turn a nonzero exit into [`BaseboxError::RemoteCommandFailed`]. Returns stdout.
    pub fn check(self, command: &RemoteCommand) -> std::result::Result<String, BaseboxError> {
        if self.succeeded() {
            return Ok(self.stdout);
        }
        Err(BaseboxError::RemoteCommandFailed {
            command: command.line.clone(),
            code: self.code,
            stderr: self.stderr,
        })
    }
}

/// Abstraction over the transport to the VM.
///
/// `exec` returns `Err` only when the command could not be run at all
/// (transport failure). A nonzero exit is an `Ok(CommandResult)` that the
/// caller either checks or treats as a probe answer.
pub trait Remote {
    fn exec(&self, command: &RemoteCommand) -> Result<CommandResult>;

    /// Copy a local file to `remote_path` (`~/` allowed). The parent must exist.
    fn put(&self, local: &Path, remote_path: &str) -> Result<()>;
}

/// SSH exit status reserved for connection and protocol errors.
const SSH_TRANSPORT_ERROR: i32 = 255;

/// [`Remote`] backed by the system `ssh` and `scp` binaries.
#[derive(Debug, Clone)]
pub struct SshRemote {
    ssh_config: PathBuf,
    host: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl SshRemote {
    pub fn new(
        ssh_config: impl Into<PathBuf>,
        host: impl Into<String>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            ssh_config: ssh_config.into(),
            host: host.into(),
            timeout,
            output_limit_bytes,
        }
    }
}

impl Remote for SshRemote {
    #[instrument(skip_all, fields(host = %self.host, sudo = command.sudo))]
    fn exec(&self, command: &RemoteCommand) -> Result<CommandResult> {
        if command.quiet {
            debug!(line = %command.line, "remote exec");
        } else {
            info!(line = %command.line, sudo = command.sudo, "remote exec");
        }

        let mut cmd = Command::new("ssh");
        cmd.arg("-F")
            .arg(&self.ssh_config)
            .arg("-o")
            .arg("BatchMode=yes")
            .arg(&self.host)
            .arg(command.render());

        let label = self.host.clone();
        let output = run_command(
            cmd,
            &RunOptions {
                timeout: self.timeout,
                output_limit_bytes: self.output_limit_bytes,
                echo_label: (!command.quiet).then_some(label.as_str()),
            },
        )
        .with_context(|| format!("ssh {}", self.host))?;

        if output.timed_out {
            return Err(anyhow!(
                "remote command timed out after {}s: {}",
                self.timeout.as_secs(),
                command.line
            ));
        }
        let code = output.code();
        if code == SSH_TRANSPORT_ERROR {
            warn!(host = %self.host, "ssh transport error");
            return Err(anyhow!(
                "ssh to {} failed: {}",
                self.host,
                output.stderr_lossy().trim()
            ));
        }
        Ok(CommandResult {
            code,
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
        })
    }

    #[instrument(skip_all, fields(host = %self.host, remote_path = %remote_path))]
    fn put(&self, local: &Path, remote_path: &str) -> Result<()> {
        info!(local = %local.display(), remote_path, "uploading");
        let mut cmd = Command::new("scp");
        cmd.arg("-F")
            .arg(&self.ssh_config)
            .arg("-q")
            .arg(local)
            .arg(scp_target(&self.host, remote_path));
        run_checked(
            cmd,
            &RunOptions {
                timeout: self.timeout,
                output_limit_bytes: self.output_limit_bytes,
                echo_label: None,
            },
        )
        .with_context(|| format!("upload {} to {}", local.display(), remote_path))?;
        Ok(())
    }
}

/// scp resolves relative paths against the login user's home, so `~/` is dropped.
fn scp_target(host: &str, remote_path: &str) -> String {
    let path = remote_path.strip_prefix("~/").unwrap_or(remote_path);
    format!("{host}:{path}")
}
