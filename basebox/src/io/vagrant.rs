//! Vagrant adapter for the VM lifecycle.
//!
//! Vagrant owns the VM; we keep a small, explicit wrapper around `vagrant`
//! subprocess calls run inside the working directory.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::ProvisionConfig;
use crate::io::process::{RunOptions, run_checked};
use crate::io::remote::{Remote, SshRemote};

/// SSH client config written next to the Vagrantfile.
pub const SSH_CONFIG_FILE: &str = "ssh-config";

/// VM lifecycle operations needed for one provisioning run.
pub trait Vm {
    type Remote: Remote;

    /// Create (or resume) and boot the VM.
    fn up(&self) -> Result<()>;
    /// Open a remote session to the running VM.
    fn connect(&self) -> Result<Self::Remote>;
    fn halt(&self) -> Result<()>;
    fn destroy(&self) -> Result<()>;
}

/// Produces the packaged box from the working directory.
pub trait BoxPackager {
    /// Run `vagrant` with the given arguments (starting with `package`).
    fn package(&self, args: &[String]) -> Result<()>;
}

/// Wrapper for executing `vagrant` in a working directory.
#[derive(Debug, Clone)]
pub struct Vagrant {
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl Vagrant {
    pub fn new(workdir: impl Into<PathBuf>, config: &ProvisionConfig) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: config.command_timeout(),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    /// Output of `vagrant ssh-config`.
    pub fn ssh_config(&self) -> Result<String> {
        self.run(&["ssh-config"], false)
    }

    fn run<S: AsRef<str>>(&self, args: &[S], echo: bool) -> Result<String> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        debug!(?args, workdir = %self.workdir.display(), "vagrant");
        let mut cmd = Command::new("vagrant");
        cmd.args(&args).current_dir(&self.workdir);
        run_checked(
            cmd,
            &RunOptions {
                timeout: self.timeout,
                output_limit_bytes: self.output_limit_bytes,
                echo_label: echo.then_some("vagrant"),
            },
        )
        .with_context(|| format!("vagrant {}", args.join(" ")))
    }
}

impl Vm for Vagrant {
    type Remote = SshRemote;

    #[instrument(skip_all)]
    fn up(&self) -> Result<()> {
        info!(workdir = %self.workdir.display(), "vagrant up");
        self.run(&["up"], true)?;
        Ok(())
    }

    #[instrument(skip_all)]
    fn connect(&self) -> Result<SshRemote> {
        let config = self.ssh_config()?;
        let host = parse_ssh_host(&config)
            .ok_or_else(|| anyhow!("vagrant ssh-config printed no Host entry"))?;
        let path = self.workdir.join(SSH_CONFIG_FILE);
        fs::write(&path, &config).with_context(|| format!("write {}", path.display()))?;
        debug!(host = %host, path = %path.display(), "ssh config written");
        Ok(SshRemote::new(
            path,
            host,
            self.timeout,
            self.output_limit_bytes,
        ))
    }

    #[instrument(skip_all)]
    fn halt(&self) -> Result<()> {
        info!("vagrant halt");
        self.run(&["halt"], true)?;
        Ok(())
    }

    #[instrument(skip_all)]
    fn destroy(&self) -> Result<()> {
        info!(workdir = %self.workdir.display(), "vagrant destroy");
        self.run(&["destroy", "-f"], true)?;
        Ok(())
    }
}

impl BoxPackager for Vagrant {
    #[instrument(skip_all)]
    fn package(&self, args: &[String]) -> Result<()> {
        info!(?args, "vagrant package");
        self.run(args, true)?;
        Ok(())
    }
}

/// First `Host` alias in an ssh config.
pub fn parse_ssh_host(config: &str) -> Option<String> {
    config.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(keyword), Some(host)) if keyword.eq_ignore_ascii_case("host") => {
                Some(host.to_string())
            }
            _ => None,
        }
    })
}

/// Bring the VM up, hand its remote to `f`, then settle the VM by outcome.
///
/// On success the VM is halted so it can be packaged. On failure it is left
/// running for inspection and the error is returned unchanged.
pub fn with_session<V, T, F>(vm: &V, f: F) -> Result<T>
where
    V: Vm,
    F: FnOnce(&V::Remote) -> Result<T>,
{
    vm.up().context("bring up vm")?;
    let remote = vm.connect().context("connect to vm")?;
    match f(&remote) {
        Ok(value) => {
            vm.halt().context("halt vm")?;
            Ok(value)
        }
        Err(err) => {
            warn!("provisioning failed, leaving the vm running for inspection");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRemote, ScriptedVm};

    const SSH_CONFIG: &str = "\
Host default
  HostName 127.0.0.1
  User vagrant
  Port 2222
  IdentityFile /home/me/.vagrant.d/insecure_private_key
";

    #[test]
    fn parse_ssh_host_takes_first_host() {
        assert_eq!(parse_ssh_host(SSH_CONFIG), Some("default".to_string()));
        assert_eq!(parse_ssh_host("  User vagrant\n"), None);
    }

    #[test]
    fn session_halts_after_success() {
        let vm = ScriptedVm::new(FakeRemote::new());
        let value = with_session(&vm, |_remote| Ok(7)).expect("session");
        assert_eq!(value, 7);
        assert_eq!(vm.calls(), vec!["up", "connect", "halt"]);
    }

    #[test]
    fn session_leaves_vm_running_after_failure() {
        let vm = ScriptedVm::new(FakeRemote::new());
        let err = with_session(&vm, |_remote| -> Result<()> { Err(anyhow!("boom")) })
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(vm.calls(), vec!["up", "connect"]);
    }
}
