//! The idempotent action contract.
//!
//! An action probes the host with [`Action::test`] and the sequencer then
//! dispatches exactly one of [`Action::run`] (desired state already holds) or
//! [`Action::fail`] (install work needed). `test` must not change the host;
//! it may record discovered facts in the session context.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::shell;
use crate::core::step::{Op, Probe, Step};
use crate::session::Session;

pub trait Action {
    /// Unique name within one sequence.
    fn name(&self) -> &str;

    /// Whether the desired end state already holds. `Err` means the host
    /// could not be inspected, not "false".
    fn test(&self, session: &mut Session<'_>) -> Result<bool>;

    /// Routine maintenance, invoked when `test` held.
    fn run(&self, _session: &mut Session<'_>) -> Result<()> {
        Ok(())
    }

    /// Install or configure, invoked when `test` did not hold.
    fn fail(&self, _session: &mut Session<'_>) -> Result<()> {
        Ok(())
    }
}

impl Action for Step {
    fn name(&self) -> &str {
        &self.name
    }

    fn test(&self, session: &mut Session<'_>) -> Result<bool> {
        for probe in &self.probes {
            if !eval_probe(session, probe)? {
                debug!(step = %self.name, ?probe, "probe did not hold");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn run(&self, session: &mut Session<'_>) -> Result<()> {
        apply_ops(session, &self.on_run)
    }

    fn fail(&self, session: &mut Session<'_>) -> Result<()> {
        apply_ops(session, &self.on_fail)
    }
}

/// Evaluate one probe. Probes never fail on a nonzero exit.
pub fn eval_probe(session: &mut Session<'_>, probe: &Probe) -> Result<bool> {
    match probe {
        Probe::Which(command) => session.which(command),
        Probe::Succeeds { command, sudo } => session.probe(command, *sudo),
        Probe::Exists(path) => session.exists(path),
        Probe::Contains { path, text } => session.contains(path, text),
        Probe::Matches { path, pattern } => session.matches(path, pattern),
    }
}

fn apply_ops(session: &mut Session<'_>, ops: &[Op]) -> Result<()> {
    for op in ops {
        apply_op(session, op)?;
    }
    Ok(())
}

/// Apply one operation, stopping at the first failing remote command.
pub fn apply_op(session: &mut Session<'_>, op: &Op) -> Result<()> {
    match op {
        Op::Run(command) => {
            session.run(command)?;
        }
        Op::Sudo(command) => {
            session.sudo(command)?;
        }
        Op::TrySudo(command) => {
            let result = session.exec(command, true)?;
            if !result.succeeded() {
                warn!(command = %command, code = result.code, "ignoring failed command");
            }
        }
        Op::AptUpdate => session.apt_update()?,
        Op::AptInstall(packages) => session.apt_install(packages.as_slice())?,
        Op::AddAptRepository(repo) => session.add_apt_repository(repo)?,
        Op::Append { path, text, sudo } => session
            .append(path, text, *sudo)
            .with_context(|| format!("append to {path}"))?,
        Op::CommentOut { path, pattern } => session.comment_out(path, pattern)?,
        Op::RunDownloaded { url, sudo } => {
            let remote_path = session.download(url)?;
            let line = shell::bash_script(&remote_path);
            if *sudo {
                session.sudo(&line)?;
            } else {
                session.run(&line)?;
            }
        }
        Op::ResetFastInstaller => session.reset_fast_installer(),
        Op::Unless { probe, then } => {
            if eval_probe(session, probe)? {
                debug!(?probe, "already satisfied, skipping");
            } else {
                apply_ops(session, then)?;
            }
        }
    }
    Ok(())
}
