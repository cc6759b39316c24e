//! Orchestration for `basebox provision`.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::action::Action;
use crate::core::types::SequenceReport;
use crate::io::cache::DownloadCache;
use crate::io::config::ProvisionConfig;
use crate::io::prompt::Prompter;
use crate::io::vagrant::{Vm, with_session};
use crate::sequence::run_sequence;
use crate::session::{Session, SessionContext};
use crate::workdir::{WorkdirOutcome, prepare_workdir};

/// Result of a successful `basebox provision`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub workdir: WorkdirOutcome,
    pub report: SequenceReport,
}

/// Prepare the working directory, then run `actions` inside a VM session.
///
/// The VM is halted after a complete pass and left running when any action
/// fails.
#[instrument(skip_all, fields(name = %cfg.name))]
pub fn run_provision<V, P>(
    cfg: &ProvisionConfig,
    vm: &V,
    prompter: &P,
    cache: &dyn DownloadCache,
    actions: &[Box<dyn Action>],
) -> Result<ProvisionOutcome>
where
    V: Vm,
    P: Prompter + ?Sized,
{
    let workdir = prepare_workdir(cfg, vm, prompter)?;
    let mut ctx = SessionContext::new(cfg.clone());

    let report = with_session(vm, |remote| {
        let mut session = Session::new(remote, cache, &mut ctx);
        check_os_codename(&session)?;
        run_sequence(actions, &mut session)
    })?;

    info!(
        dispatched = report.records.len(),
        installed = report.failed().len(),
        "provisioning complete"
    );
    Ok(ProvisionOutcome { workdir, report })
}

/// Compare the VM's release codename with the configured one.
///
/// A mismatch or an unreadable codename is only a warning. Returns whether
/// the codename matched.
pub fn check_os_codename(session: &Session<'_>) -> Result<bool> {
    let expected = &session.config().os_codename;
    let result = session.exec("lsb_release -cs", false)?;
    if !result.succeeded() {
        warn!(code = result.code, "cannot read OS codename");
        return Ok(false);
    }
    let found = result.stdout.trim();
    if found != expected {
        warn!(expected = %expected, found, "unexpected OS release");
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRemote, StaticCache};

    #[test]
    fn codename_match() {
        let remote = FakeRemote::new().output("lsb_release", "precise\n");
        let cache = StaticCache::new("/cache");
        let mut ctx = SessionContext::new(ProvisionConfig::default());
        let session = Session::new(&remote, &cache, &mut ctx);

        assert!(check_os_codename(&session).expect("check"));
    }

    #[test]
    fn codename_mismatch_only_warns() {
        let remote = FakeRemote::new().output("lsb_release", "trusty\n");
        let cache = StaticCache::new("/cache");
        let mut ctx = SessionContext::new(ProvisionConfig::default());
        let session = Session::new(&remote, &cache, &mut ctx);

        assert!(!check_os_codename(&session).expect("check"));
    }

    #[test]
    fn unreadable_codename_only_warns() {
        let remote = FakeRemote::new().fail("lsb_release", 127);
        let cache = StaticCache::new("/cache");
        let mut ctx = SessionContext::new(ProvisionConfig::default());
        let session = Session::new(&remote, &cache, &mut ctx);

        assert!(!check_os_codename(&session).expect("check"));
    }
}
