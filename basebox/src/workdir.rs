//! Working-directory preparation before `vagrant up`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::io::config::ProvisionConfig;
use crate::io::prompt::Prompter;
use crate::io::vagrant::Vm;

/// Name the VM template is copied to inside the working directory.
pub const VAGRANTFILE: &str = "Vagrantfile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkdirOutcome {
    /// The directory did not exist.
    Fresh,
    /// The operator chose to delete the existing directory.
    Recreated { vm_destroyed: bool },
    /// The existing directory was kept.
    Reused,
}

/// Ensure the working directory exists and holds the current VM template.
///
/// An existing directory is only deleted after confirmation, and its VM is
/// only destroyed after a second confirmation. Both default to "no".
#[instrument(skip_all)]
pub fn prepare_workdir<V: Vm, P: Prompter + ?Sized>(
    cfg: &ProvisionConfig,
    vm: &V,
    prompter: &P,
) -> Result<WorkdirOutcome> {
    let dir = cfg.work_dir();
    let outcome = if dir.exists() {
        recreate_if_confirmed(&dir, vm, prompter)?
    } else {
        WorkdirOutcome::Fresh
    };

    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let target = dir.join(VAGRANTFILE);
    fs::copy(&cfg.template, &target).with_context(|| {
        format!(
            "copy VM template {} to {}",
            cfg.template.display(),
            target.display()
        )
    })?;
    info!(dir = %dir.display(), ?outcome, "working directory ready");
    Ok(outcome)
}

fn recreate_if_confirmed<V: Vm, P: Prompter + ?Sized>(
    dir: &Path,
    vm: &V,
    prompter: &P,
) -> Result<WorkdirOutcome> {
    if !prompter.confirm(&format!("{} exists, delete?", dir.display()), false)? {
        return Ok(WorkdirOutcome::Reused);
    }
    let vm_destroyed = prompter.confirm("Destroy VM too?", false)?;
    if vm_destroyed {
        vm.destroy().context("destroy existing vm")?;
    }
    fs::remove_dir_all(dir).with_context(|| format!("remove {}", dir.display()))?;
    Ok(WorkdirOutcome::Recreated { vm_destroyed })
}
