//! Orchestration for `basebox package`.

use std::path::{self, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::shell;
use crate::io::config::ProvisionConfig;
use crate::io::metadata::read_active_base;
use crate::io::vagrant::BoxPackager;

/// Package the active VM of the working directory into `<name>.box`.
///
/// Returns the path of the box file. Include files and the package
/// Vagrantfile are resolved against the current directory, since `vagrant`
/// runs inside the working directory. Include files that do not exist are
/// left out with a warning.
#[instrument(skip_all, fields(name = %cfg.name))]
pub fn run_package<B: BoxPackager + ?Sized>(cfg: &ProvisionConfig, packager: &B) -> Result<PathBuf> {
    let workdir = cfg.work_dir();
    let base = read_active_base(&workdir)?;

    let mut include = Vec::new();
    for file in &cfg.package_include {
        if !file.exists() {
            warn!(path = %file.display(), "package include not found, skipping");
            continue;
        }
        include.push(absolute_string(file)?);
    }
    let vagrantfile = absolute_string(&cfg.package_template)?;

    let args = shell::vagrant_package_args(
        &base,
        &cfg.box_file(),
        &include,
        &vagrantfile,
        &cfg.name,
    );
    packager.package(&args)?;

    let box_path = workdir.join(cfg.box_file());
    info!(path = %box_path.display(), base = %base, "box packaged");
    Ok(box_path)
}

fn absolute_string(path: &std::path::Path) -> Result<String> {
    let absolute =
        path::absolute(path).with_context(|| format!("resolve {}", path.display()))?;
    Ok(absolute.display().to_string())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::error::BaseboxError;
    use crate::io::metadata::METADATA_FILE;
    use crate::test_support::{RecordingPackager, TestEnv};

    #[test]
    fn packages_active_base() {
        let mut env = TestEnv::new();
        let extra = env.root().join("extra.txt");
        fs::write(&extra, "notes\n").expect("write include");
        env.config.package_include = vec![extra.clone(), env.root().join("missing.txt")];
        fs::create_dir_all(env.work_dir()).expect("mkdir");
        fs::write(
            env.work_dir().join(METADATA_FILE),
            r#"{"active":{"default":"vm-42"}}"#,
        )
        .expect("write metadata");
        let packager = RecordingPackager::default();

        let box_path = run_package(&env.config, &packager).expect("package");

        assert_eq!(box_path, env.work_dir().join("python27.box"));
        let calls = packager.calls();
        assert_eq!(calls.len(), 1);
        let args = &calls[0];
        assert_eq!(&args[..5], ["package", "--base", "vm-42", "--output", "python27.box"]);
        assert_eq!(args[5], "--include");
        assert_eq!(args[6], extra.display().to_string());
        assert_eq!(args[7], "--vagrantfile");
        assert!(path::Path::new(&args[8]).is_absolute());
        assert!(args[8].ends_with("Vagrantfile.pkg"));
        assert_eq!(args[9], "python27");
    }

    #[test]
    fn default_include_packages_config_file() {
        let env = TestEnv::new();
        fs::create_dir_all(env.work_dir()).expect("mkdir");
        fs::write(
            env.work_dir().join(METADATA_FILE),
            r#"{"active":{"default":"vm-42"}}"#,
        )
        .expect("write metadata");
        let packager = RecordingPackager::default();

        run_package(&env.config, &packager).expect("package");

        let args = &packager.calls()[0];
        assert_eq!(args[5], "--include");
        assert_eq!(args[6], env.config_file().display().to_string());
    }

    #[test]
    fn missing_active_key_does_not_package() {
        let env = TestEnv::new();
        fs::create_dir_all(env.work_dir()).expect("mkdir");
        fs::write(env.work_dir().join(METADATA_FILE), "{}").expect("write metadata");
        let packager = RecordingPackager::default();

        let err = run_package(&env.config, &packager).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BaseboxError>(),
            Some(BaseboxError::MissingMetadataKey { .. })
        ));
        assert!(packager.calls().is_empty());
    }
}
