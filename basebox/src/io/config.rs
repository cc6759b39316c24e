//! Provisioning configuration stored in `basebox.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::FastInstaller;

pub const DEFAULT_CONFIG_FILE: &str = "basebox.toml";

/// Process-wide defaults for one provisioning run.
///
/// Missing fields default to the values the base box has always been built
/// with. Fields left as `None` are derived from other fields; use the
/// accessor methods rather than reading them directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Box name; also names the output `<name>.box`.
    pub name: String,
    /// Local working directory holding the VM. Defaults to `/tmp/<name>`.
    pub work_dir: Option<PathBuf>,
    /// Vagrantfile copied into the working directory before `vagrant up`.
    pub template: PathBuf,
    /// Vagrantfile embedded into the packaged box.
    pub package_template: PathBuf,
    /// Extra files embedded into the packaged box. Defaults to the config
    /// file, so a packaged box records how it was built.
    pub package_include: Vec<PathBuf>,

    /// Local download cache. A leading `~` is expanded.
    pub cache_dir: PathBuf,
    /// Mirror of the download cache on the VM.
    pub remote_cache_dir: String,

    pub fast_installer: FastInstaller,

    pub python_version: String,
    /// Defaults to the pythonbrew install location for `python_version`.
    pub python_bin: Option<String>,
    pub pythonbrew_url: String,

    pub remote_home: String,
    /// Shell profile that persists environment changes. Defaults to `<remote_home>/.profile`.
    pub profile_path: Option<String>,
    /// Expected `lsb_release -cs` of the VM.
    pub os_codename: String,

    /// Per local command (vagrant, ssh, scp, curl) wall-clock limit.
    pub command_timeout_secs: u64,
    /// Truncate captured command output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            name: "python27".to_string(),
            work_dir: None,
            template: PathBuf::from("Vagrantfile"),
            package_template: PathBuf::from("Vagrantfile.pkg"),
            package_include: vec![PathBuf::from(DEFAULT_CONFIG_FILE)],
            cache_dir: PathBuf::from("~/.fragrant/cache"),
            remote_cache_dir: "~/.provision/cache".to_string(),
            fast_installer: FastInstaller::Unknown,
            python_version: "2.7.2".to_string(),
            python_bin: None,
            pythonbrew_url: "http://xrl.us/pythonbrewinstall".to_string(),
            remote_home: "/home/vagrant".to_string(),
            profile_path: None,
            os_codename: "precise".to_string(),
            command_timeout_secs: 60 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl ProvisionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.name.contains('/') {
            return Err(anyhow!("name must be non-empty and contain no '/'"));
        }
        if self.python_version.trim().is_empty() {
            return Err(anyhow!("python_version must be non-empty"));
        }
        let remote_cache = self.remote_cache_dir.trim().trim_end_matches('/');
        if remote_cache.is_empty() || remote_cache == "~" {
            // cleanup removes this directory recursively
            return Err(anyhow!(
                "remote_cache_dir must name a dedicated directory, got {:?}",
                self.remote_cache_dir
            ));
        }
        if !self.remote_home.starts_with('/') {
            return Err(anyhow!("remote_home must be an absolute path"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("/tmp").join(&self.name))
    }

    pub fn python_bin(&self) -> String {
        self.python_bin.clone().unwrap_or_else(|| {
            format!(
                "/usr/local/pythonbrew/pythons/Python-{}/bin",
                self.python_version
            )
        })
    }

    pub fn python(&self) -> String {
        format!("{}/python", self.python_bin())
    }

    pub fn pip(&self) -> String {
        format!("{}/pip", self.python_bin())
    }

    pub fn profile_path(&self) -> String {
        self.profile_path.clone().unwrap_or_else(|| {
            format!("{}/.profile", self.remote_home.trim_end_matches('/'))
        })
    }

    /// `remote_cache_dir` with a leading `~` replaced by `remote_home`.
    ///
    /// Scripts under it run through `sudo`, where `~` may be root's home.
    pub fn remote_cache_root(&self) -> String {
        let home = self.remote_home.trim_end_matches('/');
        match self.remote_cache_dir.strip_prefix("~/") {
            Some(rest) => format!("{home}/{rest}"),
            None => self.remote_cache_dir.clone(),
        }
    }

    pub fn box_file(&self) -> String {
        format!("{}.box", self.name)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Local cache directory with `~` expanded.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        expand_home(&self.cache_dir)
    }

    /// Copy with every derived field filled in.
    pub fn resolved(&self) -> Result<Self> {
        Ok(Self {
            work_dir: Some(self.work_dir()),
            python_bin: Some(self.python_bin()),
            profile_path: Some(self.profile_path()),
            cache_dir: self.cache_dir()?,
            ..self.clone()
        })
    }
}

/// Expand a leading `~` to the local user's home directory.
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = home::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(rest))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ProvisionConfig::default()`.
pub fn load_config(path: &Path) -> Result<ProvisionConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        let cfg = ProvisionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ProvisionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Render config as TOML.
pub fn render_config(cfg: &ProvisionConfig) -> Result<String> {
    toml::to_string_pretty(cfg).context("serialize config toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ProvisionConfig::default());
    }

    #[test]
    fn defaults_derive_paths() {
        let cfg = ProvisionConfig::default();
        assert_eq!(cfg.work_dir(), PathBuf::from("/tmp/python27"));
        assert_eq!(
            cfg.python_bin(),
            "/usr/local/pythonbrew/pythons/Python-2.7.2/bin"
        );
        assert_eq!(
            cfg.pip(),
            "/usr/local/pythonbrew/pythons/Python-2.7.2/bin/pip"
        );
        assert_eq!(cfg.profile_path(), "/home/vagrant/.profile");
        assert_eq!(cfg.box_file(), "python27.box");
        assert_eq!(cfg.remote_cache_root(), "/home/vagrant/.provision/cache");
        assert_eq!(cfg.package_include, vec![PathBuf::from("basebox.toml")]);
    }

    #[test]
    fn remote_cache_root_follows_remote_home() {
        let cfg = ProvisionConfig {
            remote_home: "/home/ubuntu/".to_string(),
            ..ProvisionConfig::default()
        };
        assert_eq!(cfg.remote_cache_root(), "/home/ubuntu/.provision/cache");

        let absolute = ProvisionConfig {
            remote_cache_dir: "/var/cache/provision".to_string(),
            ..ProvisionConfig::default()
        };
        assert_eq!(absolute.remote_cache_root(), "/var/cache/provision");
    }

    #[test]
    fn package_include_can_be_emptied() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("basebox.toml");
        fs::write(&path, "package_include = []\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert!(cfg.package_include.is_empty());
    }

    #[test]
    fn partial_file_overrides_and_rederives() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("basebox.toml");
        fs::write(
            &path,
            "name = \"py3\"\npython_version = \"3.2.1\"\nremote_home = \"/home/ubuntu\"\nfast_installer = \"disabled\"\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.name, "py3");
        assert_eq!(cfg.fast_installer, FastInstaller::Disabled);
        assert_eq!(cfg.work_dir(), PathBuf::from("/tmp/py3"));
        assert_eq!(
            cfg.python_bin(),
            "/usr/local/pythonbrew/pythons/Python-3.2.1/bin"
        );
        assert_eq!(cfg.profile_path(), "/home/ubuntu/.profile");
    }

    #[test]
    fn explicit_derived_fields_win() {
        let cfg = ProvisionConfig {
            python_bin: Some("/opt/python/bin".to_string()),
            profile_path: Some("/home/vagrant/.bashrc".to_string()),
            ..ProvisionConfig::default()
        };
        assert_eq!(cfg.python(), "/opt/python/bin/python");
        assert_eq!(cfg.profile_path(), "/home/vagrant/.bashrc");
    }

    #[test]
    fn validate_rejects_home_as_remote_cache() {
        let cfg = ProvisionConfig {
            remote_cache_dir: "~/".to_string(),
            ..ProvisionConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("remote_cache_dir"));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("basebox.toml");
        fs::write(&path, "command_timeout_secs = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("command_timeout_secs"));
    }

    #[test]
    fn expand_home_leaves_other_paths() {
        let plain = expand_home(Path::new("/var/cache")).expect("expand");
        assert_eq!(plain, PathBuf::from("/var/cache"));
        let expanded = expand_home(Path::new("~/.fragrant/cache")).expect("expand");
        assert!(expanded.ends_with(".fragrant/cache"));
        assert!(!expanded.starts_with("~"));
    }

    #[test]
    fn resolved_config_renders_derived_fields() {
        let cfg = ProvisionConfig {
            cache_dir: PathBuf::from("/var/cache/basebox"),
            ..ProvisionConfig::default()
        };
        let rendered = render_config(&cfg.resolved().expect("resolve")).expect("render");
        assert!(rendered.contains("work_dir = \"/tmp/python27\""));
        assert!(rendered.contains("profile_path = \"/home/vagrant/.profile\""));
        let parsed: ProvisionConfig = toml::from_str(&rendered).expect("parse");
        assert_eq!(parsed.python_bin(), cfg.python_bin());
    }
}
