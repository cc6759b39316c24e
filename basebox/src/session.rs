//! One provisioning session against a running VM.
//!
//! [`Session`] bundles the remote transport, the download cache and the
//! mutable [`SessionContext`]. Actions talk to the host only through it.

use anyhow::Result;
use tracing::{debug, info};

use crate::core::shell;
use crate::core::types::FastInstaller;
use crate::io::cache::DownloadCache;
use crate::io::config::ProvisionConfig;
use crate::io::remote::{CommandResult, Remote, RemoteCommand};

/// Configuration plus the host facts discovered during a run.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub config: ProvisionConfig,
    /// Starts from the configured value; `Unknown` is resolved on first install.
    pub fast_installer: FastInstaller,
}

impl SessionContext {
    pub fn new(config: ProvisionConfig) -> Self {
        let fast_installer = config.fast_installer;
        Self {
            config,
            fast_installer,
        }
    }
}

/// Home of the remote login user, where every action starts.
pub const DEFAULT_CWD: &str = "~";

pub struct Session<'a> {
    remote: &'a dyn Remote,
    cache: &'a dyn DownloadCache,
    ctx: &'a mut SessionContext,
    cwd: Option<String>,
}

impl<'a> Session<'a> {
    pub fn new(
        remote: &'a dyn Remote,
        cache: &'a dyn DownloadCache,
        ctx: &'a mut SessionContext,
    ) -> Self {
        Self {
            remote,
            cache,
            ctx,
            cwd: Some(DEFAULT_CWD.to_string()),
        }
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.ctx.config
    }

    /// Directory remote commands start in (`None` = the login default).
    pub fn set_cwd(&mut self, dir: Option<&str>) {
        self.cwd = dir.map(str::to_string);
    }

    fn command(&self, line: impl Into<String>, sudo: bool) -> RemoteCommand {
        RemoteCommand::new(line)
            .sudo(sudo)
            .in_dir(self.cwd.as_deref())
    }

    /// Run a command and return the raw result without judging the exit code.
    pub fn exec(&self, line: &str, sudo: bool) -> Result<CommandResult> {
        self.remote.exec(&self.command(line, sudo))
    }

    fn checked(&self, line: &str, sudo: bool) -> Result<String> {
        let command = self.command(line, sudo);
        let stdout = self.remote.exec(&command)?.check(&command)?;
        Ok(stdout)
    }

    /// Run as the login user; a nonzero exit is an error.
    pub fn run(&self, line: &str) -> Result<String> {
        self.checked(line, false)
    }

    /// Run elevated; a nonzero exit is an error.
    pub fn sudo(&self, line: &str) -> Result<String> {
        self.checked(line, true)
    }

    /// Quietly run a check command and report whether it exited zero.
    pub fn probe(&self, line: &str, sudo: bool) -> Result<bool> {
        let command = self.command(line, sudo).quiet();
        let result = self.remote.exec(&command)?;
        debug!(line, ok = result.succeeded(), "probe");
        Ok(result.succeeded())
    }

    pub fn which(&self, command: &str) -> Result<bool> {
        self.probe(&shell::which(command), false)
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        self.probe(&shell::test_exists(path), false)
    }

    pub fn contains(&self, path: &str, text: &str) -> Result<bool> {
        self.probe(&shell::grep_fixed(path, text), false)
    }

    pub fn matches(&self, path: &str, pattern: &str) -> Result<bool> {
        self.probe(&shell::grep_extended(path, pattern), false)
    }

    /// Append `text` to `path` unless its first line is already there.
    ///
    /// Multi-line text is one block: it is written whole in a single command
    /// or skipped whole, so shared lines like `fi` are never dropped from it.
    pub fn append(&self, path: &str, text: &str, sudo: bool) -> Result<()> {
        let lines: Vec<&str> = text.lines().collect();
        let Some(first) = lines.first() else {
            return Ok(());
        };
        if self.probe(&shell::grep_line(path, first), sudo)? {
            debug!(path, line = *first, "already appended");
            return Ok(());
        }
        self.checked(&shell::append_lines(path, &lines), sudo)?;
        Ok(())
    }

    /// Comment out lines of `path` fully matching `pattern` (elevated).
    pub fn comment_out(&self, path: &str, pattern: &str) -> Result<()> {
        self.sudo(&shell::comment_out(path, pattern))?;
        Ok(())
    }

    /// Resolve the fast-installer fact, probing the host if it is still unknown.
    pub fn fast_installer(&mut self) -> Result<FastInstaller> {
        if self.ctx.fast_installer == FastInstaller::Unknown {
            let found = if self.which("apt-fast")? {
                FastInstaller::Enabled
            } else {
                FastInstaller::Disabled
            };
            info!(?found, "fast installer probed");
            self.ctx.fast_installer = found;
        }
        Ok(self.ctx.fast_installer)
    }

    /// Forget the fast-installer fact so the next install probes again.
    pub fn reset_fast_installer(&mut self) {
        if self.ctx.config.fast_installer == FastInstaller::Disabled {
            return;
        }
        self.ctx.fast_installer = FastInstaller::Unknown;
    }

    pub fn apt_update(&self) -> Result<()> {
        self.sudo(&shell::apt_update(self.ctx.fast_installer.apt_tool()))?;
        Ok(())
    }

    pub fn apt_install<S: AsRef<str>>(&mut self, packages: &[S]) -> Result<()> {
        let tool = self.fast_installer()?.apt_tool();
        self.sudo(&shell::apt_install(tool, packages))?;
        Ok(())
    }

    /// Add a package repository and refresh the package index.
    pub fn add_apt_repository(&self, repo: &str) -> Result<()> {
        self.sudo(&shell::add_apt_repository(repo))?;
        self.apt_update()
    }

    /// Make `url` available on the remote host and return its absolute remote path.
    ///
    /// The file comes from the local cache and is uploaded only when the
    /// mirrored remote path does not exist yet.
    pub fn download(&self, url: &str) -> Result<String> {
        let cached = self.cache.get(url)?;
        let remote_path = cached.mirrored_path(&self.ctx.config.remote_cache_root());

        if self.exists(&remote_path)? {
            debug!(remote_path, "already uploaded");
            return Ok(remote_path);
        }
        if let Some((parent, _)) = remote_path.rsplit_once('/') {
            if !parent.is_empty() && !self.exists(parent)? {
                self.run(&shell::mkdir_p(parent))?;
            }
        }
        self.remote.put(&cached.local, &remote_path)?;
        Ok(remote_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_remote_failure;
    use crate::test_support::{FakeRemote, StaticCache};

    fn context() -> SessionContext {
        SessionContext::new(ProvisionConfig::default())
    }

    #[test]
    fn commands_start_in_home_directory() {
        let remote = FakeRemote::new();
        let cache = StaticCache::new("/cache");
        let mut ctx = context();
        let session = Session::new(&remote, &cache, &mut ctx);

        session.sudo("apt-get clean").expect("sudo");
        let log = remote.commands();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].cwd.as_deref(), Some("~"));
        assert!(log[0].sudo);
    }

    #[test]
    fn checked_command_failure_is_typed() {
        let remote = FakeRemote::new().fail("gem install bundler", 1);
        let cache = StaticCache::new("/cache");
        let mut ctx = context();
        let session = Session::new(&remote, &cache, &mut ctx);

        let err = session.sudo("gem install bundler").unwrap_err();
        assert!(is_remote_failure(&err));
    }

    #[test]
    fn probe_reports_failure_without_error() {
        let remote = FakeRemote::new();
        let cache = StaticCache::new("/cache");
        let mut ctx = context();
        let session = Session::new(&remote, &cache, &mut ctx);

        assert!(!session.which("node").expect("probe"));
        assert!(remote.commands().iter().all(|command| command.quiet));
    }

    fn appended(remote: &FakeRemote) -> Vec<String> {
        remote
            .lines()
            .into_iter()
            .filter(|line| line.starts_with("printf"))
            .collect()
    }

    #[test]
    fn append_writes_block_whole_when_a_later_line_exists() {
        // a stock profile already has `fi` lines of its own
        let remote = FakeRemote::new().probe("-x -F -e fi ", "fi-present");
        remote.set_fact("fi-present");
        let cache = StaticCache::new("/cache");
        let mut ctx = context();
        let session = Session::new(&remote, &cache, &mut ctx);

        session
            .append("/home/vagrant/.profile", "if true; then\n  :\nfi\n", false)
            .expect("append");

        assert_eq!(
            appended(&remote),
            vec!["printf '%s\\n' 'if true; then' '  :' fi >> /home/vagrant/.profile"]
        );
    }

    #[test]
    fn append_skips_block_whose_first_line_exists() {
        let remote = FakeRemote::new().probe("-x -F -e 'if true; then' ", "block");
        remote.set_fact("block");
        let cache = StaticCache::new("/cache");
        let mut ctx = context();
        let session = Session::new(&remote, &cache, &mut ctx);

        session
            .append("/home/vagrant/.profile", "if true; then\nfi\n", false)
            .expect("append");

        assert!(appended(&remote).is_empty());
        assert!(remote.mutations().is_empty());
    }

    #[test]
    fn append_empty_text_does_nothing() {
        let remote = FakeRemote::new();
        let cache = StaticCache::new("/cache");
        let mut ctx = context();
        let session = Session::new(&remote, &cache, &mut ctx);

        session.append("/etc/apt/sources.list", "", true).expect("append");
        assert!(remote.lines().is_empty());
    }

    #[test]
    fn apt_install_probes_fast_installer_once() {
        let remote = FakeRemote::new().probe("which apt-fast", "apt-fast");
        remote.set_fact("apt-fast");
        let cache = StaticCache::new("/cache");
        let mut ctx = context();
        let mut session = Session::new(&remote, &cache, &mut ctx);

        session.apt_install(&["curl"]).expect("install");
        session.apt_install(&["vim"]).expect("install");

        let lines = remote.lines();
        assert_eq!(
            lines.iter().filter(|line| *line == "which apt-fast").count(),
            1
        );
        assert!(lines.iter().any(|line| line.ends_with("apt-fast install -y -q --force-yes vim")));
        assert_eq!(ctx.fast_installer, FastInstaller::Enabled);
    }

    #[test]
    fn apt_update_uses_apt_get_until_resolved() {
        let remote = FakeRemote::new();
        let cache = StaticCache::new("/cache");
        let mut ctx = context();
        let session = Session::new(&remote, &cache, &mut ctx);

        session.apt_update().expect("update");
        assert_eq!(remote.lines(), vec!["apt-get -q update"]);
    }

    #[test]
    fn reset_keeps_pinned_disabled() {
        let remote = FakeRemote::new();
        let cache = StaticCache::new("/cache");
        let mut ctx = SessionContext::new(ProvisionConfig {
            fast_installer: FastInstaller::Disabled,
            ..ProvisionConfig::default()
        });
        let mut session = Session::new(&remote, &cache, &mut ctx);

        session.reset_fast_installer();
        assert_eq!(session.fast_installer().expect("fact"), FastInstaller::Disabled);
        assert!(remote.lines().is_empty());
    }

    #[test]
    fn download_uploads_only_when_missing() {
        let remote = FakeRemote::new();
        let cache = StaticCache::new("/cache");
        let mut ctx = context();
        let session = Session::new(&remote, &cache, &mut ctx);

        let url = "http://xrl.us/pythonbrewinstall";
        let first = session.download(url).expect("download");
        let second = session.download(url).expect("download");

        assert_eq!(first, second);
        assert!(first.starts_with("/home/vagrant/.provision/cache/"));
        assert!(first.ends_with("/pythonbrewinstall"));
        assert_eq!(remote.uploads().len(), 1);
        assert_eq!(
            remote
                .lines()
                .iter()
                .filter(|line| line.starts_with("mkdir -p"))
                .count(),
            1
        );
    }
}
