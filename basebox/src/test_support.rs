//! Test-only fakes for the VM, the remote host, prompts and downloads.
//!
//! [`FakeRemote`] models a host as a set of named facts plus a set of
//! existing files. Rules registered on it decide how a command line is
//! answered, matched by substring in registration order.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Result, anyhow};

use crate::core::shell;
use crate::io::cache::{CachedFile, DownloadCache, Fetcher, url_file_name, url_key};
use crate::io::config::{DEFAULT_CONFIG_FILE, ProvisionConfig};
use crate::io::prompt::Prompter;
use crate::io::remote::{CommandResult, Remote, RemoteCommand};
use crate::io::vagrant::{BoxPackager, Vm};

#[derive(Debug, Clone)]
enum Rule {
    /// Exit zero iff the fact holds.
    Probe { needle: String, fact: String },
    /// Succeed and make the fact hold.
    Effect { needle: String, fact: String },
    /// Exit with `code`.
    Fail { needle: String, code: i32 },
    /// Succeed with fixed stdout.
    Output { needle: String, stdout: String },
}

impl Rule {
    fn needle(&self) -> &str {
        match self {
            Rule::Probe { needle, .. }
            | Rule::Effect { needle, .. }
            | Rule::Fail { needle, .. }
            | Rule::Output { needle, .. } => needle,
        }
    }
}

#[derive(Debug, Default)]
struct FakeHost {
    facts: HashSet<String>,
    files: HashSet<String>,
    rules: Vec<Rule>,
    commands: Vec<RemoteCommand>,
    uploads: Vec<(PathBuf, String)>,
    transport_down: bool,
}

impl FakeHost {
    fn answer(&mut self, command: &RemoteCommand) -> CommandResult {
        let line = command.line.as_str();
        if self.files.iter().any(|file| shell::test_exists(file) == line) {
            return CommandResult::success("");
        }
        let rule = self
            .rules
            .iter()
            .find(|rule| line.contains(rule.needle()))
            .cloned();
        match rule {
            Some(Rule::Probe { fact, .. }) => exit_for(self.facts.contains(&fact)),
            Some(Rule::Effect { fact, .. }) => {
                self.facts.insert(fact);
                CommandResult::success("")
            }
            Some(Rule::Fail { code, .. }) => {
                CommandResult::failure(code, format!("{line}: failed"))
            }
            Some(Rule::Output { stdout, .. }) => CommandResult::success(stdout),
            // unscripted checks fail, unscripted work succeeds
            None => exit_for(!command.quiet),
        }
    }
}

fn exit_for(ok: bool) -> CommandResult {
    if ok {
        CommandResult::success("")
    } else {
        CommandResult::failure(1, "")
    }
}

/// Scripted [`Remote`]. Clones share the same host.
#[derive(Debug, Clone, Default)]
pub struct FakeRemote {
    host: Rc<RefCell<FakeHost>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(self, rule: Rule) -> Self {
        self.host.borrow_mut().rules.push(rule);
        self
    }

    /// Commands containing `needle` succeed iff `fact` holds.
    pub fn probe(self, needle: &str, fact: &str) -> Self {
        self.rule(Rule::Probe {
            needle: needle.to_string(),
            fact: fact.to_string(),
        })
    }

    /// Commands containing `needle` succeed and make `fact` hold.
    pub fn effect(self, needle: &str, fact: &str) -> Self {
        self.rule(Rule::Effect {
            needle: needle.to_string(),
            fact: fact.to_string(),
        })
    }

    /// Commands containing `needle` exit with `code`.
    pub fn fail(self, needle: &str, code: i32) -> Self {
        self.rule(Rule::Fail {
            needle: needle.to_string(),
            code,
        })
    }

    /// Commands containing `needle` succeed printing `stdout`.
    pub fn output(self, needle: &str, stdout: &str) -> Self {
        self.rule(Rule::Output {
            needle: needle.to_string(),
            stdout: stdout.to_string(),
        })
    }

    /// Mark a remote path as existing.
    pub fn with_file(self, path: &str) -> Self {
        self.host.borrow_mut().files.insert(path.to_string());
        self
    }

    pub fn set_fact(&self, fact: &str) {
        self.host.borrow_mut().facts.insert(fact.to_string());
    }

    pub fn has_fact(&self, fact: &str) -> bool {
        self.host.borrow().facts.contains(fact)
    }

    /// Make every later `exec` fail as if ssh could not connect.
    pub fn disconnect(&self) {
        self.host.borrow_mut().transport_down = true;
    }

    /// Every command executed so far.
    pub fn commands(&self) -> Vec<RemoteCommand> {
        self.host.borrow().commands.clone()
    }

    /// Command lines executed so far, unwrapped.
    pub fn lines(&self) -> Vec<String> {
        self.host
            .borrow()
            .commands
            .iter()
            .map(|command| command.line.clone())
            .collect()
    }

    /// Commands that were not quiet probes.
    pub fn mutations(&self) -> Vec<String> {
        self.host
            .borrow()
            .commands
            .iter()
            .filter(|command| !command.quiet)
            .map(|command| command.line.clone())
            .collect()
    }

    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.host.borrow().uploads.clone()
    }

    pub fn clear_log(&self) {
        let mut host = self.host.borrow_mut();
        host.commands.clear();
        host.uploads.clear();
    }
}

impl Remote for FakeRemote {
    fn exec(&self, command: &RemoteCommand) -> Result<CommandResult> {
        let mut host = self.host.borrow_mut();
        if host.transport_down {
            return Err(anyhow!("ssh to fake host failed: connection refused"));
        }
        host.commands.push(command.clone());
        Ok(host.answer(command))
    }

    fn put(&self, local: &Path, remote_path: &str) -> Result<()> {
        let mut host = self.host.borrow_mut();
        host.uploads.push((local.to_path_buf(), remote_path.to_string()));
        host.files.insert(remote_path.to_string());
        Ok(())
    }
}

/// [`Remote`] running each rendered command in a local `sh`.
///
/// `HOME` points at `home`, so `cd ~` and `bash -l` stay inside the test
/// directory. Elevated commands are not supported.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct LocalShell {
    home: PathBuf,
}

#[cfg(unix)]
impl LocalShell {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

#[cfg(unix)]
impl Remote for LocalShell {
    fn exec(&self, command: &RemoteCommand) -> Result<CommandResult> {
        if command.sudo {
            return Err(anyhow!("local shell cannot run elevated: {}", command.line));
        }
        use crate::io::process::{RunOptions, run_command};

        let mut cmd = std::process::Command::new("sh");
        cmd.arg("-c").arg(command.render()).env("HOME", &self.home);
        let output = run_command(
            cmd,
            &RunOptions {
                timeout: std::time::Duration::from_secs(30),
                output_limit_bytes: 64 * 1024,
                echo_label: None,
            },
        )?;
        Ok(CommandResult {
            code: output.code(),
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
        })
    }

    fn put(&self, local: &Path, remote_path: &str) -> Result<()> {
        fs::copy(local, remote_path)?;
        Ok(())
    }
}

/// [`Vm`] that records lifecycle calls and hands out a [`FakeRemote`].
#[derive(Debug, Default)]
pub struct ScriptedVm {
    remote: FakeRemote,
    calls: RefCell<Vec<String>>,
}

impl ScriptedVm {
    pub fn new(remote: FakeRemote) -> Self {
        Self {
            remote,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: &str) {
        self.calls.borrow_mut().push(call.to_string());
    }
}

impl Vm for ScriptedVm {
    type Remote = FakeRemote;

    fn up(&self) -> Result<()> {
        self.record("up");
        Ok(())
    }

    fn connect(&self) -> Result<FakeRemote> {
        self.record("connect");
        Ok(self.remote.clone())
    }

    fn halt(&self) -> Result<()> {
        self.record("halt");
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.record("destroy");
        Ok(())
    }
}

/// [`Prompter`] answering from a fixed list, then with defaults.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<bool>>,
    questions: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().copied().collect()),
            questions: RefCell::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        self.questions.borrow_mut().push(message.to_string());
        Ok(self.answers.borrow_mut().pop_front().unwrap_or(default))
    }
}

/// [`BoxPackager`] that records argument lists.
#[derive(Debug, Default)]
pub struct RecordingPackager {
    calls: RefCell<Vec<Vec<String>>>,
}

impl RecordingPackager {
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl BoxPackager for RecordingPackager {
    fn package(&self, args: &[String]) -> Result<()> {
        self.calls.borrow_mut().push(args.to_vec());
        Ok(())
    }
}

/// [`Fetcher`] writing fixed contents and counting calls.
#[derive(Debug)]
pub struct CountingFetcher {
    contents: String,
    calls: Cell<usize>,
}

impl CountingFetcher {
    pub fn new(contents: &str) -> Self {
        Self {
            contents: contents.to_string(),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Fetcher for CountingFetcher {
    fn fetch(&self, _url: &str, dest: &Path) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        fs::write(dest, &self.contents)?;
        Ok(())
    }
}

/// [`DownloadCache`] that resolves paths without touching the filesystem.
#[derive(Debug, Clone)]
pub struct StaticCache {
    root: PathBuf,
}

impl StaticCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DownloadCache for StaticCache {
    fn get(&self, url: &str) -> Result<CachedFile> {
        let key = url_key(url);
        let file_name = url_file_name(url)?;
        Ok(CachedFile {
            local: self.root.join(&key).join(&file_name),
            key,
            file_name,
        })
    }
}

/// Temporary directory with a VM template and a config pointing into it.
pub struct TestEnv {
    temp: tempfile::TempDir,
    pub config: ProvisionConfig,
}

impl TestEnv {
    pub const TEMPLATE: &'static str = "Vagrant::Config.run do |config|\n  config.vm.box = \"precise64\"\nend\n";

    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let template = root.join("Vagrantfile");
        let package_template = root.join("Vagrantfile.pkg");
        fs::write(&template, Self::TEMPLATE).expect("write template");
        fs::write(&package_template, Self::TEMPLATE).expect("write package template");
        let config_file = root.join(DEFAULT_CONFIG_FILE);
        fs::write(&config_file, "").expect("write config file");

        let config = ProvisionConfig {
            work_dir: Some(root.join("work")),
            template,
            package_template,
            package_include: vec![config_file],
            cache_dir: root.join("cache"),
            ..ProvisionConfig::default()
        };
        Self { temp, config }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.config.work_dir()
    }

    pub fn config_file(&self) -> PathBuf {
        self.root().join(DEFAULT_CONFIG_FILE)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
