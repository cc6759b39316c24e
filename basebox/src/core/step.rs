//! Declarative provisioning steps.
//!
//! A [`Step`] is plain data: probes that decide whether the host is already
//! in the desired state, plus the operations for each branch. The generic
//! executor lives in [`crate::action`].

/// A side-effect-free check against the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// `which <command>` succeeds.
    Which(String),
    /// An arbitrary command exits zero.
    Succeeds { command: String, sudo: bool },
    /// The remote path exists.
    Exists(String),
    /// The file contains `text` (fixed string).
    Contains { path: String, text: String },
    /// The file matches an extended regular expression.
    Matches { path: String, pattern: String },
}

/// A host-mutating operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Run(String),
    Sudo(String),
    /// Elevated command whose failure is logged and ignored.
    TrySudo(String),
    AptUpdate,
    AptInstall(Vec<String>),
    AddAptRepository(String),
    /// Append each line of `text` that the file does not already contain.
    Append { path: String, text: String, sudo: bool },
    /// Comment out every line fully matching `pattern` (elevated `sed -r`).
    CommentOut { path: String, pattern: String },
    /// Fetch `url` through the download cache and run it with `bash`.
    RunDownloaded { url: String, sudo: bool },
    /// Forget the discovered fast-installer fact so it is probed again.
    ResetFastInstaller,
    /// Run `then` only if `probe` does not hold.
    Unless { probe: Probe, then: Vec<Op> },
}

/// A named provisioning step.
///
/// The step passes its test when every probe holds; a step without probes
/// always passes and only does `on_run` work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub probes: Vec<Probe>,
    pub on_run: Vec<Op>,
    pub on_fail: Vec<Op>,
}

impl Step {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            probes: Vec::new(),
            on_run: Vec::new(),
            on_fail: Vec::new(),
        }
    }

    pub fn probe(mut self, probe: Probe) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn on_run(mut self, op: Op) -> Self {
        self.on_run.push(op);
        self
    }

    pub fn on_fail(mut self, op: Op) -> Self {
        self.on_fail.push(op);
        self
    }
}

impl Probe {
    pub fn which(command: impl Into<String>) -> Self {
        Probe::Which(command.into())
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Probe::Exists(path.into())
    }

    pub fn contains(path: impl Into<String>, text: impl Into<String>) -> Self {
        Probe::Contains {
            path: path.into(),
            text: text.into(),
        }
    }
}

impl Op {
    pub fn sudo(command: impl Into<String>) -> Self {
        Op::Sudo(command.into())
    }

    pub fn run(command: impl Into<String>) -> Self {
        Op::Run(command.into())
    }

    pub fn install<S: AsRef<str>>(packages: &[S]) -> Self {
        Op::AptInstall(packages.iter().map(|p| p.as_ref().to_string()).collect())
    }
}
