//! Shared types for sequencing and reporting.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether `apt-fast` should be used in place of `apt-get`.
///
/// Configured up front, and also a discovered host fact: `Unknown` is resolved
/// by probing the host the first time a package is installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FastInstaller {
    #[default]
    Unknown,
    Enabled,
    Disabled,
}

impl FastInstaller {
    /// Package tool to invoke for this setting. `Unknown` falls back to `apt-get`.
    pub fn apt_tool(self) -> &'static str {
        match self {
            FastInstaller::Enabled => "apt-fast",
            FastInstaller::Unknown | FastInstaller::Disabled => "apt-get",
        }
    }
}

/// Which half of an action's contract the sequencer dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// `test()` held; routine maintenance ran.
    Run,
    /// `test()` did not hold; the install work ran.
    Fail,
}

impl Branch {
    pub fn from_test(passed: bool) -> Self {
        if passed { Branch::Run } else { Branch::Fail }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Run => f.write_str("run"),
            Branch::Fail => f.write_str("fail"),
        }
    }
}

/// One dispatched action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub name: String,
    pub branch: Branch,
}

/// Outcome of a complete sequence pass, in dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceReport {
    pub records: Vec<ActionRecord>,
}

impl SequenceReport {
    pub fn push(&mut self, name: &str, branch: Branch) {
        self.records.push(ActionRecord {
            name: name.to_string(),
            branch,
        });
    }

    pub fn branch_of(&self, name: &str) -> Option<Branch> {
        self.records
            .iter()
            .find(|record| record.name == name)
            .map(|record| record.branch)
    }

    /// Names of actions whose install work ran, in order.
    pub fn failed(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|record| record.branch == Branch::Fail)
            .map(|record| record.name.as_str())
            .collect()
    }
}
