//! Build and package a reusable Vagrant base box.
//!
//! Provisioning is a fixed, ordered list of idempotent actions run against a
//! freshly created virtual machine. Each action probes the host (`test`) and
//! then either performs routine maintenance (`run`) or installs what is
//! missing (`fail`). The architecture mirrors that split:
//!
//! - **[`core`]**: Pure data and string building (step tables, shell commands,
//!   report types). No I/O.
//! - **[`io`]**: Side-effecting adapters (local processes, SSH, Vagrant, the
//!   download cache, configuration, prompts). Each sits behind a trait so the
//!   orchestration can be driven by scripted fakes in tests.
//!
//! Orchestration modules ([`sequence`], [`provision`], [`package`],
//! [`workdir`]) coordinate the two to implement the CLI commands.

pub mod action;
pub mod catalog;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod package;
pub mod provision;
pub mod sequence;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workdir;
