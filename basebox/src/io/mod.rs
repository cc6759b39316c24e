//! Side-effecting adapters: local processes, the VM, the remote host, files.
//!
//! Keep I/O concerns here so `crate::core` stays pure and easy to test.

pub mod cache;
pub mod config;
pub mod metadata;
pub mod process;
pub mod prompt;
pub mod remote;
pub mod vagrant;
