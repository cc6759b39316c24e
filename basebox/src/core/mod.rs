//! Deterministic, pure logic shared by the provisioning commands.
//!
//! Core modules must be free of I/O side effects. They build strings and data
//! structures and are tested in isolation.

pub mod shell;
pub mod step;
pub mod types;
