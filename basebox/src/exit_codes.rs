//! Stable exit codes for basebox CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid configuration, missing files, unreadable VM metadata or other local errors.
pub const INVALID: i32 = 1;
/// A remote command exited nonzero and aborted the provisioning pass.
pub const REMOTE_FAILED: i32 = 2;
