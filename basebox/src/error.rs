//! Typed errors that callers branch on.
//!
//! Everything else travels as `anyhow::Error` with context attached. These
//! variants exist so the CLI (and tests) can tell a failed remote command or
//! a metadata lookup apart from generic I/O trouble via `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BaseboxError {
    /// A checked remote command exited nonzero.
    #[error("remote command failed with exit code {code}: {command}{}", format_stderr(.stderr))]
    RemoteCommandFailed {
        command: String,
        /// Exit code, or -1 when the command was killed by a signal.
        code: i32,
        stderr: String,
    },

    /// VM metadata parsed but the expected key is absent.
    #[error("missing key `{key}` in VM metadata {}", .path.display())]
    MissingMetadataKey { path: PathBuf, key: String },
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}

/// Returns true if any error in the chain is a failed remote command.
pub fn is_remote_failure(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<BaseboxError>(),
            Some(BaseboxError::RemoteCommandFailed { .. })
        )
    })
}
