//! Operator confirmation prompts.

use anyhow::{Context, Result};
use tracing::info;

/// Asks the operator yes/no questions.
pub trait Prompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;
}

/// Interactive terminal prompts.
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        inquire::Confirm::new(message)
            .with_default(default)
            .prompt()
            .with_context(|| format!("prompt: {message}"))
    }
}

/// Answers every question with its default (for unattended runs).
pub struct DefaultPrompter;

impl Prompter for DefaultPrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        info!(message, default, "non-interactive, using default answer");
        Ok(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompter_returns_default() {
        assert!(!DefaultPrompter.confirm("delete?", false).expect("confirm"));
        assert!(DefaultPrompter.confirm("keep?", true).expect("confirm"));
    }
}
