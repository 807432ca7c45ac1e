//! Workspace base error type and the tier-1 validation log.
//!
//! Errors come in two tiers:
//!
//! 1. **Validation**: problems found while checking topology, road
//!    parameters, profiles, and controller wiring.  These are *accumulated*
//!    into a [`ValidationLog`] and never raised one by one; a non-empty log
//!    fails initialization as a whole, before any simulation step runs.
//! 2. **Runtime**: a single failure raised synchronously when an operation
//!    cannot proceed.  Each crate has its own enum for these; they all roll
//!    up into `ctm_sim::SimError` and abort the run.

use std::fmt;

use thiserror::Error;

/// The base error type for `ctm-core` and a common variant for sub-crates.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed:\n{0}")]
    Validation(ValidationLog),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Shorthand result type for `ctm-core`.
pub type CoreResult<T> = Result<T, CoreError>;

// ── ValidationLog ─────────────────────────────────────────────────────────────

/// Accumulated tier-1 validation errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationLog {
    errors: Vec<String>,
}

impl ValidationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Move every error of `other` into `self`.
    pub fn absorb(&mut self, other: ValidationLog) {
        self.errors.extend(other.errors);
    }

    /// `Ok(())` when empty, otherwise the whole log as one error.
    pub fn into_result(self) -> CoreResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {}) {e}", i + 1)?;
        }
        Ok(())
    }
}
