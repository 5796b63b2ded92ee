//! Integrity failures and their collection
//!
//! Indexing reports every problem it finds to a [`FailureCollector`]. In
//! fail-fast mode the first report aborts indexing; otherwise reports are
//! gathered so a user sees all problems of a document at once.

use crate::error::Error;
use serde::Serialize;
use std::fmt;

/// What kind of integrity problem a failure describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A resource defined more than once.
    Duplicate,
    /// A reference to a resource that does not exist.
    MissingReference,
    /// A binding whose routing key or arguments are illegal for its source exchange.
    IllegalBinding,
}

/// One integrity problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    /// Sources involved, for duplicates across documents.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl Failure {
    pub fn duplicate(message: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            kind: FailureKind::Duplicate,
            message: message.into(),
            sources,
        }
    }

    pub fn missing(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::MissingReference,
            message: message.into(),
            sources: Vec::new(),
        }
    }

    pub fn illegal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::IllegalBinding,
            message: message.into(),
            sources: Vec::new(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        match failure.kind {
            FailureKind::Duplicate => Error::DuplicateResource {
                message: failure.message,
                sources: failure.sources,
            },
            FailureKind::MissingReference | FailureKind::IllegalBinding => {
                Error::ReferentialIntegrity {
                    message: failure.message,
                }
            }
        }
    }
}

/// How indexing reacts to a failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureMode {
    /// Stop at the first failure.
    #[default]
    FailFast,
    /// Record every failure and keep going.
    Collect,
}

/// Gathers failures, discarding repeats of the same message.
#[derive(Debug, Default)]
pub struct FailureCollector {
    mode: FailureMode,
    failures: Vec<Failure>,
}

impl FailureCollector {
    pub fn new(mode: FailureMode) -> Self {
        Self {
            mode,
            failures: Vec::new(),
        }
    }

    pub fn mode(&self) -> FailureMode {
        self.mode
    }

    /// Report a failure. Fails in fail-fast mode.
    pub fn report(&mut self, failure: Failure) -> crate::Result<()> {
        match self.mode {
            FailureMode::FailFast => Err(failure.into()),
            FailureMode::Collect => {
                if !self.failures.iter().any(|f| f.message == failure.message) {
                    log::debug!("integrity failure: {failure}");
                    self.failures.push(failure);
                }
                Ok(())
            }
        }
    }

    /// Report a failure when `condition` does not hold.
    pub fn check(&mut self, condition: bool, failure: impl FnOnce() -> Failure) -> crate::Result<()> {
        if condition { Ok(()) } else { self.report(failure()) }
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_failures(self) -> Vec<Failure> {
        self.failures
    }
}
