//! Error types for definitions operations.
//!
//! Integrity problems found while indexing are first reported as
//! [`Failure`](crate::Failure) records. They only become an [`Error`] when
//! the caller asked to stop on the first one, or when the problem makes the
//! input impossible to process at all.

use crate::kind::Kind;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for definitions operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of definitions errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Duplicate resources or broken references between resources.
    Integrity,
    /// Input that cannot be interpreted as definitions.
    Input,
    /// Reading input failed.
    Io,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Integrity => "Definitions are inconsistent",
            Self::Input => "Definitions could not be interpreted",
            Self::Io => "Definitions could not be read",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Integrity => "Remove the duplicate or add the missing resource it refers to",
            Self::Input => "Check that the file is a definitions export or a diff produced by this tool",
            Self::Io => "Check that the path exists and is readable",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while indexing, diffing, merging or patching definitions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A record lacks one of the fields that identify it.
    #[error("failed to index {kind}{}: missing or invalid field \"{field}\"", at_source(.source_tag.as_deref()))]
    Indexing {
        /// Kind the record was indexed as.
        kind: Kind,
        /// Offending identity field.
        field: &'static str,
        /// Document the record came from, if known.
        source_tag: Option<String>,
    },

    /// The same resource was defined twice.
    #[error("{message}")]
    DuplicateResource {
        /// Human-readable description of the duplicate.
        message: String,
        /// Every source that contributed the resource.
        sources: Vec<String>,
    },

    /// A resource refers to something that does not exist, or a binding
    /// is illegal for its source exchange type.
    #[error("{message}")]
    ReferentialIntegrity {
        /// Human-readable description of the broken reference.
        message: String,
    },

    /// A record matches none of the known resource shapes.
    #[error("unknown resource: {record}")]
    UnknownResource {
        /// The record, serialized.
        record: String,
    },

    /// A kind name outside the definitions vocabulary.
    #[error("unknown resource type: \"{0}\"")]
    UnknownKind(String),

    /// The document does not have the definitions shape.
    #[error("invalid definitions: {0}")]
    InvalidDocument(String),

    /// Merging was requested with nothing to merge.
    #[error("at least one definitions source is required")]
    NoSources,

    /// Reading a file failed.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A file does not contain valid JSON.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

fn at_source(source_tag: Option<&str>) -> String {
    source_tag.map(|s| format!(" @ {s}")).unwrap_or_default()
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an indexing error for a missing identity field.
    pub fn indexing(kind: Kind, field: &'static str) -> Self {
        Self::Indexing {
            kind,
            field,
            source_tag: None,
        }
    }

    /// Attach the source document to an indexing error.
    pub fn with_source_tag(self, tag: &str) -> Self {
        match self {
            Self::Indexing { kind, field, .. } => Self::Indexing {
                kind,
                field,
                source_tag: Some(tag.to_string()),
            },
            other => other,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::DuplicateResource { .. } | Error::ReferentialIntegrity { .. } => {
                ErrorCategory::Integrity
            }
            Error::Indexing { .. }
            | Error::UnknownResource { .. }
            | Error::UnknownKind(_)
            | Error::InvalidDocument(_)
            | Error::NoSources
            | Error::Json { .. } => ErrorCategory::Input,
            Error::Io { .. } => ErrorCategory::Io,
        }
    }

    /// Whether this error describes inconsistent definitions rather than unreadable input.
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        self.category() == ErrorCategory::Integrity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing_error_names_field() {
        let err = Error::indexing(Kind::Queue, "vhost");
        assert_eq!(
            err.to_string(),
            "failed to index queue: missing or invalid field \"vhost\""
        );
    }

    #[test]
    fn test_indexing_error_with_source_tag() {
        let err = Error::indexing(Kind::Binding, "destination").with_source_tag("prod.json");
        let display = err.to_string();
        assert!(display.contains("@ prod.json"));
        assert!(display.contains("\"destination\""));
    }

    #[test]
    fn test_source_tag_ignored_for_other_errors() {
        let err = Error::NoSources.with_source_tag("a.json");
        assert!(matches!(err, Error::NoSources));
    }

    #[test]
    fn test_error_categories() {
        let dup = Error::DuplicateResource {
            message: "Duplicate vhost \"/\"".to_string(),
            sources: vec![],
        };
        assert_eq!(dup.category(), ErrorCategory::Integrity);
        assert!(dup.is_integrity());
        assert_eq!(
            Error::UnknownKind("widgets".to_string()).category(),
            ErrorCategory::Input
        );
        let io_err = io::Error::new(io::ErrorKind::NotFound, "not found");
        assert_eq!(Error::io("/tmp/x.json", io_err).category(), ErrorCategory::Io);
    }

    #[test]
    fn test_error_category_advice() {
        assert!(!ErrorCategory::Integrity.advice().is_empty());
        assert!(!ErrorCategory::Input.advice().is_empty());
        assert!(format!("{}", ErrorCategory::Io).contains("read"));
    }
}
