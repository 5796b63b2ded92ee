//! # Definitions
//!
//! Index, diff, merge and patch RabbitMQ definitions documents.
//!
//! ## Core Concepts
//!
//! - **Kind**: one of the seven resource kinds a document holds, and the
//!   canonical key of each record
//! - **Index**: keyed stores for every kind, with uniqueness and
//!   reference checks, built from one or more documents
//! - **Diff**: per-kind added, deleted and changed records between two
//!   documents, plus bindings implicitly affected by changed endpoints
//! - **Apply**: patch a document with a diff, or undo one
//!
//! ## Example
//!
//! ```ignore
//! use definitions::{apply, diff, ApplyOptions};
//!
//! let before = definitions::read_definitions("current.json")?;
//! let after = definitions::read_definitions("desired.json")?;
//!
//! let changes = diff(&before, &after, None)?;
//! let mut document = before.clone();
//! apply(&changes, &mut document, ApplyOptions::default())?;
//! ```

pub mod apply;
pub mod diff;
pub mod error;
pub mod failure;
pub mod ignore;
pub mod index;
pub mod kind;
pub mod merge;
pub mod store;

#[cfg(test)]
pub(crate) mod fixtures;

pub use apply::{ApplyOptions, apply, parse_diff, revert};
pub use diff::{Change, Diff, DiffSummary, ImplicitEffects, diff, diff_indexes};
pub use error::{Error, ErrorCategory, Result};
pub use failure::{Failure, FailureCollector, FailureKind, FailureMode};
pub use index::{Index, builtin_exchange_type};
pub use kind::{Keyer, Kind, KindMap};
pub use merge::{merge_documents, merge_files, read_definitions};
pub use store::KeyedStore;
