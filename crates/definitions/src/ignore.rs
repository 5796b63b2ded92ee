//! Ignore lists
//!
//! An ignore list names resources with management API style paths, one
//! per line:
//!
//! ```text
//! /vhosts/{name}
//! /users/{name}
//! /queues/{vhost}/{name}
//! /exchanges/{vhost}/{name}
//! ```
//!
//! Segments are percent-encoded, so `/vhosts/%2F` is the default vhost.
//! Lines not starting with `/` are skipped.

use crate::error::{Error, Result};
use crate::index::Index;
use crate::kind::Kind;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;

impl Index {
    /// Build a sparse index from ignore list lines.
    pub fn from_ignore_list<I, S>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::new();
        for line in lines {
            let line = line.as_ref().trim();
            if !line.starts_with('/') {
                continue;
            }
            let (kind, record) = parse_line(line)?;
            index.add(kind, record)?;
        }
        Ok(index)
    }

    /// Read and parse an ignore list file.
    pub fn from_ignore_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        log::debug!("loaded ignore list from {}", path.display());
        Self::from_ignore_list(content.lines())
    }
}

fn parse_line(line: &str) -> Result<(Kind, Value)> {
    let invalid = || Error::InvalidDocument(format!("invalid ignore line: {line}"));
    let segments = line[1..]
        .split('/')
        .map(|segment| urlencoding::decode(segment).map(|s| s.into_owned()))
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(|_| invalid())?;

    match segments.as_slice() {
        [kind, name] if kind == "vhosts" => Ok((Kind::Vhost, json!({"name": name}))),
        [kind, name] if kind == "users" => Ok((Kind::User, json!({"name": name}))),
        [kind, vhost, name] if kind == "queues" => {
            Ok((Kind::Queue, json!({"vhost": vhost, "name": name})))
        }
        [kind, vhost, name] if kind == "exchanges" => {
            Ok((Kind::Exchange, json!({"vhost": vhost, "name": name})))
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureMode;
    use crate::fixtures;
    use std::io::Write;

    #[test]
    fn test_parse_lines() {
        let index = Index::from_ignore_list([
            "# comment",
            "",
            "/vhosts/%2F",
            "/users/guest",
            "/queues/orders/orders.created",
            "/exchanges/%2F/amq%2Fcustom",
        ])
        .unwrap();
        let summary = index.summary();
        assert_eq!(summary.vhosts, 1);
        assert_eq!(summary.users, 1);
        assert_eq!(summary.queues, 1);
        assert_eq!(summary.exchanges, 1);
        assert!(index.contains(Kind::Vhost, &json!({"name": "/"})).unwrap());
        assert!(
            index
                .contains(Kind::Exchange, &json!({"vhost": "/", "name": "amq/custom"}))
                .unwrap()
        );
    }

    #[test]
    fn test_invalid_lines() {
        for line in ["/vhosts", "/queues/only-vhost", "/bindings/a/b", "/vhosts/a/b"] {
            let err = Index::from_ignore_list([line]).unwrap_err();
            assert!(err.to_string().contains(line), "{err}");
        }
    }

    #[test]
    fn test_ignored_vhost_hides_dependents() {
        let ignore = Index::from_ignore_list(["/vhosts/orders"]).unwrap();
        let mut index = Index::new();
        let failures = index
            .merge(&fixtures::full(), FailureMode::Collect, Some(&ignore), None)
            .unwrap();
        assert!(failures.is_empty(), "{failures:?}");
        assert!(!index.vhosts().iter().any(|(_, v)| v["name"] == "orders"));
        assert!(!index.queues().values().any(|q| q["vhost"] == "orders"));
        assert!(!index.permissions().values().any(|p| p["vhost"] == "orders"));
    }

    #[test]
    fn test_ignored_queue_hides_bindings() {
        let ignore = Index::from_ignore_list(["/queues/%2F/events_queue"]).unwrap();
        let mut index = Index::new();
        index
            .merge(&fixtures::full(), FailureMode::FailFast, Some(&ignore), None)
            .unwrap();
        assert!(!index.bindings().values().any(|b| b["destination"] == "events_queue"));
        assert_eq!(index.queues().len(), 3);
    }

    #[test]
    fn test_ignored_exchange_hides_bindings_from_it() {
        let ignore = Index::from_ignore_list(["/exchanges/%2F/defect_direct"]).unwrap();
        let mut index = Index::new();
        index
            .merge(&fixtures::full(), FailureMode::FailFast, Some(&ignore), None)
            .unwrap();
        assert!(!index.bindings().values().any(|b| b["source"] == "defect_direct"));
        assert!(index.bindings().values().any(|b| b["destination"] == "broadcast_queue"));
        assert!(!index.exchanges().values().any(|e| e["name"] == "defect_direct"));
    }

    #[test]
    fn test_ignored_user_hides_permissions() {
        let ignore = Index::from_ignore_list(["/users/app"]).unwrap();
        let mut index = Index::new();
        index
            .merge(&fixtures::full(), FailureMode::FailFast, Some(&ignore), None)
            .unwrap();
        assert!(!index.permissions().values().any(|p| p["user"] == "app"));
        assert!(!index.topic_permissions().values().any(|p| p["user"] == "app"));
    }

    #[test]
    fn test_from_ignore_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "/vhosts/staging").unwrap();
        writeln!(file, "/users/temp").unwrap();
        let index = Index::from_ignore_file(file.path()).unwrap();
        assert_eq!(index.vhosts().len(), 1);
        assert_eq!(index.users().len(), 1);
    }

    #[test]
    fn test_missing_ignore_file() {
        let err = Index::from_ignore_file("/nonexistent/ignore.txt").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
