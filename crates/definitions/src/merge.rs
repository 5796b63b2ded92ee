//! Merge several definitions documents into one index
//!
//! Each document is folded in order, tagged with where it came from, and
//! the first integrity failure aborts the merge. A resource defined in two
//! documents is reported with both of their names.

use crate::error::{Error, Result};
use crate::failure::FailureMode;
use crate::index::Index;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Read a definitions document from a JSON file.
pub fn read_definitions(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&content).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Merge already-parsed documents, each named by its source.
pub fn merge_documents<'a, I>(ignore: Option<&Index>, documents: I) -> Result<Index>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut index = Index::new();
    let mut merged = 0usize;
    for (source, document) in documents {
        log::debug!("merging definitions from {source}");
        index.merge(document, FailureMode::FailFast, ignore, Some(source))?;
        merged += 1;
    }
    if merged == 0 {
        return Err(Error::NoSources);
    }
    Ok(index)
}

/// Merge definitions files in order.
pub fn merge_files<P: AsRef<Path>>(ignore: Option<&Index>, paths: &[P]) -> Result<Index> {
    let documents = paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            Ok((path.display().to_string(), read_definitions(path)?))
        })
        .collect::<Result<Vec<(String, Value)>>>()?;
    merge_documents(
        ignore,
        documents
            .iter()
            .map(|(source, document)| (source.as_str(), document)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use serde_json::json;
    use std::io::Write;

    fn write_json(dir: &Path, name: &str, value: &Value) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        write!(file, "{value}").unwrap();
        path
    }

    #[test]
    fn test_merge_split_documents() {
        let full = fixtures::full();
        let mut base = full.clone();
        for plural in ["queues", "exchanges", "bindings", "topic_permissions"] {
            base[plural] = json!([]);
        }
        let topology = json!({
            "queues": full["queues"],
            "exchanges": full["exchanges"],
            "bindings": full["bindings"],
            "topic_permissions": full["topic_permissions"],
        });
        let index = merge_documents(None, [("base", &base), ("topology", &topology)]).unwrap();
        assert_eq!(index.summary(), crate::Index::from_definitions(&full).unwrap().summary());
    }

    #[test]
    fn test_duplicate_names_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_json(dir.path(), "SOURCE1.json", &fixtures::basic());
        let second = write_json(dir.path(), "SOURCE2.json", &json!({"vhosts": [{"name": "/"}]}));
        let err = merge_files(None, &[first, second]).unwrap_err();
        let message = err.to_string();
        let at = message.find("SOURCE1").unwrap();
        assert!(message[at..].contains("SOURCE2"), "{message}");
    }

    #[test]
    fn test_ignore_applies_to_every_file() {
        let ignore = Index::from_ignore_list(["/vhosts/orders"]).unwrap();
        let full = fixtures::full();
        let index = merge_documents(Some(&ignore), [("full", &full)]).unwrap();
        assert_eq!(index.vhosts().len(), 2);
    }

    #[test]
    fn test_no_sources() {
        let paths: [&str; 0] = [];
        assert!(matches!(merge_files(None, &paths), Err(Error::NoSources)));
    }

    #[test]
    fn test_read_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(read_definitions(&missing), Err(Error::Io { .. })));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();
        assert!(matches!(read_definitions(&broken), Err(Error::Json { .. })));
    }
}
