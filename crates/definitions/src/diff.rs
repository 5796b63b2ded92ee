//! Diff engine
//!
//! Compares two definitions documents kind by kind. A record whose key
//! exists only in the later document is added, one whose key exists only
//! in the earlier document is deleted, and one present in both with a
//! different value is changed. Bindings attached to a changed queue or
//! exchange are reported separately as implicitly affected, since the
//! broker can only change those endpoints by deleting and recreating
//! them, which drops their bindings.

use crate::error::Result;
use crate::failure::FailureMode;
use crate::index::Index;
use crate::kind::{Keyer, Kind, KindMap, destination_kind, exchange_key, field, queue_key};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A record present on both sides with different values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub before: Value,
    pub after: Value,
}

impl Change {
    /// The change that undoes this one.
    pub fn reverted(&self) -> Self {
        Self {
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }
}

/// Resources touched without being changed themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplicitEffects {
    pub bindings: Vec<Value>,
}

/// Differences between two definitions documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diff {
    pub added: KindMap<Vec<Value>>,
    pub deleted: KindMap<Vec<Value>>,
    pub changed: KindMap<Vec<Change>>,
    #[serde(rename = "implicitlyAffected")]
    pub implicitly_affected: ImplicitEffects,
}

/// Per-kind counts of a [`Diff`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub added: KindMap<usize>,
    pub deleted: KindMap<usize>,
    pub changed: KindMap<usize>,
    pub implicitly_affected: usize,
}

impl DiffSummary {
    pub fn total(&self) -> usize {
        let sum = |map: &KindMap<usize>| map.iter().map(|(_, n)| n).sum::<usize>();
        sum(&self.added) + sum(&self.deleted) + sum(&self.changed) + self.implicitly_affected
    }
}

impl Diff {
    /// Whether the two documents are equivalent.
    pub fn is_empty(&self) -> bool {
        self.summary().total() == 0
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            added: KindMap::from_fn(|kind| self.added.get(kind).len()),
            deleted: KindMap::from_fn(|kind| self.deleted.get(kind).len()),
            changed: KindMap::from_fn(|kind| self.changed.get(kind).len()),
            implicitly_affected: self.implicitly_affected.bindings.len(),
        }
    }

    /// Whether `binding` starts or ends at a changed queue or exchange.
    ///
    /// Changed vhosts are not considered: recreating a vhost drops
    /// everything in it, not just bindings.
    pub fn touches_changed_endpoint(&self, binding: &Value) -> bool {
        let changed = |kind: Kind, key: &str| {
            self.changed
                .get(kind)
                .iter()
                .any(|change| kind.key(&change.after).is_ok_and(|k| k == key))
        };
        let vhost = field(binding, "vhost").unwrap_or_default();
        let destination = field(binding, "destination").unwrap_or_default();
        let destination_changed =
            match destination_kind(field(binding, "destination_type").unwrap_or_default()) {
                Some(Kind::Queue) => changed(Kind::Queue, &queue_key(vhost, destination)),
                Some(_) => changed(Kind::Exchange, &exchange_key(vhost, destination)),
                None => false,
            };
        destination_changed
            || changed(
                Kind::Exchange,
                &exchange_key(vhost, field(binding, "source").unwrap_or_default()),
            )
    }

    /// The diff that undoes this one: additions and deletions swap, and
    /// every change runs the other way.
    pub fn reverted(&self) -> Self {
        Self {
            added: self.deleted.clone(),
            deleted: self.added.clone(),
            changed: KindMap::from_fn(|kind| {
                self.changed.get(kind).iter().map(Change::reverted).collect()
            }),
            implicitly_affected: self.implicitly_affected.clone(),
        }
    }
}

/// Diff two documents, skipping anything covered by `ignore`.
///
/// Integrity failures in either document are logged, not fatal, so a diff
/// can be taken of partially broken input. A document that does not have
/// the definitions shape at all is an error.
pub fn diff(before: &Value, after: &Value, ignore: Option<&Index>) -> Result<Diff> {
    let before = index_collecting(before, ignore, "before")?;
    let after = index_collecting(after, ignore, "after")?;
    Ok(diff_indexes(&before, &after))
}

fn index_collecting(document: &Value, ignore: Option<&Index>, side: &str) -> Result<Index> {
    let mut index = Index::new();
    let failures = index.merge(document, FailureMode::Collect, ignore, None)?;
    if !failures.is_empty() {
        log::warn!(
            "{} integrity failure(s) in {side} definitions; diffing anyway",
            failures.len()
        );
        for failure in &failures {
            log::debug!("  {failure}");
        }
    }
    Ok(index)
}

/// Diff two built indexes.
pub fn diff_indexes(before: &Index, after: &Index) -> Diff {
    let mut diff = Diff::default();
    let mut unaffected_bindings = Vec::new();

    for kind in Kind::ALL {
        let before_store = before.store(kind);
        let after_store = after.store(kind);
        for (key, after_record) in after_store.iter() {
            match before_store.get_by_key(key) {
                None => diff.added.get_mut(kind).push(after_record.clone()),
                Some(before_record) if !records_equal(kind, before_record, after_record) => {
                    diff.changed.get_mut(kind).push(Change {
                        before: before_record.clone(),
                        after: after_record.clone(),
                    });
                }
                Some(_) if kind == Kind::Binding => unaffected_bindings.push(after_record),
                Some(_) => {}
            }
        }
        for (key, before_record) in before_store.iter() {
            if !after_store.contains_key(key) {
                diff.deleted.get_mut(kind).push(before_record.clone());
            }
        }
    }

    let implicit: Vec<Value> = unaffected_bindings
        .into_iter()
        .filter(|binding| diff.touches_changed_endpoint(binding))
        .cloned()
        .collect();
    diff.implicitly_affected.bindings = implicit;
    diff
}

fn records_equal(kind: Kind, before: &Value, after: &Value) -> bool {
    match kind {
        Kind::Vhost => vhosts_equal(before, after),
        _ => before == after,
    }
}

/// Compare vhosts across broker versions.
///
/// Newer brokers report `description`, `tags` and `default_queue_type`
/// both at the top level and under `metadata`, with empty defaults when
/// unset. Those are compared by meaning; tags as a set.
pub fn vhosts_equal(before: &Value, after: &Value) -> bool {
    NormalizedVhost::from(before) == NormalizedVhost::from(after)
}

#[derive(Debug, PartialEq)]
struct NormalizedVhost {
    description: String,
    tags: BTreeSet<String>,
    default_queue_type: String,
    rest: Map<String, Value>,
}

const VHOST_METADATA_FIELDS: [&str; 3] = ["description", "tags", "default_queue_type"];

impl From<&Value> for NormalizedVhost {
    fn from(vhost: &Value) -> Self {
        let metadata = vhost.get("metadata");
        let lookup = |name: &str| {
            metadata
                .and_then(|m| m.get(name))
                .filter(|v| !v.is_null())
                .or_else(|| vhost.get(name).filter(|v| !v.is_null()))
        };
        let text = |name: &str| {
            lookup(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let mut rest = vhost.as_object().cloned().unwrap_or_default();
        for name in VHOST_METADATA_FIELDS {
            rest.remove(name);
        }
        if let Some(Value::Object(mut metadata)) = rest.remove("metadata") {
            for name in VHOST_METADATA_FIELDS {
                metadata.remove(name);
            }
            if !metadata.is_empty() {
                rest.insert("metadata".to_string(), Value::Object(metadata));
            }
        }

        Self {
            description: text("description"),
            tags: parse_tags(lookup("tags")),
            default_queue_type: text("default_queue_type"),
            rest,
        }
    }
}

fn parse_tags(tags: Option<&Value>) -> BTreeSet<String> {
    match tags {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect(),
        _ => BTreeSet::new(),
    }
}
