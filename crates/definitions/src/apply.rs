//! Patch a definitions document with a diff
//!
//! Matching is by key, never by position, so applying the same diff twice
//! leaves the document as the first application did.

use crate::diff::Diff;
use crate::error::{Error, Result};
use crate::kind::{Keyer, Kind};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Options for [`apply`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Undo the diff instead of applying it.
    pub revert: bool,
}

/// The diff that undoes `diff`.
pub fn revert(diff: &Diff) -> Diff {
    diff.reverted()
}

/// Read a diff from JSON. Any subset of kinds and buckets may be present.
pub fn parse_diff(value: Value) -> Result<Diff> {
    serde_json::from_value(value).map_err(|e| Error::InvalidDocument(format!("invalid diff: {e}")))
}

/// Patch `document` in place so it matches the later side of `diff`.
///
/// Deletions run first, then changes, then additions. Every record of the
/// diff is keyed and every touched kind array checked before the document
/// is modified, so an error leaves `document` untouched.
pub fn apply(diff: &Diff, document: &mut Value, options: ApplyOptions) -> Result<()> {
    if options.revert {
        return apply(&diff.reverted(), document, ApplyOptions::default());
    }
    let object = document
        .as_object_mut()
        .ok_or_else(|| Error::InvalidDocument("expected a JSON object".to_string()))?;

    let patches = Kind::ALL
        .into_iter()
        .map(|kind| Patch::new(kind, diff))
        .filter(|patch| !matches!(patch, Ok(patch) if patch.is_empty()))
        .collect::<Result<Vec<_>>>()?;
    for patch in &patches {
        check_records(object, patch.kind)?;
    }

    for patch in &patches {
        patch.delete(records_mut(object, patch.kind)?);
    }
    for patch in &patches {
        patch.replace(records_mut(object, patch.kind)?);
    }
    for patch in &patches {
        patch.add(records_mut(object, patch.kind)?);
    }
    Ok(())
}

/// The part of a diff touching one kind, keyed up front.
struct Patch<'a> {
    kind: Kind,
    deleted: &'a [Value],
    deleted_keys: HashSet<String>,
    replacements: HashMap<String, &'a Value>,
    added: Vec<(String, &'a Value)>,
}

impl<'a> Patch<'a> {
    fn new(kind: Kind, diff: &'a Diff) -> Result<Self> {
        let deleted = diff.deleted.get(kind);
        Ok(Self {
            kind,
            deleted,
            deleted_keys: deleted
                .iter()
                .map(|record| kind.key(record))
                .collect::<Result<_>>()?,
            replacements: diff
                .changed
                .get(kind)
                .iter()
                .map(|change| Ok((kind.key(&change.after)?, &change.after)))
                .collect::<Result<_>>()?,
            added: diff
                .added
                .get(kind)
                .iter()
                .map(|record| Ok((kind.key(record)?, record)))
                .collect::<Result<_>>()?,
        })
    }

    fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.replacements.is_empty() && self.added.is_empty()
    }

    /// Remove every entry whose key is marked deleted, duplicates included.
    fn delete(&self, records: &mut Vec<Value>) {
        if self.deleted_keys.is_empty() {
            return;
        }
        let kind = self.kind;
        let mut pending = self.deleted_keys.clone();
        let mut removed = HashSet::new();
        records.retain(|record| {
            let Ok(key) = kind.key(record) else {
                return true;
            };
            if pending.remove(&key) {
                removed.insert(key);
                false
            } else {
                !removed.contains(&key)
            }
        });

        if !pending.is_empty() {
            log::warn!("{} marked to be deleted, but not found:", kind.plural());
            for record in self.deleted {
                if kind.key(record).is_ok_and(|key| pending.contains(&key)) {
                    log::warn!(" - {record}");
                }
            }
        }
    }

    fn replace(&self, records: &mut [Value]) {
        if self.replacements.is_empty() {
            return;
        }
        for record in records.iter_mut() {
            if let Some(after) = self.kind.key(record).ok().and_then(|key| self.replacements.get(&key)) {
                *record = (*after).clone();
            }
        }
    }

    fn add(&self, records: &mut Vec<Value>) {
        if self.added.is_empty() {
            return;
        }
        let mut present: HashSet<String> = records.iter().filter_map(|r| self.kind.key(r).ok()).collect();
        for (key, record) in &self.added {
            if present.insert(key.clone()) {
                records.push((*record).clone());
            }
        }
    }
}

fn check_records(object: &Map<String, Value>, kind: Kind) -> Result<()> {
    match object.get(kind.plural()) {
        None | Some(Value::Null | Value::Array(_)) => Ok(()),
        Some(_) => Err(Error::InvalidDocument(format!(
            "\"{}\" must be an array",
            kind.plural()
        ))),
    }
}

fn records_mut(object: &mut Map<String, Value>, kind: Kind) -> Result<&mut Vec<Value>> {
    let entry = object
        .entry(kind.plural())
        .or_insert_with(|| Value::Array(Vec::new()));
    if entry.is_null() {
        *entry = Value::Array(Vec::new());
    }
    entry
        .as_array_mut()
        .ok_or_else(|| Error::InvalidDocument(format!("\"{}\" must be an array", kind.plural())))
}
