//! Keyed record store
//!
//! Records are kept by canonical key in insertion order. The hashing
//! strategy is pluggable so the same store backs every resource kind.

use crate::error::Result;
use crate::kind::{Keyer, Kind};
use indexmap::IndexMap;
use serde_json::Value;

/// Records of one kind, deduplicated by key.
#[derive(Debug, Clone)]
pub struct KeyedStore<K = Kind> {
    keyer: K,
    records: IndexMap<String, Value>,
}

impl<K: Keyer> KeyedStore<K> {
    pub fn new(keyer: K) -> Self {
        Self {
            keyer,
            records: IndexMap::new(),
        }
    }

    /// Key a record with this store's strategy.
    pub fn key_of(&self, record: &Value) -> Result<String> {
        self.keyer.key(record)
    }

    /// Find the stored record sharing a key with `record`.
    pub fn get(&self, record: &Value) -> Result<Option<&Value>> {
        let key = self.key_of(record)?;
        Ok(self.records.get(&key))
    }

    pub fn get_by_key(&self, key: &str) -> Option<&Value> {
        self.records.get(key)
    }

    pub fn contains(&self, record: &Value) -> Result<bool> {
        let key = self.key_of(record)?;
        Ok(self.records.contains_key(&key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Store a record, replacing any record with the same key.
    ///
    /// Returns the key the record was stored under.
    pub fn insert(&mut self, record: Value) -> Result<String> {
        let key = self.key_of(&record)?;
        self.records.insert(key.clone(), record);
        Ok(key)
    }

    pub(crate) fn insert_keyed(&mut self, key: String, record: Value) {
        self.records.insert(key, record);
    }

    /// Remove the record sharing a key with `record`.
    pub fn remove(&mut self, record: &Value) -> Result<Option<Value>> {
        let key = self.key_of(record)?;
        Ok(self.records.shift_remove(&key))
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.records.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.records.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
