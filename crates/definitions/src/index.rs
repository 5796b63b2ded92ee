//! Multi-kind resource index
//!
//! An [`Index`] holds one [`KeyedStore`] per resource kind and enforces
//! the invariants between them: keys are unique per kind, and every
//! reference from one resource to another resolves. Documents are folded
//! in with [`Index::merge`], which remembers which source contributed
//! each record so duplicates across files can name both.

use crate::error::{Error, Result};
use crate::failure::{Failure, FailureCollector, FailureMode};
use crate::kind::{self, Keyer, Kind, KindMap, exchange_key, field, queue_key, user_key, vhost_key};
use crate::store::KeyedStore;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Order in which kinds are ingested, so reference targets precede their dependents.
const INGEST_ORDER: [Kind; 7] = [
    Kind::Vhost,
    Kind::User,
    Kind::Exchange,
    Kind::Queue,
    Kind::Binding,
    Kind::Permission,
    Kind::TopicPermission,
];

/// Top-level fields naming the broker version, newest first.
const VERSION_FIELDS: [&str; 3] = ["rabbitmq_version", "rabbit_version", "product_version"];

/// Type of a broker-provided exchange, which definitions exports never list.
pub fn builtin_exchange_type(name: &str) -> Option<&'static str> {
    match name {
        "" | "amq.direct" => Some("direct"),
        "amq.fanout" => Some("fanout"),
        "amq.topic" | "amq.rabbitmq.trace" => Some("topic"),
        "amq.headers" | "amq.match" => Some("headers"),
        _ => None,
    }
}

/// Keyed resources of a definitions document, with integrity checks.
#[derive(Debug, Clone)]
pub struct Index {
    stores: KindMap<KeyedStore>,
    by_vhost: HashMap<String, Vec<(Kind, String)>>,
    bindings_by_source: HashMap<String, Vec<String>>,
    bindings_by_destination: HashMap<(Kind, String), Vec<String>>,
    provenance: HashMap<(Kind, String), String>,
    listed: HashSet<Kind>,
    unmanaged: Map<String, Value>,
    unmanaged_sources: HashMap<String, String>,
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Index {
    pub fn new() -> Self {
        Self {
            stores: KindMap::from_fn(KeyedStore::new),
            by_vhost: HashMap::new(),
            bindings_by_source: HashMap::new(),
            bindings_by_destination: HashMap::new(),
            provenance: HashMap::new(),
            listed: HashSet::new(),
            unmanaged: Map::new(),
            unmanaged_sources: HashMap::new(),
        }
    }

    /// Index a document, stopping at the first integrity failure.
    pub fn from_definitions(document: &Value) -> Result<Self> {
        let mut index = Self::new();
        index.build(document, FailureMode::FailFast)?;
        Ok(index)
    }

    /// Index a document, returning every integrity failure alongside it.
    pub fn from_definitions_collecting(document: &Value) -> Result<(Self, Vec<Failure>)> {
        let mut index = Self::new();
        let failures = index.build(document, FailureMode::Collect)?;
        Ok((index, failures))
    }

    /// Reset the index and ingest `document`.
    pub fn build(&mut self, document: &Value, mode: FailureMode) -> Result<Vec<Failure>> {
        *self = Self::new();
        self.merge(document, mode, None, None)
    }

    /// Ingest `document` on top of what is already indexed.
    ///
    /// Records covered by `ignore` are skipped without any check. In
    /// collect mode the returned list holds every integrity failure; in
    /// fail-fast mode the first one is returned as an error.
    pub fn merge(
        &mut self,
        document: &Value,
        mode: FailureMode,
        ignore: Option<&Index>,
        source: Option<&str>,
    ) -> Result<Vec<Failure>> {
        let object = document
            .as_object()
            .ok_or_else(|| Error::InvalidDocument("expected a JSON object".to_string()))?;
        for kind in Kind::ALL {
            match object.get(kind.plural()) {
                None | Some(Value::Null | Value::Array(_)) => {}
                Some(_) => {
                    return Err(Error::InvalidDocument(format!(
                        "\"{}\" must be an array",
                        kind.plural()
                    )));
                }
            }
        }

        let mut collector = FailureCollector::new(mode);
        for (name, value) in object {
            if Kind::from_plural(name).is_err() {
                self.merge_unmanaged(name, value, source, &mut collector)?;
            }
        }
        for kind in INGEST_ORDER {
            let Some(Value::Array(records)) = object.get(kind.plural()) else {
                continue;
            };
            self.listed.insert(kind);
            for record in records {
                self.ingest(kind, record, ignore, source, &mut collector)?;
            }
        }
        Ok(collector.into_failures())
    }

    fn merge_unmanaged(
        &mut self,
        name: &str,
        value: &Value,
        source: Option<&str>,
        collector: &mut FailureCollector,
    ) -> Result<()> {
        match self.unmanaged.get(name) {
            None => {
                self.unmanaged.insert(name.to_string(), value.clone());
                if let Some(source) = source {
                    self.unmanaged_sources.insert(name.to_string(), source.to_string());
                }
                Ok(())
            }
            Some(existing) if existing == value => Ok(()),
            Some(_) => {
                let sources = sources(self.unmanaged_sources.get(name).map(String::as_str), source);
                let message = format!("Conflicting values for \"{name}\"{}", defined_in(&sources));
                collector.report(Failure::duplicate(message, sources))
            }
        }
    }

    fn ingest(
        &mut self,
        kind: Kind,
        record: &Value,
        ignore: Option<&Index>,
        source: Option<&str>,
        collector: &mut FailureCollector,
    ) -> Result<()> {
        let key = match kind.key(record) {
            Ok(key) => key,
            Err(err) => {
                let err = match source {
                    Some(source) => err.with_source_tag(source),
                    None => err,
                };
                log::debug!("skipping record: {err}");
                return Ok(());
            }
        };
        if ignore.is_some_and(|ignore| ignore.ignores(kind, record)) {
            log::debug!("ignoring {}", kind.describe(record));
            return Ok(());
        }
        if self.stores.get(kind).contains_key(&key) {
            let previous = self.provenance.get(&(kind, key)).map(String::as_str);
            let sources = sources(previous, source);
            let message = format!("Duplicate {}{}", kind.describe(record), defined_in(&sources));
            return collector.report(Failure::duplicate(message, sources));
        }

        self.check_references(kind, record, collector)?;
        self.insert(kind, key, record.clone(), source);
        Ok(())
    }

    fn check_references(&self, kind: Kind, record: &Value, collector: &mut FailureCollector) -> Result<()> {
        if matches!(kind, Kind::Vhost | Kind::User) {
            return Ok(());
        }
        let vhost = field(record, "vhost").unwrap_or_default();
        collector.check(self.vhosts().contains_key(&vhost_key(vhost)), || {
            Failure::missing(format!("Missing vhost \"{vhost}\" for {}", kind.describe(record)))
        })?;

        match kind {
            Kind::Binding => self.check_binding(vhost, record, collector),
            Kind::Permission => self.check_user(kind, record, collector),
            Kind::TopicPermission => {
                self.check_user(kind, record, collector)?;
                let exchange = field(record, "exchange").unwrap_or_default();
                collector.check(
                    exchange.is_empty() || self.exchange_type(vhost, exchange).is_some(),
                    || {
                        Failure::missing(format!(
                            "Missing exchange \"{exchange}\" for {}",
                            kind.describe(record)
                        ))
                    },
                )
            }
            _ => Ok(()),
        }
    }

    fn check_user(&self, kind: Kind, record: &Value, collector: &mut FailureCollector) -> Result<()> {
        let user = field(record, "user").unwrap_or_default();
        collector.check(self.users().contains_key(&user_key(user)), || {
            Failure::missing(format!("Missing user \"{user}\" for {}", kind.describe(record)))
        })
    }

    fn check_binding(&self, vhost: &str, binding: &Value, collector: &mut FailureCollector) -> Result<()> {
        let source = field(binding, "source").unwrap_or_default();
        let destination = field(binding, "destination").unwrap_or_default();
        let destination_type = field(binding, "destination_type").unwrap_or_default();
        let routing_key = field(binding, "routing_key").unwrap_or_default();

        let source_type = self.exchange_type(vhost, source);
        collector.check(source_type.is_some(), || {
            Failure::missing(format!(
                "Missing source exchange for binding: \"{source}\" in vhost \"{vhost}\""
            ))
        })?;

        let destination_exists = match kind::destination_kind(destination_type) {
            Some(Kind::Queue) => self.queues().contains_key(&queue_key(vhost, destination)),
            Some(_) => self.exchange_type(vhost, destination).is_some(),
            None => false,
        };
        collector.check(destination_exists, || {
            Failure::missing(format!(
                "Missing destination {destination_type} for binding: \"{destination}\" in vhost \"{vhost}\""
            ))
        })?;

        let target = format!(
            "binding from {source} to {destination_type} \"{destination}\" in vhost \"{vhost}\""
        );
        let has_match = binding
            .get("arguments")
            .and_then(|arguments| arguments.get("x-match"))
            .is_some();
        match source_type.as_deref() {
            Some("headers") => collector.check(routing_key.is_empty(), || {
                Failure::illegal(format!(
                    "Routing key is ignored for headers exchanges, but set(\"{routing_key}\") for {target}"
                ))
            }),
            Some(exchange_type @ ("topic" | "direct" | "fanout")) => {
                collector.check(!has_match, || {
                    Failure::illegal(format!(
                        "Match arguments are ignored for {exchange_type} exchanges, but set for {target}"
                    ))
                })?;
                collector.check(exchange_type != "fanout" || routing_key.is_empty(), || {
                    Failure::illegal(format!(
                        "Routing key is ignored for fanout exchanges, but set(\"{routing_key}\") for {target}"
                    ))
                })
            }
            _ => Ok(()),
        }
    }

    /// Type of an exchange that is indexed or provided by the broker.
    fn exchange_type(&self, vhost: &str, name: &str) -> Option<String> {
        if let Some(builtin) = builtin_exchange_type(name) {
            return Some(builtin.to_string());
        }
        self.exchanges()
            .get_by_key(&exchange_key(vhost, name))
            .map(|exchange| field(exchange, "type").unwrap_or_default().to_string())
    }

    fn insert(&mut self, kind: Kind, key: String, record: Value, source: Option<&str>) {
        if !self.stores.get(kind).contains_key(&key) {
            self.link(kind, &key, &record);
        }
        if let Some(source) = source {
            self.provenance.insert((kind, key.clone()), source.to_string());
        }
        self.stores.get_mut(kind).insert_keyed(key, record);
    }

    /// Register `key` in the secondary lookups derived from `record`.
    fn link(&mut self, kind: Kind, key: &str, record: &Value) {
        let lookups = Lookups::of(kind, record);
        if let Some(vhost) = lookups.vhost {
            self.by_vhost
                .entry(vhost)
                .or_default()
                .push((kind, key.to_string()));
        }
        if let Some(source) = lookups.source {
            self.bindings_by_source
                .entry(source)
                .or_default()
                .push(key.to_string());
        }
        if let Some(destination) = lookups.destination {
            self.bindings_by_destination
                .entry(destination)
                .or_default()
                .push(key.to_string());
        }
    }

    /// Drop `key` from the secondary lookups derived from `record`.
    fn unlink(&mut self, kind: Kind, key: &str, record: &Value) {
        let lookups = Lookups::of(kind, record);
        if let Some(vhost) = lookups.vhost {
            prune(&mut self.by_vhost, &vhost, |entry| entry.0 == kind && entry.1 == key);
        }
        if let Some(source) = lookups.source {
            prune(&mut self.bindings_by_source, &source, |entry| entry == key);
        }
        if let Some(destination) = lookups.destination {
            prune(&mut self.bindings_by_destination, &destination, |entry| entry == key);
        }
    }

    /// Add a record without integrity checks, replacing any record with the same key.
    pub fn add(&mut self, kind: Kind, record: Value) -> Result<String> {
        let key = kind.key(&record)?;
        self.insert(kind, key.clone(), record, None);
        Ok(key)
    }

    /// Remove the record sharing a key with `record`.
    pub fn remove(&mut self, kind: Kind, record: &Value) -> Result<Option<Value>> {
        let removed = self.stores.get_mut(kind).remove(record)?;
        if let Some(previous) = &removed {
            let key = kind.key(record)?;
            self.unlink(kind, &key, previous);
            self.provenance.remove(&(kind, key));
        }
        Ok(removed)
    }

    pub fn get(&self, kind: Kind, record: &Value) -> Result<Option<&Value>> {
        self.stores.get(kind).get(record)
    }

    pub fn contains(&self, kind: Kind, record: &Value) -> Result<bool> {
        self.stores.get(kind).contains(record)
    }

    pub fn store(&self, kind: Kind) -> &KeyedStore {
        self.stores.get(kind)
    }

    pub fn vhosts(&self) -> &KeyedStore {
        &self.stores.vhosts
    }

    pub fn queues(&self) -> &KeyedStore {
        &self.stores.queues
    }

    pub fn exchanges(&self) -> &KeyedStore {
        &self.stores.exchanges
    }

    pub fn bindings(&self) -> &KeyedStore {
        &self.stores.bindings
    }

    pub fn users(&self) -> &KeyedStore {
        &self.stores.users
    }

    pub fn permissions(&self) -> &KeyedStore {
        &self.stores.permissions
    }

    pub fn topic_permissions(&self) -> &KeyedStore {
        &self.stores.topic_permissions
    }

    /// Bindings whose source is the exchange with key `exchange_key`.
    pub fn bindings_by_source(&self, exchange_key: &str) -> Vec<&Value> {
        self.resolve_bindings(self.bindings_by_source.get(exchange_key))
    }

    /// Bindings whose destination is the queue or exchange with this key.
    pub fn bindings_by_destination(&self, kind: Kind, key: &str) -> Vec<&Value> {
        self.resolve_bindings(self.bindings_by_destination.get(&(kind, key.to_string())))
    }

    fn resolve_bindings(&self, keys: Option<&Vec<String>>) -> Vec<&Value> {
        keys.into_iter()
            .flatten()
            .filter_map(|key| self.bindings().get_by_key(key))
            .collect()
    }

    /// Resources living in the vhost with key `vhost_key`.
    pub fn in_vhost(&self, vhost_key: &str) -> Vec<(Kind, &Value)> {
        self.by_vhost
            .get(vhost_key)
            .into_iter()
            .flatten()
            .filter_map(|(kind, key)| self.stores.get(*kind).get_by_key(key).map(|r| (*kind, r)))
            .collect()
    }

    /// Source document that contributed the record with this key.
    pub fn source_of(&self, kind: Kind, key: &str) -> Option<&str> {
        self.provenance
            .get(&(kind, key.to_string()))
            .map(String::as_str)
    }

    /// Top-level fields passed through without indexing.
    pub fn unmanaged(&self) -> &Map<String, Value> {
        &self.unmanaged
    }

    /// Serialize back to a definitions document.
    ///
    /// A kind array is written when some merged document listed it or the
    /// index holds records of that kind.
    pub fn to_definitions(&self) -> Value {
        let mut document = self.unmanaged.clone();
        for (kind, store) in self.stores.iter() {
            if !self.listed.contains(&kind) && store.is_empty() {
                continue;
            }
            document.insert(
                kind.plural().to_string(),
                Value::Array(store.values().cloned().collect()),
            );
        }
        Value::Object(document)
    }

    /// Broker version recorded in the document, if any.
    ///
    /// Exports have used several field names over time. When more than one
    /// is present and they disagree, the newest name wins with a warning.
    pub fn version(&self) -> Option<&str> {
        let versions: Vec<(&str, &str)> = VERSION_FIELDS
            .iter()
            .filter_map(|name| {
                self.unmanaged
                    .get(*name)
                    .and_then(Value::as_str)
                    .map(|v| (*name, v))
            })
            .collect();
        let (_, first) = versions.first()?;
        for (name, version) in &versions[1..] {
            if version != first {
                log::warn!("version mismatch: \"{name}\" is {version}, expected {first}");
            }
        }
        Some(*first)
    }

    /// Vhosts nothing lives in, queues nothing is bound to, and exchanges
    /// no binding uses.
    pub fn unused(&self) -> Vec<(Kind, &Value)> {
        let mut unused = Vec::new();
        for (key, vhost) in self.vhosts().iter() {
            if self.in_vhost(key).is_empty() {
                unused.push((Kind::Vhost, vhost));
            }
        }
        for (key, queue) in self.queues().iter() {
            if self.bindings_by_destination(Kind::Queue, key).is_empty() {
                unused.push((Kind::Queue, queue));
            }
        }
        for (key, exchange) in self.exchanges().iter() {
            if self.bindings_by_source(key).is_empty()
                && self.bindings_by_destination(Kind::Exchange, key).is_empty()
            {
                unused.push((Kind::Exchange, exchange));
            }
        }
        unused
    }

    /// Record count per kind.
    pub fn summary(&self) -> KindMap<usize> {
        KindMap::from_fn(|kind| self.stores.get(kind).len())
    }

    /// Whether `record`, or anything it depends on, is listed in this index.
    ///
    /// Used on indexes built from an ignore list.
    pub fn ignores(&self, kind: Kind, record: &Value) -> bool {
        if kind.key(record).is_ok_and(|key| self.stores.get(kind).contains_key(&key)) {
            return true;
        }
        let f = |name| field(record, name).unwrap_or_default();
        let vhost = f("vhost");
        if kind != Kind::Vhost && kind != Kind::User && self.vhosts().contains_key(&vhost_key(vhost)) {
            return true;
        }
        match kind {
            Kind::Binding => {
                let destination = match kind::destination_kind(f("destination_type")) {
                    Some(Kind::Queue) => self.queues().contains_key(&queue_key(vhost, f("destination"))),
                    Some(_) => self.exchanges().contains_key(&exchange_key(vhost, f("destination"))),
                    None => false,
                };
                destination || self.exchanges().contains_key(&exchange_key(vhost, f("source")))
            }
            Kind::Permission => self.users().contains_key(&user_key(f("user"))),
            Kind::TopicPermission => {
                self.users().contains_key(&user_key(f("user")))
                    || self.exchanges().contains_key(&exchange_key(vhost, f("exchange")))
            }
            _ => false,
        }
    }
}

/// Secondary lookup keys a record is filed under.
struct Lookups {
    vhost: Option<String>,
    source: Option<String>,
    destination: Option<(Kind, String)>,
}

impl Lookups {
    fn of(kind: Kind, record: &Value) -> Self {
        let vhost = field(record, "vhost");
        let mut lookups = Self {
            vhost: vhost.map(vhost_key),
            source: None,
            destination: None,
        };
        if kind != Kind::Binding {
            return lookups;
        }
        let vhost = vhost.unwrap_or_default();
        lookups.source = Some(exchange_key(vhost, field(record, "source").unwrap_or_default()));
        let destination = field(record, "destination").unwrap_or_default();
        lookups.destination = kind::destination_kind(field(record, "destination_type").unwrap_or_default())
            .map(|destination_kind| {
                let key = match destination_kind {
                    Kind::Queue => queue_key(vhost, destination),
                    _ => exchange_key(vhost, destination),
                };
                (destination_kind, key)
            });
        lookups
    }
}

fn prune<K, V>(lookup: &mut HashMap<K, Vec<V>>, key: &K, matches: impl Fn(&V) -> bool)
where
    K: std::hash::Hash + Eq,
{
    if let Some(entries) = lookup.get_mut(key) {
        entries.retain(|entry| !matches(entry));
        if entries.is_empty() {
            lookup.remove(key);
        }
    }
}

fn sources(previous: Option<&str>, current: Option<&str>) -> Vec<String> {
    previous
        .into_iter()
        .chain(current)
        .map(str::to_string)
        .collect()
}

fn defined_in(sources: &[String]) -> String {
    match sources {
        [first, second] => format!(" (defined in \"{first}\" and \"{second}\")"),
        [only] => format!(" (defined in \"{only}\")"),
        _ => String::new(),
    }
}
