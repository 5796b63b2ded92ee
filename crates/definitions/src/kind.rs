//! Resource kinds and their canonical keys
//!
//! Every record in a definitions document belongs to one of seven kinds.
//! A kind knows which fields identify a record and turns them into a
//! canonical key: a JSON array of the identity fields, so no choice of
//! names can make two different resources collide.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The seven resource kinds of a definitions document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Vhost,
    Queue,
    Exchange,
    Binding,
    User,
    Permission,
    TopicPermission,
}

/// Hashing strategy for a keyed store.
pub trait Keyer {
    /// Compute the canonical key of a record.
    fn key(&self, record: &Value) -> Result<String>;
}

impl Kind {
    /// All kinds, in document order.
    pub const ALL: [Kind; 7] = [
        Kind::Vhost,
        Kind::Queue,
        Kind::Exchange,
        Kind::Binding,
        Kind::User,
        Kind::Permission,
        Kind::TopicPermission,
    ];

    /// Name of the document array holding this kind.
    pub fn plural(self) -> &'static str {
        match self {
            Kind::Vhost => "vhosts",
            Kind::Queue => "queues",
            Kind::Exchange => "exchanges",
            Kind::Binding => "bindings",
            Kind::User => "users",
            Kind::Permission => "permissions",
            Kind::TopicPermission => "topic_permissions",
        }
    }

    /// Parse a document array name.
    pub fn from_plural(name: &str) -> Result<Self> {
        Kind::ALL
            .into_iter()
            .find(|kind| kind.plural() == name)
            .ok_or_else(|| Error::UnknownKind(name.to_string()))
    }

    /// Classify a record of unknown origin by the fields it carries.
    ///
    /// Fields are inspected in a fixed priority order, so a record that
    /// happens to carry fields of several kinds always lands in the same one.
    pub fn classify(record: &Value) -> Result<Self> {
        let unknown = || Error::UnknownResource {
            record: record.to_string(),
        };
        let map = record.as_object().ok_or_else(unknown)?;
        let has = |field: &str| map.contains_key(field);

        if has("destination_type") {
            Ok(Kind::Binding)
        } else if has("type") {
            Ok(Kind::Exchange)
        } else if has("vhost") && has("durable") {
            Ok(Kind::Queue)
        } else if has("password_hash") {
            Ok(Kind::User)
        } else if has("configure") {
            Ok(Kind::Permission)
        } else if has("write") {
            Ok(Kind::TopicPermission)
        } else if has("name") && map.keys().all(|k| k == "name" || VHOST_METADATA.contains(&k.as_str())) {
            Ok(Kind::Vhost)
        } else {
            Err(unknown())
        }
    }

    /// Human-readable description of a record, used in failure messages.
    pub fn describe(self, record: &Value) -> String {
        let f = |name| field(record, name).unwrap_or_default();
        match self {
            Kind::Vhost => format!("vhost \"{}\"", f("name")),
            Kind::User => format!("user \"{}\"", f("name")),
            Kind::Queue | Kind::Exchange => {
                format!("{self} \"{}\" in vhost \"{}\"", f("name"), f("vhost"))
            }
            Kind::Binding => format!(
                "binding from \"{}\" to {} \"{}\" in vhost \"{}\"",
                f("source"),
                f("destination_type"),
                f("destination"),
                f("vhost")
            ),
            Kind::Permission => {
                format!("permission for user \"{}\" in vhost \"{}\"", f("user"), f("vhost"))
            }
            Kind::TopicPermission => format!(
                "topic permission for user \"{}\" on exchange \"{}\" in vhost \"{}\"",
                f("user"),
                f("exchange"),
                f("vhost")
            ),
        }
    }
}

impl Keyer for Kind {
    fn key(&self, record: &Value) -> Result<String> {
        let kind = *self;
        match kind {
            Kind::Vhost => Ok(vhost_key(required(kind, record, "name")?)),
            Kind::User => Ok(user_key(required(kind, record, "name")?)),
            Kind::Queue => Ok(queue_key(
                required(kind, record, "vhost")?,
                required(kind, record, "name")?,
            )),
            Kind::Exchange => Ok(exchange_key(
                required(kind, record, "vhost")?,
                required(kind, record, "name")?,
            )),
            Kind::Binding => {
                let destination_type = required(kind, record, "destination_type")?;
                if destination_kind(destination_type).is_none() {
                    return Err(Error::indexing(kind, "destination_type"));
                }
                let arguments = canonical_arguments(record.get("arguments"))
                    .ok_or_else(|| Error::indexing(kind, "arguments"))?;
                Ok(join_key(&[
                    required(kind, record, "vhost")?,
                    optional(kind, record, "source")?,
                    destination_type,
                    required(kind, record, "destination")?,
                    optional(kind, record, "routing_key")?,
                    &arguments,
                ]))
            }
            Kind::Permission => Ok(join_key(&[
                required(kind, record, "vhost")?,
                required(kind, record, "user")?,
            ])),
            Kind::TopicPermission => Ok(join_key(&[
                required(kind, record, "vhost")?,
                required(kind, record, "user")?,
                optional(kind, record, "exchange")?,
            ])),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Vhost => "vhost",
            Kind::Queue => "queue",
            Kind::Exchange => "exchange",
            Kind::Binding => "binding",
            Kind::User => "user",
            Kind::Permission => "permission",
            Kind::TopicPermission => "topic permission",
        };
        write!(f, "{name}")
    }
}

/// Fields a vhost record may carry besides its name.
const VHOST_METADATA: [&str; 6] = [
    "description",
    "tags",
    "metadata",
    "default_queue_type",
    "limits",
    "protected_from_deletion",
];

/// Read a string field from a record.
pub fn field<'a>(record: &'a Value, name: &str) -> Option<&'a str> {
    record.get(name).and_then(Value::as_str)
}

/// Kind named by a binding's `destination_type`.
pub fn destination_kind(destination_type: &str) -> Option<Kind> {
    match destination_type {
        "queue" => Some(Kind::Queue),
        "exchange" => Some(Kind::Exchange),
        _ => None,
    }
}

fn required<'a>(kind: Kind, record: &'a Value, name: &'static str) -> Result<&'a str> {
    field(record, name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::indexing(kind, name))
}

// Empty is meaningful here: the default exchange, an empty routing key, a
// topic permission covering every exchange.
fn optional<'a>(kind: Kind, record: &'a Value, name: &'static str) -> Result<&'a str> {
    match record.get(name) {
        None | Some(Value::Null) => Ok(""),
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(Error::indexing(kind, name)),
    }
}

fn join_key(parts: &[&str]) -> String {
    Value::Array(
        parts
            .iter()
            .map(|part| Value::String((*part).to_string()))
            .collect(),
    )
    .to_string()
}

/// Key of the vhost with this name.
pub fn vhost_key(name: &str) -> String {
    join_key(&[name])
}

/// Key of the user with this name.
pub fn user_key(name: &str) -> String {
    join_key(&[name])
}

/// Key of a queue.
pub fn queue_key(vhost: &str, name: &str) -> String {
    join_key(&[vhost, name])
}

/// Key of an exchange.
pub fn exchange_key(vhost: &str, name: &str) -> String {
    join_key(&[vhost, name])
}

/// Order-independent serialization of a binding's argument table.
///
/// Names are sorted before joining `name=value` pairs, so two tables with
/// the same entries always serialize identically. Absent and `null`
/// arguments mean an empty table. Returns `None` for a non-object value.
pub fn canonical_arguments(arguments: Option<&Value>) -> Option<String> {
    let map: &Map<String, Value> = match arguments {
        None | Some(Value::Null) => return Some(String::new()),
        Some(Value::Object(map)) => map,
        Some(_) => return None,
    };
    let mut names: Vec<&String> = map.keys().collect();
    names.sort();
    let pairs: Vec<String> = names
        .into_iter()
        .map(|name| format!("{}={}", Value::String(name.clone()), map[name]))
        .collect();
    Some(pairs.join("&"))
}

/// One value per resource kind, serialized under the document array names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KindMap<T> {
    pub vhosts: T,
    pub queues: T,
    pub exchanges: T,
    pub bindings: T,
    pub users: T,
    pub permissions: T,
    pub topic_permissions: T,
}

impl<T> KindMap<T> {
    /// Build a map by computing the value of every kind.
    pub fn from_fn(mut f: impl FnMut(Kind) -> T) -> Self {
        Self {
            vhosts: f(Kind::Vhost),
            queues: f(Kind::Queue),
            exchanges: f(Kind::Exchange),
            bindings: f(Kind::Binding),
            users: f(Kind::User),
            permissions: f(Kind::Permission),
            topic_permissions: f(Kind::TopicPermission),
        }
    }

    pub fn get(&self, kind: Kind) -> &T {
        match kind {
            Kind::Vhost => &self.vhosts,
            Kind::Queue => &self.queues,
            Kind::Exchange => &self.exchanges,
            Kind::Binding => &self.bindings,
            Kind::User => &self.users,
            Kind::Permission => &self.permissions,
            Kind::TopicPermission => &self.topic_permissions,
        }
    }

    pub fn get_mut(&mut self, kind: Kind) -> &mut T {
        match kind {
            Kind::Vhost => &mut self.vhosts,
            Kind::Queue => &mut self.queues,
            Kind::Exchange => &mut self.exchanges,
            Kind::Binding => &mut self.bindings,
            Kind::User => &mut self.users,
            Kind::Permission => &mut self.permissions,
            Kind::TopicPermission => &mut self.topic_permissions,
        }
    }

    /// Iterate in document order.
    pub fn iter(&self) -> impl Iterator<Item = (Kind, &T)> {
        Kind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plural_round_trip() {
        for kind in Kind::ALL {
            assert_eq!(Kind::from_plural(kind.plural()).unwrap(), kind);
        }
        assert!(matches!(
            Kind::from_plural("invalid"),
            Err(Error::UnknownKind(name)) if name == "invalid"
        ));
    }

    #[test]
    fn test_classify_by_shape() {
        let cases = [
            (
                json!({"vhost": "/", "source": "ex", "destination": "q", "destination_type": "queue"}),
                Kind::Binding,
            ),
            (json!({"name": "ex", "vhost": "/", "type": "topic"}), Kind::Exchange),
            (json!({"name": "q", "vhost": "/", "durable": true}), Kind::Queue),
            (json!({"name": "admin", "password_hash": "x"}), Kind::User),
            (
                json!({"user": "u", "vhost": "/", "configure": ".*", "write": ".*", "read": ".*"}),
                Kind::Permission,
            ),
            (
                json!({"user": "u", "vhost": "/", "exchange": "ex", "write": ".*", "read": ".*"}),
                Kind::TopicPermission,
            ),
            (json!({"name": "/"}), Kind::Vhost),
            (json!({"name": "/", "description": "root", "tags": []}), Kind::Vhost),
        ];
        for (record, expected) in cases {
            assert_eq!(Kind::classify(&record).unwrap(), expected, "{record}");
        }
    }

    #[test]
    fn test_classify_unknown() {
        assert!(matches!(
            Kind::classify(&json!({"name": "x", "colour": "red"})),
            Err(Error::UnknownResource { .. })
        ));
        assert!(Kind::classify(&json!("vhost")).is_err());
    }

    #[test]
    fn test_key_missing_field() {
        let err = Kind::Queue.key(&json!({"name": "q"})).unwrap_err();
        assert!(matches!(
            err,
            Error::Indexing { kind: Kind::Queue, field: "vhost", .. }
        ));
    }

    #[test]
    fn test_key_rejects_empty_name() {
        assert!(Kind::Vhost.key(&json!({"name": ""})).is_err());
    }

    #[test]
    fn test_key_delimiters_do_not_collide() {
        let a = Kind::Queue.key(&json!({"name": "a\",\"b", "vhost": "c"})).unwrap();
        let b = Kind::Queue.key(&json!({"name": "a", "vhost": "b\",\"c"})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_binding_key_ignores_argument_order() {
        let first = json!({
            "vhost": "/", "source": "ex", "destination": "q", "destination_type": "queue",
            "routing_key": "", "arguments": {"a": 1, "b": 2}
        });
        let mut second = first.clone();
        second["arguments"] = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        assert_eq!(
            Kind::Binding.key(&first).unwrap(),
            Kind::Binding.key(&second).unwrap()
        );
    }

    #[test]
    fn test_binding_key_defaults() {
        let bare = json!({"vhost": "/", "source": "ex", "destination": "q", "destination_type": "queue"});
        let explicit = json!({
            "vhost": "/", "source": "ex", "destination": "q", "destination_type": "queue",
            "routing_key": "", "arguments": {}
        });
        assert_eq!(
            Kind::Binding.key(&bare).unwrap(),
            Kind::Binding.key(&explicit).unwrap()
        );
    }

    #[test]
    fn test_binding_key_rejects_bad_destination_type() {
        let record = json!({"vhost": "/", "source": "ex", "destination": "q", "destination_type": "topic"});
        assert!(matches!(
            Kind::Binding.key(&record),
            Err(Error::Indexing { field: "destination_type", .. })
        ));
    }

    #[test]
    fn test_canonical_arguments() {
        assert_eq!(canonical_arguments(None).unwrap(), "");
        assert_eq!(canonical_arguments(Some(&Value::Null)).unwrap(), "");
        assert_eq!(
            canonical_arguments(Some(&json!({"x-match": "any", "h1": "v1"}))).unwrap(),
            r#""h1"="v1"&"x-match"="any""#
        );
        assert!(canonical_arguments(Some(&json!([1, 2]))).is_none());
    }

    #[test]
    fn test_describe() {
        let queue = json!({"name": "q1", "vhost": "/"});
        assert_eq!(Kind::Queue.describe(&queue), "queue \"q1\" in vhost \"/\"");
        let tp = json!({"user": "u", "vhost": "/", "exchange": "ex"});
        assert!(Kind::TopicPermission.describe(&tp).starts_with("topic permission"));
    }

    #[test]
    fn test_kind_map_serializes_plural_names() {
        let map: KindMap<usize> = KindMap::from_fn(|kind| kind as usize);
        let value = serde_json::to_value(&map).unwrap();
        assert_eq!(value["topic_permissions"], 6);
        assert_eq!(*map.get(Kind::Exchange), 2);
        assert_eq!(map.iter().count(), 7);
    }

    #[test]
    fn test_kind_map_rejects_unknown_names() {
        let parsed: std::result::Result<KindMap<Vec<Value>>, _> =
            serde_json::from_value(json!({"invalid": []}));
        assert!(parsed.unwrap_err().to_string().contains("invalid"));
    }
}
