//! Management API routes per resource kind and operation.

use crate::error::{Error, Method, Result};
use definitions::Kind;
use definitions::kind::field;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// What a deploy step does to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create the resource.
    Add,
    /// Delete the resource.
    Delete,
    /// Update the resource in place.
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "added",
            Self::Delete => "deleted",
            Self::Update => "changed",
        };
        write!(f, "{name}")
    }
}

/// A management API request, before it is sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedRequest {
    pub method: Method,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl fmt::Display for PlannedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Build an API path from percent-encoded segments.
pub fn api_path(segments: &[&str]) -> String {
    let mut path = String::from("/api");
    for segment in segments {
        path.push('/');
        path.push_str(&urlencoding::encode(segment));
    }
    path
}

fn resource_path(kind: Kind, record: &Value) -> String {
    let f = |name| field(record, name).unwrap_or_default();
    match kind {
        Kind::Vhost => api_path(&["vhosts", f("name")]),
        Kind::User => api_path(&["users", f("name")]),
        Kind::Queue => api_path(&["queues", f("vhost"), f("name")]),
        Kind::Exchange => api_path(&["exchanges", f("vhost"), f("name")]),
        Kind::Binding => {
            let destination_type = if f("destination_type") == "exchange" { "e" } else { "q" };
            api_path(&[
                "bindings",
                f("vhost"),
                "e",
                f("source"),
                destination_type,
                f("destination"),
            ])
        }
        Kind::Permission => api_path(&["permissions", f("vhost"), f("user")]),
        Kind::TopicPermission => api_path(&["topic-permissions", f("vhost"), f("user")]),
    }
}

/// The request performing `operation` on `record`.
///
/// Bindings are deleted by `properties_key`; a binding without one is
/// addressed as `~`, which only matches a binding with an empty routing
/// key and no arguments.
///
/// # Errors
///
/// Returns `Error::Unsupported` for in-place updates of kinds the broker
/// treats as immutable.
pub fn request_for(operation: Operation, kind: Kind, record: &Value) -> Result<PlannedRequest> {
    let path = resource_path(kind, record);
    let request = match (operation, kind) {
        (Operation::Add, Kind::Binding) => PlannedRequest {
            method: Method::Post,
            path,
            body: Some(record.clone()),
        },
        (Operation::Add, _)
        | (Operation::Update, Kind::User | Kind::Permission | Kind::TopicPermission) => {
            PlannedRequest {
                method: Method::Put,
                path,
                body: Some(record.clone()),
            }
        }
        (Operation::Delete, Kind::Binding) => {
            let properties_key = field(record, "properties_key").unwrap_or("~");
            PlannedRequest {
                method: Method::Delete,
                path: format!("{path}/{}", urlencoding::encode(properties_key)),
                body: None,
            }
        }
        (Operation::Delete, _) => PlannedRequest {
            method: Method::Delete,
            path,
            body: None,
        },
        (Operation::Update, _) => {
            return Err(Error::Unsupported {
                operation: "update".to_string(),
                kind: kind.to_string(),
            });
        }
    };
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segments_are_encoded() {
        assert_eq!(api_path(&["vhosts", "/"]), "/api/vhosts/%2F");
        assert_eq!(api_path(&["queues", "a b", "c/d"]), "/api/queues/a%20b/c%2Fd");
    }

    #[test]
    fn test_add_routes() {
        let cases = [
            (Kind::Vhost, json!({"name": "/"}), Method::Put, "/api/vhosts/%2F"),
            (Kind::User, json!({"name": "app"}), Method::Put, "/api/users/app"),
            (
                Kind::Queue,
                json!({"name": "q", "vhost": "/"}),
                Method::Put,
                "/api/queues/%2F/q",
            ),
            (
                Kind::Exchange,
                json!({"name": "ex", "vhost": "v"}),
                Method::Put,
                "/api/exchanges/v/ex",
            ),
            (
                Kind::Permission,
                json!({"user": "app", "vhost": "/"}),
                Method::Put,
                "/api/permissions/%2F/app",
            ),
            (
                Kind::TopicPermission,
                json!({"user": "app", "vhost": "/", "exchange": "ex"}),
                Method::Put,
                "/api/topic-permissions/%2F/app",
            ),
        ];
        for (kind, record, method, path) in cases {
            let request = request_for(Operation::Add, kind, &record).unwrap();
            assert_eq!(request.method, method);
            assert_eq!(request.path, path);
            assert_eq!(request.body, Some(record));
        }
    }

    #[test]
    fn test_binding_routes() {
        let binding = json!({"vhost": "/", "source": "ex", "destination": "other",
                             "destination_type": "exchange", "routing_key": "rk", "arguments": {}});
        let add = request_for(Operation::Add, Kind::Binding, &binding).unwrap();
        assert_eq!(add.method, Method::Post);
        assert_eq!(add.path, "/api/bindings/%2F/e/ex/e/other");

        let delete = request_for(Operation::Delete, Kind::Binding, &binding).unwrap();
        assert_eq!(delete.path, "/api/bindings/%2F/e/ex/e/other/~");
        assert!(delete.body.is_none());

        let mut keyed = binding.clone();
        keyed["destination_type"] = json!("queue");
        keyed["properties_key"] = json!("rk");
        let delete = request_for(Operation::Delete, Kind::Binding, &keyed).unwrap();
        assert_eq!(delete.path, "/api/bindings/%2F/e/ex/q/other/rk");
    }

    #[test]
    fn test_update_routes() {
        let user = json!({"name": "app", "tags": []});
        let update = request_for(Operation::Update, Kind::User, &user).unwrap();
        assert_eq!(update.method, Method::Put);
        let queue = json!({"name": "q", "vhost": "/"});
        assert!(matches!(
            request_for(Operation::Update, Kind::Queue, &queue),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Add.to_string(), "added");
        assert_eq!(Operation::Update.to_string(), "changed");
    }
}
