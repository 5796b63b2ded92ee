//! Shared definitions documents for tests

use serde_json::{Value, json};

/// A valid document using every kind and every standard exchange type.
pub fn full() -> Value {
    json!({
        "rabbit_version": "3.13.7",
        "rabbitmq_version": "3.13.7",
        "product_name": "RabbitMQ",
        "product_version": "3.13.7",
        "vhosts": [
            {"name": "/", "description": "Default virtual host", "tags": [], "metadata": {"description": "Default virtual host", "tags": []}},
            {"name": "orders", "description": "", "tags": ["team-a"], "metadata": {"description": "", "tags": ["team-a"]}},
            {"name": "empty_vhost"}
        ],
        "users": [
            {"name": "admin", "password_hash": "kI3GCqW5JLMJa4iX1lo7X4D6XbYqlLgxIs30+P6tENUV2POR", "hashing_algorithm": "rabbit_password_hashing_sha256", "tags": ["administrator"], "limits": {}},
            {"name": "app", "password_hash": "a8d1pc5wQwE1Hq4aGdMBMKkd4wdvcpI2kIVm1kgyvHdcnzwE", "hashing_algorithm": "rabbit_password_hashing_sha256", "tags": [], "limits": {}}
        ],
        "permissions": [
            {"user": "admin", "vhost": "/", "configure": ".*", "write": ".*", "read": ".*"},
            {"user": "admin", "vhost": "orders", "configure": ".*", "write": ".*", "read": ".*"},
            {"user": "app", "vhost": "/", "configure": "", "write": "events", "read": ".*"},
            {"user": "app", "vhost": "orders", "configure": "", "write": "orders", "read": "orders\\..*"}
        ],
        "topic_permissions": [
            {"user": "app", "vhost": "/", "exchange": "events", "write": "events\\..*", "read": ".*"}
        ],
        "parameters": [],
        "global_parameters": [
            {"name": "cluster_name", "value": "rabbit@localhost"}
        ],
        "policies": [
            {"vhost": "/", "name": "ha", "pattern": "^ha\\.", "apply-to": "queues", "definition": {"ha-mode": "all"}, "priority": 0}
        ],
        "queues": [
            {"name": "defect_queue", "vhost": "/", "durable": true, "auto_delete": false, "arguments": {}},
            {"name": "events_queue", "vhost": "/", "durable": true, "auto_delete": false, "arguments": {"x-queue-type": "quorum"}},
            {"name": "broadcast_queue", "vhost": "/", "durable": false, "auto_delete": true, "arguments": {}},
            {"name": "orders.created", "vhost": "orders", "durable": true, "auto_delete": false, "arguments": {}}
        ],
        "exchanges": [
            {"name": "defect_headers", "vhost": "/", "type": "headers", "durable": true, "auto_delete": false, "internal": false, "arguments": {}},
            {"name": "defect_direct", "vhost": "/", "type": "direct", "durable": true, "auto_delete": false, "internal": false, "arguments": {}},
            {"name": "events", "vhost": "/", "type": "topic", "durable": true, "auto_delete": false, "internal": false, "arguments": {}},
            {"name": "broadcast", "vhost": "/", "type": "fanout", "durable": true, "auto_delete": false, "internal": false, "arguments": {}},
            {"name": "orders", "vhost": "orders", "type": "topic", "durable": true, "auto_delete": false, "internal": false, "arguments": {}}
        ],
        "bindings": [
            {"source": "defect_headers", "vhost": "/", "destination": "defect_queue", "destination_type": "queue", "routing_key": "", "arguments": {"x-match": "all", "type": "defect"}},
            {"source": "defect_direct", "vhost": "/", "destination": "defect_queue", "destination_type": "queue", "routing_key": "defect", "arguments": {}},
            {"source": "events", "vhost": "/", "destination": "events_queue", "destination_type": "queue", "routing_key": "events.#", "arguments": {}},
            {"source": "events", "vhost": "/", "destination": "broadcast", "destination_type": "exchange", "routing_key": "events.broadcast", "arguments": {}},
            {"source": "broadcast", "vhost": "/", "destination": "broadcast_queue", "destination_type": "queue", "routing_key": "", "arguments": {}},
            {"source": "orders", "vhost": "orders", "destination": "orders.created", "destination_type": "queue", "routing_key": "orders.created", "arguments": {}}
        ]
    })
}

/// The smallest document with one queue.
pub fn basic() -> Value {
    json!({
        "vhosts": [{"name": "/"}],
        "queues": [{"name": "q1", "vhost": "/", "durable": true, "auto_delete": false}],
        "exchanges": [],
        "bindings": [],
        "users": [],
        "permissions": [],
        "topic_permissions": []
    })
}

/// Remove records of `plural` matching `predicate` from a document.
pub fn without(mut document: Value, plural: &str, predicate: impl Fn(&Value) -> bool) -> Value {
    if let Some(records) = document.get_mut(plural).and_then(Value::as_array_mut) {
        records.retain(|record| !predicate(record));
    }
    document
}
