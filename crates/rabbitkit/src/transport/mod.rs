//! Transports carrying management API requests.
//!
//! This module provides the [`Transport`] trait and implementations for
//! reaching a broker. The primary implementation is [`http::HttpTransport`].
//!
//! # Testing
//!
//! Use [`MockTransport`] for testing without network access:
//!
//! ```
//! use rabbitkit::transport::{MockTransport, Transport};
//! use rabbitkit::Method;
//! use serde_json::json;
//!
//! let mock = MockTransport::new();
//! mock.respond("/api/bindings", json!([]));
//!
//! let body = mock.send(Method::Get, "/api/bindings", None).unwrap();
//! assert_eq!(body, "[]");
//! assert_eq!(mock.calls().len(), 1);
//! ```

pub mod http;

use crate::error::{Error, Method, Result};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Transport for management API requests.
///
/// Implementations must be shareable across threads, since a deploy
/// issues the requests of one batch concurrently.
pub trait Transport: Send + Sync {
    /// Send one request and return the response body.
    ///
    /// `path` starts with `/api/` and is already percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns `Error::Request` if the broker answers with a status of 300
    /// or above, and `Error::Transport` if no answer arrived.
    fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<String>;
}

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// In-memory transport for testing.
///
/// Records every call, answers GET requests from canned responses and
/// fails requests it was told to fail.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    calls: Arc<Mutex<Vec<Call>>>,
    responses: Arc<Mutex<HashMap<String, Value>>>,
    failures: Arc<Mutex<HashMap<(Method, String), u16>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// Create a new mock transport with no responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock broker serving `definitions` and `bindings`.
    #[must_use]
    pub fn with_state(definitions: Value, bindings: Value) -> Self {
        let mock = Self::new();
        mock.respond("/api/definitions", definitions);
        mock.respond("/api/bindings", bindings);
        mock
    }

    /// Serve `body` for GET requests to `path`.
    pub fn respond(&self, path: impl Into<String>, body: Value) {
        lock(&self.responses).insert(path.into(), body);
    }

    /// Answer requests with `method` to `path` with an error status.
    pub fn fail(&self, method: Method, path: impl Into<String>, status: u16) {
        lock(&self.failures).insert((method, path.into()), status);
    }

    /// Every call so far, in arrival order.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Calls that would change broker state.
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.method.is_mutating())
            .collect()
    }
}

impl Transport for MockTransport {
    fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<String> {
        lock(&self.calls).push(Call {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });

        let failure = lock(&self.failures).get(&(method, path.to_string())).copied();
        if let Some(status) = failure {
            return Err(Error::Request {
                status,
                method,
                url: format!("mock://{path}"),
                body: body.cloned(),
                response: json!({"error": "mock failure", "reason": format!("HTTP {status}")}),
            });
        }

        match method {
            Method::Get => lock(&self.responses)
                .get(path)
                .map(Value::to_string)
                .ok_or_else(|| Error::Request {
                    status: 404,
                    method,
                    url: format!("mock://{path}"),
                    body: None,
                    response: json!({"error": "Object Not Found", "reason": "Not Found"}),
                }),
            _ => Ok(String::new()),
        }
    }
}
