//! Management API client.

use crate::error::{Error, Method, Result};
use crate::transport::Transport;
use crate::transport::http::HttpTransport;
use serde_json::{Value, json};
use std::sync::Arc;

/// Client for a broker's management API.
///
/// In dry-run mode every request that would change the broker is echoed
/// back instead of being sent; reads still go to the transport.
#[derive(Clone)]
pub struct ManagementClient {
    transport: Arc<dyn Transport>,
    dry_run: bool,
}

impl ManagementClient {
    /// Create a client over any transport.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            dry_run: false,
        }
    }

    /// Create a client for a broker URL, taking credentials from its userinfo.
    pub fn from_url(url: &str) -> Result<Self> {
        Ok(Self::new(HttpTransport::from_url(url)?))
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Send a request and parse the JSON response.
    ///
    /// An empty response body yields `Value::Null`.
    pub fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        if self.dry_run && method.is_mutating() {
            log::debug!("[dry run] {method} {path}");
            return Ok(json!({"method": method, "path": path, "body": body}));
        }
        log::debug!("{method} {path}");
        let text = self.transport.send(method, path, body)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Every binding on the broker, including `properties_key`.
    pub fn bindings(&self) -> Result<Vec<Value>> {
        match self.request(Method::Get, "/api/bindings", None)? {
            Value::Array(bindings) => Ok(bindings),
            other => Err(Error::InvalidResponse(format!(
                "expected a list of bindings, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// The broker's current definitions export.
    pub fn definitions(&self) -> Result<Value> {
        match self.request(Method::Get, "/api/definitions", None)? {
            definitions @ Value::Object(_) => Ok(definitions),
            other => Err(Error::InvalidResponse(format!(
                "expected a definitions object, got {}",
                kind_of(&other)
            ))),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
