//! Vendor API transport.
//!
//! The [`Transport`] trait sends one JSON request to a vendor API and
//! returns the decoded body, allowing for different implementations (real
//! HTTP, mock for testing).
//!
//! # Testing
//!
//! Use [`MockTransport`] for testing without network access:
//!
//! ```
//! use vpskit::transport::{Method, MockTransport, Transport};
//! use serde_json::json;
//!
//! let mock = MockTransport::new("hetzner")
//!     .on(Method::Get, "locations", json!({ "locations": [] }));
//!
//! let body = mock.get("locations").unwrap();
//! assert_eq!(body["locations"], json!([]));
//! assert!(mock.get("servers").is_err());
//! ```

pub mod http;

pub use self::http::HttpTransport;

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST with a JSON body
    Post,
    /// DELETE
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Sends JSON requests to one vendor API.
///
/// `endpoint` is relative to the API base and may carry a fixed query
/// string. Values that come from a vendor, such as pagination cursors, go
/// through [`Transport::get_query`] so the transport encodes them.
/// Non-success statuses come back as [`Error::Provider`]; an empty body
/// decodes to `Value::Null`.
pub trait Transport: Send + Sync {
    /// Send one request.
    fn request(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Result<Value>;

    /// GET an endpoint with query parameters appended.
    fn get_query(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value>;

    /// GET an endpoint.
    fn get(&self, endpoint: &str) -> Result<Value> {
        self.request(Method::Get, endpoint, None)
    }

    /// POST a JSON body.
    fn post(&self, endpoint: &str, body: &Value) -> Result<Value> {
        self.request(Method::Post, endpoint, Some(body))
    }

    /// DELETE an endpoint, discarding any body.
    fn delete(&self, endpoint: &str) -> Result<()> {
        self.request(Method::Delete, endpoint, None).map(|_| ())
    }
}

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Method used.
    pub method: Method,
    /// Endpoint, including query string.
    pub endpoint: String,
    /// JSON body, for POST.
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
enum MockReply {
    Json(Value),
    Status(u16, String),
}

/// Mock transport for testing without network access.
///
/// Replies are queued per `(method, endpoint)`. Each request pops the
/// front reply; the last reply is sticky, so a route answered once keeps
/// answering the same way. Unknown routes return a 404 provider error.
///
/// Query parameters passed to [`Transport::get_query`] are joined onto the
/// endpoint unencoded (`plans?cursor=a=b`), so routes name the values as
/// the vendor sent them.
#[derive(Debug, Clone)]
pub struct MockTransport {
    provider: String,
    routes: Arc<Mutex<HashMap<(Method, String), VecDeque<MockReply>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockTransport {
    /// Create an empty mock for `provider`.
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            routes: Arc::default(),
            requests: Arc::default(),
        }
    }

    /// Queue a JSON reply.
    #[must_use]
    pub fn on(self, method: Method, endpoint: impl Into<String>, body: Value) -> Self {
        self.push(method, endpoint.into(), MockReply::Json(body));
        self
    }

    /// Queue an error status reply.
    #[must_use]
    pub fn on_status(
        self,
        method: Method,
        endpoint: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        self.push(method, endpoint.into(), MockReply::Status(status, message.into()));
        self
    }

    fn push(&self, method: Method, endpoint: String, reply: MockReply) {
        let mut routes = self.routes.lock().unwrap();
        routes.entry((method, endpoint)).or_default().push_back(reply);
    }

    /// All requests made so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests made to one route.
    pub fn count(&self, method: Method, endpoint: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.endpoint == endpoint)
            .count()
    }

    /// Body of the last POST to `endpoint`.
    pub fn last_body(&self, endpoint: &str) -> Option<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.method == Method::Post && r.endpoint == endpoint)
            .and_then(|r| r.body.clone())
    }
}

impl Transport for MockTransport {
    fn request(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Result<Value> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            endpoint: endpoint.to_string(),
            body: body.cloned(),
        });

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            routes
                .get_mut(&(method, endpoint.to_string()))
                .and_then(|queue| {
                    if queue.len() > 1 {
                        queue.pop_front()
                    } else {
                        queue.front().cloned()
                    }
                })
        };

        match reply {
            Some(MockReply::Json(value)) => Ok(value),
            Some(MockReply::Status(status, message)) => Err(Error::Provider {
                provider: self.provider.clone(),
                endpoint: endpoint.to_string(),
                status,
                message,
            }),
            None => Err(Error::Provider {
                provider: self.provider.clone(),
                endpoint: endpoint.to_string(),
                status: 404,
                message: format!("no mock route for {method} {endpoint}"),
            }),
        }
    }

    fn get_query(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value> {
        let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        self.get(&format!("{endpoint}{separator}{}", pairs.join("&")))
    }
}
