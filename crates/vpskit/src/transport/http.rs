//! HTTP transport backed by `ureq`.

use super::{Method, Transport};
use crate::error::{Error, Result};
use serde_json::Value;
use std::time::Duration;
use ureq::Body;
use ureq::http::Response;

/// Bearer-token JSON transport for one vendor API.
///
/// # Example
///
/// ```no_run
/// use vpskit::transport::{HttpTransport, Transport};
///
/// let transport = HttpTransport::new("hetzner", "https://api.hetzner.cloud/v1", "token");
/// let locations = transport.get("locations").unwrap();
/// println!("{}", locations["locations"]);
/// ```
pub struct HttpTransport {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// Provider key, used in error messages.
    provider: String,
    /// API base URL.
    api_base: String,
    /// Bearer token.
    token: String,
}

impl HttpTransport {
    /// Create a transport with a 60s request timeout.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        api_base: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(60)))
            .build()
            .into();
        Self {
            agent,
            provider: provider.into(),
            api_base: api_base.into(),
            token: token.into(),
        }
    }

    /// Get the current API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

impl HttpTransport {
    fn decode(&self, method: Method, endpoint: &str, mut response: Response<Body>) -> Result<Value> {
        let status = response.status();
        let text = response.body_mut().read_to_string()?;

        if !status.is_success() {
            log::debug!("{} {} -> {}: {}", method, endpoint, status, text);
            return Err(Error::Provider {
                provider: self.provider.clone(),
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message: vendor_message(&text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl Transport for HttpTransport {
    fn request(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url(endpoint);
        let auth = format!("Bearer {}", self.token);
        log::debug!("{} {}", method, url);

        let response = match method {
            Method::Get => self
                .agent
                .get(&url)
                .header("Authorization", auth.as_str())
                .header("Accept", "application/json")
                .header("User-Agent", "devbox")
                .call()?,
            Method::Delete => self
                .agent
                .delete(&url)
                .header("Authorization", auth.as_str())
                .header("Accept", "application/json")
                .header("User-Agent", "devbox")
                .call()?,
            Method::Post => self
                .agent
                .post(&url)
                .header("Authorization", auth.as_str())
                .header("Accept", "application/json")
                .header("User-Agent", "devbox")
                .send_json(body.unwrap_or(&Value::Null))?,
        };

        self.decode(method, endpoint, response)
    }

    fn get_query(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = self.url(endpoint);
        let auth = format!("Bearer {}", self.token);
        log::debug!("GET {} {:?}", url, query);

        let response = self
            .agent
            .get(&url)
            .header("Authorization", auth.as_str())
            .header("Accept", "application/json")
            .header("User-Agent", "devbox")
            .query_pairs(query.iter().copied())
            .call()?;

        self.decode(Method::Get, endpoint, response)
    }
}

/// Pull the human-readable message out of a vendor error body.
fn vendor_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    [
        "/error/message", // hetzner
        "/message",       // digitalocean
        "/error",         // vultr
        "/errors/0/reason", // linode
    ]
    .iter()
    .find_map(|ptr| value.pointer(ptr).and_then(Value::as_str))
    .map(str::to_string)
    .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Answer one request with `{}` and hand back its request line
    fn one_shot_server() -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut header = String::new();
            while reader.read_line(&mut header).unwrap() > 2 {
                header.clear();
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}")
                .unwrap();
            request_line
        });
        (base, handle)
    }

    #[test]
    fn test_query_values_are_encoded() {
        let (base, server) = one_shot_server();
        let t = HttpTransport::new("vultr", base, "x");
        let body = t
            .get_query("plans", &[("cursor", "bmV4dA== &x")])
            .unwrap();
        assert_eq!(body, serde_json::json!({}));

        let request_line = server.join().unwrap();
        assert!(
            request_line.starts_with("GET /plans?cursor=bmV4dA%3D%3D"),
            "{request_line}"
        );
        assert!(!request_line.contains(" &x"), "{request_line}");
    }

    #[test]
    fn test_url_joining() {
        let t = HttpTransport::new("vultr", "https://api.vultr.com/v2/", "x");
        assert_eq!(t.url("/instances"), "https://api.vultr.com/v2/instances");
        assert_eq!(t.url("plans?cursor=abc"), "https://api.vultr.com/v2/plans?cursor=abc");
    }

    #[test]
    fn test_vendor_message_shapes() {
        assert_eq!(
            vendor_message(r#"{"error":{"code":"uniqueness_error","message":"SSH key not unique"}}"#),
            "SSH key not unique"
        );
        assert_eq!(vendor_message(r#"{"id":"not_found","message":"gone"}"#), "gone");
        assert_eq!(vendor_message(r#"{"error":"Invalid plan","status":400}"#), "Invalid plan");
        assert_eq!(
            vendor_message(r#"{"errors":[{"reason":"Not found"}]}"#),
            "Not found"
        );
        assert_eq!(vendor_message("Bad Gateway\n"), "Bad Gateway");
    }
}
