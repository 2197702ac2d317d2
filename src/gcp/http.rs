//! HTTP transport for GCP REST API calls
//!
//! Requests and responses are plain owned values so they can be recorded,
//! compared, and replayed by the cassette layer without a live connection.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut cut = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// An outbound HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// First header value with the given (case-insensitive) name
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// GET, HEAD, OPTIONS are safe to repeat
    pub fn is_idempotent(&self) -> bool {
        matches!(self.method.as_str(), "GET" | "HEAD" | "OPTIONS")
    }
}

/// A received HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that turns a request into a response
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Live transport backed by reqwest
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport whose every call is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn round_trip(&self, request: &HttpRequest) -> Result<HttpResponse> {
        tracing::debug!("{} {}", request.method, request.url);

        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            Error::Transport {
                url: request.url.clone(),
                message: format!("invalid method {}: {e}", request.method),
            }
        })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&request.url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(&request.url, e))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            url: url.to_string(),
        }
    } else {
        Error::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Extract a human-readable message from a Google error envelope.
///
/// Falls back to the HTTP reason phrase when the body is not the usual
/// `{"error": {"message": ...}}` shape.
pub fn error_message(status: u16, body: &str) -> String {
    let envelope: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = envelope.as_ref().and_then(|v| {
        let err = v.get("error")?;
        let message = err.get("message").and_then(|m| m.as_str())?;
        Some(match err.get("status").and_then(|s| s.as_str()) {
            Some(status) => format!("{message}, {status}"),
            None => message.to_string(),
        })
    });
    message.unwrap_or_else(|| {
        reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown status")
            .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "a".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("[truncated, 500 bytes total]"));
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        assert_eq!(sanitize_for_log("a\nb\tc"), "abc");
    }

    #[test]
    fn test_error_message_from_envelope() {
        let body = r#"{"error":{"code":404,"message":"The resource 'x' was not found","status":"NOT_FOUND"}}"#;
        assert_eq!(
            error_message(404, body),
            "The resource 'x' was not found, NOT_FOUND"
        );
    }

    #[test]
    fn test_error_message_falls_back_to_reason() {
        assert_eq!(error_message(503, "<html>oops</html>"), "Service Unavailable");
    }

    #[test]
    fn test_idempotent_methods() {
        assert!(HttpRequest::new("get", "u").is_idempotent());
        assert!(!HttpRequest::new("POST", "u").is_idempotent());
        assert!(!HttpRequest::new("DELETE", "u").is_idempotent());
    }
}
