//! REST Client
//!
//! Issues Google API calls through a [`Transport`] (live, recording or
//! replaying), attaching auth, user agent and billing headers, retrying
//! transient failures and decoding JSON.

use super::auth::TokenSource;
use super::http::{error_message, sanitize_for_log, HttpRequest, Transport};
use super::retry::RetryPolicy;
use crate::error::{ApiError, Error, Result};
use serde_json::Value;
use std::sync::Arc;

/// Per-call options
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Retry POST/PATCH/PUT/DELETE on transient failures too
    pub retry_non_idempotent: bool,
}

/// Client for Google REST APIs
#[derive(Clone)]
pub struct RestClient {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenSource>,
    retry: RetryPolicy,
}

impl RestClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenSource>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            tokens,
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send a request and decode the JSON response.
    ///
    /// `billing_project` is attached as `X-Goog-User-Project` when non-empty.
    /// An empty 2xx body decodes to `Value::Null`.
    pub async fn send(
        &self,
        method: &str,
        billing_project: &str,
        url: &str,
        user_agent: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        self.send_with(
            method,
            billing_project,
            url,
            user_agent,
            body,
            RequestOptions::default(),
        )
        .await
    }

    pub async fn get(&self, billing_project: &str, url: &str, user_agent: &str) -> Result<Value> {
        self.send("GET", billing_project, url, user_agent, None).await
    }

    pub async fn post(
        &self,
        billing_project: &str,
        url: &str,
        user_agent: &str,
        body: &Value,
    ) -> Result<Value> {
        self.send("POST", billing_project, url, user_agent, Some(body))
            .await
    }

    pub async fn delete(&self, billing_project: &str, url: &str, user_agent: &str) -> Result<Value> {
        self.send("DELETE", billing_project, url, user_agent, None)
            .await
    }

    /// [`send`](Self::send) with explicit options
    pub async fn send_with(
        &self,
        method: &str,
        billing_project: &str,
        url: &str,
        user_agent: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        let token = self.tokens.token().await?;

        let mut request = HttpRequest::new(method, url)
            .header("authorization", &format!("Bearer {}", token))
            .header("user-agent", user_agent);
        if !billing_project.is_empty() {
            request = request.header("x-goog-user-project", billing_project);
        }
        if let Some(body) = body {
            let encoded = serde_json::to_string(body).map_err(|source| Error::Decode {
                url: url.to_string(),
                source,
            })?;
            request = request
                .header("content-type", "application/json")
                .body(encoded);
        }

        let retryable = request.is_idempotent() || options.retry_non_idempotent;
        let max_attempts = if retryable {
            self.retry.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt(&request).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt - 1);
                    tracing::warn!(
                        method = %request.method,
                        url = %request.url,
                        attempt = attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Transient API failure, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, request: &HttpRequest) -> Result<Value> {
        let response = self.transport.round_trip(request).await?;

        if !response.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!(
                "API error: {} {} - {} - {}",
                request.method,
                request.url,
                response.status,
                sanitize_for_log(&response.body)
            );
            return Err(Error::Api(ApiError {
                code: response.status,
                message: error_message(response.status, &response.body),
                url: request.url.clone(),
            }));
        }

        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response.body).map_err(|source| Error::Decode {
            url: request.url.clone(),
            source,
        })
    }
}
