//! HTTP utilities for OpenStack REST API calls

use crate::wait::MissingResource;
use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Status codes that mean the resource no longer exists
const MISSING_STATUS_CODES: &[StatusCode] = &[StatusCode::NOT_FOUND, StatusCode::GONE];

/// Header carrying the Keystone token
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Non-success response from the API
#[derive(Debug, Error)]
#[error("API request failed: {status}{}", describe_message(.message))]
pub struct ApiError {
    pub status: StatusCode,
    /// `message` field of the fault body, when the API sent one
    pub message: Option<String>,
}

fn describe_message(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(" ({})", m),
        None => String::new(),
    }
}

impl MissingResource for ApiError {
    fn is_missing(&self) -> bool {
        MISSING_STATUS_CODES.contains(&self.status)
    }
}

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull the message out of an OpenStack fault body.
///
/// Faults look like `{"itemNotFound": {"code": 404, "message": "..."}}`.
fn fault_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .as_object()?
        .values()
        .find_map(|fault| fault.get("message"))
        .and_then(|m| m.as_str())
        .map(|m| m.chars().take(MAX_LOG_BODY_LENGTH).collect())
}

/// HTTP client wrapper for OpenStack API calls
#[derive(Clone)]
pub struct OsHttpClient {
    client: Client,
}

impl OsHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("osvol/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        self.execute(Method::GET, url, token, None).await
    }

    pub async fn post(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value> {
        self.execute(Method::POST, url, token, body).await
    }

    pub async fn put(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value> {
        self.execute(Method::PUT, url, token, body).await
    }

    pub async fn delete(&self, url: &str, token: &str) -> Result<Value> {
        self.execute(Method::DELETE, url, token, None).await
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, token)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            // Only log sanitized/truncated error body
            if MISSING_STATUS_CODES.contains(&status) {
                tracing::debug!("API error: {} - {}", status, sanitize_for_log(&response_body));
            } else {
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            }
            return Err(ApiError {
                status,
                message: fault_message(&response_body),
            }
            .into());
        }

        // DELETE and some actions answer 202 with no body
        if response_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response_body).context("Failed to parse response JSON")
    }
}

/// Short hint for an API failure, if the error chain carries one
pub fn api_error_hint(error: &anyhow::Error) -> Option<&'static str> {
    let api = error.chain().find_map(|e| e.downcast_ref::<ApiError>())?;

    let hint = match api.status {
        StatusCode::UNAUTHORIZED => "Authentication failed. Check OS_AUTH_TOKEN.",
        StatusCode::FORBIDDEN => "Permission denied. Check your project role assignments.",
        StatusCode::NOT_FOUND | StatusCode::GONE => "Resource not found.",
        StatusCode::PAYLOAD_TOO_LARGE => "Quota exceeded or request too large.",
        StatusCode::TOO_MANY_REQUESTS => "Rate limit exceeded. Please try again later.",
        StatusCode::BAD_REQUEST => "Invalid request. Check your parameters.",
        StatusCode::CONFLICT => "Resource conflict. The volume may be attached or in use.",
        s if s.is_server_error() => "Block storage service temporarily unavailable.",
        _ => return None,
    };

    Some(hint)
}
