//! Shared JSON-over-HTTP plumbing for the network embedders and generators.
//!
//! Responses are classified once here so each provider decides what a
//! transient failure means for it (retry, or report unavailable):
//! - 2xx with a JSON body → [`Outcome::Success`]
//! - 429, 5xx, network errors, timeouts, undecodable bodies → [`Outcome::Transient`]
//! - any other 4xx → [`Outcome::Rejected`]

use std::time::Duration;

use docrag_core::{Error, Result};
use serde_json::Value;

#[derive(Debug)]
pub enum Outcome {
    Success(Value),
    Transient(String),
    Rejected(String),
}

pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))
}

/// Exponential backoff before retry `attempt` (1-based): 1s, 2s, 4s, ... capped at 32s.
pub fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
) -> Outcome {
    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body);
    if let Some(token) = bearer {
        request = request.header("Authorization", format!("Bearer {}", token));
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) if e.is_timeout() => return Outcome::Transient(format!("{} timed out: {}", url, e)),
        Err(e) => return Outcome::Transient(format!("cannot reach {}: {}", url, e)),
    };

    let status = response.status();
    if status.is_success() {
        return match response.json::<Value>().await {
            Ok(json) => Outcome::Success(json),
            Err(e) => Outcome::Transient(format!("invalid JSON from {}: {}", url, e)),
        };
    }

    let body_text = response.text().await.unwrap_or_default();
    if status.as_u16() == 429 || status.is_server_error() {
        Outcome::Transient(format!("{} returned {}: {}", url, status, body_text))
    } else {
        Outcome::Rejected(format!("{} returned {}: {}", url, status, body_text))
    }
}

/// Read a JSON array of numbers as an `f32` vector.
pub fn f32_array(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}
