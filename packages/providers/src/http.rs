//! HTTP client wrapper shared by all provider adapters.
//!
//! Translates transport-level failures into the shared error taxonomy:
//! the dispatcher never sees a reqwest error shape. Retries transient
//! failures (429, 5xx, connect, timeout) with exponential backoff and
//! capped attempts; client errors are not retried.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;

use companyatlas_core::error::{AtlasError, Result};

/// User agent string identifying this client.
const USER_AGENT: &str = concat!("companyatlas/", env!("CARGO_PKG_VERSION"));

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Create a configured HTTP client with a bounded timeout.
pub fn create_client(provider: &str, timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AtlasError::Upstream {
            provider: provider.to_string(),
            message: format!("failed to build HTTP client: {e}"),
        })
}

/// What kept the last attempt from succeeding, for the final error.
enum Transient {
    RateLimited,
    Timeout,
    Server(String),
    Connect(String),
}

/// GET a JSON document with retry and taxonomy translation.
///
/// Status mapping: 404 is `NotFound`; 401/403 is `MisconfiguredProvider`
/// (a rejected credential is a configuration problem, not a transient
/// one); 429 and 5xx are retried with backoff and surface as
/// `RateLimited`/`Upstream` once attempts are exhausted; timeouts
/// surface as `Timeout`.
pub fn get_json(
    client: &Client,
    provider: &str,
    url: &str,
    query: &[(&str, String)],
    headers: &[(&str, &str)],
) -> Result<Value> {
    let mut last_failure: Option<Transient> = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            // Exponential backoff: 500ms, 1000ms, 2000ms
            let delay = RETRY_BASE_DELAY_MS * (1 << (attempt - 1));
            tracing::debug!(provider, attempt, delay_ms = delay, "Retrying after delay");
            thread::sleep(Duration::from_millis(delay));
        }

        let mut request = client.get(url).query(query);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        match request.send() {
            Ok(response) => {
                let status = response.status();

                if status == StatusCode::TOO_MANY_REQUESTS {
                    tracing::warn!(
                        provider,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "Rate limited, will retry"
                    );
                    last_failure = Some(Transient::RateLimited);
                    continue;
                }

                if status.is_server_error() {
                    tracing::warn!(
                        provider,
                        status = %status,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "Server error, will retry"
                    );
                    last_failure = Some(Transient::Server(format!("server error: {status}")));
                    continue;
                }

                if status == StatusCode::NOT_FOUND {
                    return Err(AtlasError::NotFound);
                }

                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    return Err(AtlasError::MisconfiguredProvider {
                        provider: provider.to_string(),
                        missing: vec!["api_key".to_string()],
                    });
                }

                if !status.is_success() {
                    return Err(AtlasError::Upstream {
                        provider: provider.to_string(),
                        message: format!("unexpected status {status}"),
                    });
                }

                return response.json().map_err(|e| AtlasError::NormalizationError {
                    provider: provider.to_string(),
                    reason: format!("response body is not valid JSON: {e}"),
                });
            }
            Err(e) => {
                if e.is_timeout() {
                    tracing::warn!(
                        provider,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "Timeout, will retry"
                    );
                    last_failure = Some(Transient::Timeout);
                    continue;
                }
                if e.is_connect() {
                    tracing::warn!(
                        provider,
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "Connection error, will retry"
                    );
                    last_failure = Some(Transient::Connect(e.to_string()));
                    continue;
                }
                return Err(AtlasError::Upstream {
                    provider: provider.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    // All retries exhausted
    Err(match last_failure {
        Some(Transient::RateLimited) => AtlasError::RateLimited {
            provider: provider.to_string(),
        },
        Some(Transient::Timeout) => AtlasError::Timeout {
            provider: provider.to_string(),
        },
        Some(Transient::Server(message) | Transient::Connect(message)) => AtlasError::Upstream {
            provider: provider.to_string(),
            message,
        },
        None => AtlasError::Upstream {
            provider: provider.to_string(),
            message: "retries exhausted".to_string(),
        },
    })
}
