//! Shared HTTP client with bounded retry
//!
//! Both HTTP backends funnel their requests through this wrapper, which
//! applies the per-invocation timeout and retries transient failures
//! (connect errors, 429, 5xx) a bounded number of times.

use std::time::Duration;

use tracing::{debug, warn};

use tandem_utils::error::ProviderError;

/// Maximum attempts per logical request (1 initial + 2 retries)
const MAX_ATTEMPTS: u32 = 3;

/// Base delay between attempts; grows linearly with the attempt number
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

pub(crate) struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a new HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Misconfiguration` if the TLS-backed client
    /// cannot be constructed.
    pub fn new() -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Misconfiguration(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Start a POST request against `url`.
    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url)
    }

    /// Execute a request with the per-invocation timeout and bounded retry.
    ///
    /// Transport errors, 429 and 5xx statuses are retried up to
    /// `MAX_ATTEMPTS`; other non-success statuses fail immediately with
    /// `ProviderError::Api`. Timeouts are never retried — the invocation
    /// budget is already spent.
    ///
    /// # Errors
    ///
    /// Returns the mapped `ProviderError` of the final failed attempt.
    pub async fn execute_with_retry(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
        provider: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let request = request.timeout(timeout);
        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let Some(builder) = request.try_clone() else {
                // Non-cloneable body (streaming upload): single attempt only
                return Self::map_send_result(request.send().await, timeout, provider).await;
            };

            match Self::map_send_result(builder.send().await, timeout, provider).await {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(provider, attempt, "Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(err) => {
                    let retryable = match &err {
                        ProviderError::Transport(_) => true,
                        ProviderError::Api { status, .. } => {
                            *status == 429 || (500..=599).contains(status)
                        }
                        _ => false,
                    };
                    if !retryable || attempt == MAX_ATTEMPTS {
                        return Err(err);
                    }
                    warn!(provider, attempt, error = %err, "Retrying provider request");
                    last_error = Some(err);
                    tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                }
            }
        }

        // Unreachable: the loop always returns on the final attempt
        Err(last_error
            .unwrap_or_else(|| ProviderError::Transport("retry loop exhausted".to_string())))
    }

    async fn map_send_result(
        result: Result<reqwest::Response, reqwest::Error>,
        timeout: Duration,
        provider: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = result.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    timeout_seconds: timeout.as_secs(),
                }
            } else {
                ProviderError::Transport(format!("{provider}: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // Keep only the head of the body; provider error pages can be large
        let message = match response.text().await {
            Ok(body) => body.chars().take(512).collect::<String>(),
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };

        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
