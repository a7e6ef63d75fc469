//! HTTP client performing single delivery attempts.
//!
//! One invocation equals one POST to the configured endpoint. The client
//! classifies every outcome (2xx, 4xx, 5xx, rate limit, timeout, connect
//! failure) but never retries by itself; retries belong to the scheduler,
//! which keeps this component a pure single-attempt primitive testable
//! against a fake endpoint.

use std::time::Duration;

use billhook_core::TaskId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::error::{DispatchError, Result};

/// Bytes of response body kept for diagnostics.
const MAX_CAPTURED_BODY: usize = 1024;

/// Fallback when a Retry-After header cannot be parsed.
const DEFAULT_RETRY_AFTER_SECONDS: u64 = 60;

/// Configuration for the notification client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connect/read timeout applied to every attempt.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: "Billhook-Notifier/1.0".to_string(),
            max_redirects: 3,
            verify_tls: true,
        }
    }
}

/// One delivery attempt to hand to the client.
#[derive(Debug, Clone)]
pub struct AttemptRequest {
    /// Task being delivered, for log correlation and metadata headers.
    pub task_id: TaskId,
    /// Serialized event payload.
    pub payload: Bytes,
    /// Attempt number for this task (1-based).
    pub attempt_number: u32,
}

/// Classified result of a single delivery attempt.
///
/// Transient value consumed immediately by the retry scheduler; never
/// stored.
#[derive(Debug)]
pub struct DeliveryOutcome {
    /// Whether the endpoint acknowledged with a 2xx status.
    pub success: bool,
    /// HTTP status, when the endpoint responded at all.
    pub http_status: Option<u16>,
    /// Classified failure cause, absent on success.
    pub error: Option<DispatchError>,
    /// Total duration of the attempt.
    pub duration: Duration,
}

impl DeliveryOutcome {
    fn delivered(status: u16, duration: Duration) -> Self {
        Self { success: true, http_status: Some(status), error: None, duration }
    }

    fn failed(error: DispatchError, http_status: Option<u16>, duration: Duration) -> Self {
        Self { success: false, http_status, error: Some(error), duration }
    }
}

/// Webhook delivery client with connection pooling and explicit timeouts.
#[derive(Debug, Clone)]
pub struct NotificationClient {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    config: ClientConfig,
}

impl NotificationClient {
    /// Creates a client for the given endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::ConfigurationError` if the endpoint URL is
    /// invalid or the HTTP client cannot be built with the given settings.
    pub fn new(config: ClientConfig, endpoint_url: &str) -> Result<Self> {
        let endpoint = endpoint_url
            .parse()
            .map_err(|e| DispatchError::configuration(format!("invalid endpoint URL: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| {
                DispatchError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, endpoint, config })
    }

    /// Performs exactly one POST attempt and classifies the outcome.
    ///
    /// Sends the payload with `Content-Type: application/json` plus task
    /// metadata headers. Network failures, timeouts, and non-2xx statuses
    /// are folded into the outcome rather than returned as errors, so the
    /// caller always gets something the scheduler can act on.
    pub async fn attempt(&self, request: &AttemptRequest) -> DeliveryOutcome {
        let started = std::time::Instant::now();

        let span = info_span!(
            "notification_attempt",
            task_id = %request.task_id,
            endpoint = %self.endpoint,
            attempt = request.attempt_number
        );

        async move {
            tracing::debug!("starting delivery attempt");

            let response = self
                .client
                .post(self.endpoint.clone())
                .header("content-type", "application/json")
                .header("X-Billhook-Task-Id", request.task_id.to_string())
                .header("X-Billhook-Attempt", request.attempt_number.to_string())
                .body(request.payload.clone())
                .send()
                .await;

            let duration = started.elapsed();

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {e}");

                    let error = if e.is_timeout() {
                        DispatchError::timeout(self.config.timeout.as_secs())
                    } else if e.is_connect() {
                        DispatchError::network(format!("connection failed: {e}"))
                    } else {
                        DispatchError::network(e.to_string())
                    };
                    return DeliveryOutcome::failed(error, None, duration);
                },
            };

            let status = response.status().as_u16();
            let retry_after = retry_after_seconds(response.headers());
            let body = capture_body(response).await;

            tracing::debug!(status, duration_ms = duration.as_millis(), "received response");

            match status {
                200..=299 => DeliveryOutcome::delivered(status, duration),
                429 => {
                    let seconds = retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECONDS);
                    DeliveryOutcome::failed(
                        DispatchError::rate_limited(seconds),
                        Some(status),
                        duration,
                    )
                },
                400..=499 => DeliveryOutcome::failed(
                    DispatchError::client_error(status, body),
                    Some(status),
                    duration,
                ),
                _ => DeliveryOutcome::failed(
                    DispatchError::server_error(status, body),
                    Some(status),
                    duration,
                ),
            }
        }
        .instrument(span)
        .await
    }
}

/// Reads and truncates the response body for diagnostics.
async fn capture_body(response: reqwest::Response) -> String {
    match response.bytes().await {
        Ok(bytes) if bytes.len() > MAX_CAPTURED_BODY => {
            let suffix = "... (truncated)";
            let keep = MAX_CAPTURED_BODY - suffix.len();
            format!("{}{suffix}", String::from_utf8_lossy(&bytes[..keep]))
        },
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => format!("[failed to read response body: {e}]"),
    }
}

/// Parses a Retry-After header in seconds or HTTP-date format.
fn retry_after_seconds(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let now = chrono::Utc::now();
        let retry_at = date.with_timezone(&chrono::Utc);
        if retry_at > now {
            return (retry_at - now).to_std().ok().map(|d| d.as_secs());
        }
    }

    Some(DEFAULT_RETRY_AFTER_SECONDS)
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_request() -> AttemptRequest {
        AttemptRequest {
            task_id: TaskId::new(),
            payload: Bytes::from_static(b"{\"eventType\":\"INVOICE_CREATION\"}"),
            attempt_number: 1,
        }
    }

    async fn client_for(server: &MockServer) -> NotificationClient {
        NotificationClient::new(ClientConfig::default(), &format!("{}/webhook", server.uri()))
            .unwrap()
    }

    #[tokio::test]
    async fn successful_attempt_classified_as_delivered() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/webhook"))
            .and(matchers::header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .mount(&server)
            .await;

        let outcome = client_for(&server).await.attempt(&test_request()).await;

        assert!(outcome.success);
        assert_eq!(outcome.http_status, Some(200));
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let outcome = client_for(&server).await.attempt(&test_request()).await;

        assert!(!outcome.success);
        assert_eq!(outcome.http_status, Some(404));
        let error = outcome.error.unwrap();
        assert!(matches!(error, DispatchError::ClientError { status_code: 404, .. }));
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&server)
            .await;

        let outcome = client_for(&server).await.attempt(&test_request()).await;

        assert!(!outcome.success);
        let error = outcome.error.unwrap();
        assert!(matches!(error, DispatchError::ServerError { status_code: 503, .. }));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_string("Too Many Requests")
                    .append_header("Retry-After", "120"),
            )
            .mount(&server)
            .await;

        let outcome = client_for(&server).await.attempt(&test_request()).await;

        let error = outcome.error.unwrap();
        assert_eq!(error.retry_after_seconds(), Some(120));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn connection_refused_is_transient_network_error() {
        // Nothing listens on port 9; the connect fails immediately.
        let client =
            NotificationClient::new(ClientConfig::default(), "http://127.0.0.1:9/webhook").unwrap();

        let outcome = client.attempt(&test_request()).await;

        assert!(!outcome.success);
        assert_eq!(outcome.http_status, None);
        let error = outcome.error.unwrap();
        assert!(matches!(error, DispatchError::NetworkError { .. }));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn metadata_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::header_exists("X-Billhook-Task-Id"))
            .and(matchers::header("X-Billhook-Attempt", "3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let request = AttemptRequest { attempt_number: 3, ..test_request() };
        let outcome = client_for(&server).await.attempt(&request).await;

        assert!(outcome.success);
        server.verify().await;
    }

    #[tokio::test]
    async fn oversized_response_body_truncated() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(10_000)))
            .mount(&server)
            .await;

        let outcome = client_for(&server).await.attempt(&test_request()).await;

        if let Some(DispatchError::ServerError { body, .. }) = outcome.error {
            assert!(body.len() <= MAX_CAPTURED_BODY);
            assert!(body.ends_with("... (truncated)"));
        } else {
            panic!("expected server error");
        }
    }

    #[test]
    fn invalid_endpoint_url_rejected() {
        let result = NotificationClient::new(ClientConfig::default(), "not a url");
        assert!(matches!(result, Err(DispatchError::ConfigurationError { .. })));
    }

    #[test]
    fn retry_after_parsing_handles_seconds_and_garbage() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(retry_after_seconds(&headers), None);

        headers.insert(reqwest::header::RETRY_AFTER, "90".parse().unwrap());
        assert_eq!(retry_after_seconds(&headers), Some(90));

        headers.insert(reqwest::header::RETRY_AFTER, "garbage".parse().unwrap());
        assert_eq!(retry_after_seconds(&headers), Some(DEFAULT_RETRY_AFTER_SECONDS));
    }
}
