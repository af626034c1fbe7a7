use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

const USER_AGENT: &str = concat!("financial-health-barometer/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("unexpected response from {url}: {reason}")]
    Unexpected { url: String, reason: String },
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited(_))
    }
}

/// Attempts and waits shared by every fetcher.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Fixed wait after an ordinary failure.
    pub retry_delay: Duration,
    /// Base of the exponential wait after HTTP 429.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_millis(2000),
            backoff_base: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Wait after the `attempt`-th (1-based) rate-limited response.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }

    /// Exponential after a rate limit, fixed otherwise.
    pub fn wait_after(&self, error: &FetchError, attempt: u32) -> Duration {
        if error.is_rate_limited() {
            self.backoff(attempt)
        } else {
            self.retry_delay
        }
    }

    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::ZERO,
            backoff_base: Duration::ZERO,
        }
    }
}

pub fn build_client() -> anyhow::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
}

pub async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Sends the request built by `request` and decodes a JSON body, retrying per
/// `policy`. The builder is invoked once per attempt.
pub async fn send_json<T, F>(request: F, policy: &RetryPolicy) -> Result<T, FetchError>
where
    T: DeserializeOwned,
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 1;
    loop {
        let error = match send_once(request()).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if attempt >= policy.attempts.max(1) {
            return Err(error);
        }

        let wait = policy.wait_after(&error, attempt);
        warn!(attempt, wait_ms = wait.as_millis() as u64, "attempt failed: {error}");
        pause(wait).await;
        attempt += 1;
    }
}

async fn send_once<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, FetchError> {
    let response = request.send().await?;
    let status = response.status();
    let url = response.url().path().to_string();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited(url));
    }
    if !status.is_success() {
        return Err(FetchError::Status { status, url });
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Debug, Deserialize)]
    struct Reading {
        value: u32,
    }

    /// Answers one connection per scripted status and counts the requests.
    async fn scripted_server(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            for status in statuses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buffer = [0u8; 1024];
                while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                    let read = socket.read(&mut buffer).await.unwrap();
                    if read == 0 {
                        break;
                    }
                    request.extend_from_slice(&buffer[..read]);
                }
                counter.fetch_add(1, Ordering::SeqCst);

                let (reason, body) = match status {
                    200 => ("OK", r#"{"value":42}"#),
                    429 => ("Too Many Requests", "{}"),
                    _ => ("Internal Server Error", "{}"),
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/series"), hits)
    }

    fn local_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn retries_through_rate_limits_until_success() {
        let (url, hits) = scripted_server(vec![429, 429, 200]).await;
        let client = local_client();

        let reading: Reading = send_json(|| client.get(&url), &RetryPolicy::immediate())
            .await
            .unwrap();

        assert_eq!(reading.value, 42);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_three_failed_attempts() {
        let (url, hits) = scripted_server(vec![500, 500, 500, 200]).await;
        let client = local_client();

        let result: Result<Reading, FetchError> = send_json(|| client.get(&url), &RetryPolicy::immediate()).await;

        match result {
            Err(FetchError::Status { status, url }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(url, "/series");
            }
            other => panic!("expected a status error, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persistent_rate_limit_is_reported_as_such() {
        let (url, hits) = scripted_server(vec![429, 429, 429]).await;
        let client = local_client();

        let result: Result<Reading, FetchError> = send_json(|| client.get(&url), &RetryPolicy::immediate()).await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn rate_limits_back_off_while_other_failures_wait_fixed() {
        let policy = RetryPolicy::default();
        let limited = FetchError::RateLimited("/series".into());
        let failed = FetchError::Status {
            status: StatusCode::BAD_GATEWAY,
            url: "/series".into(),
        };

        assert_eq!(policy.wait_after(&limited, 1), Duration::from_secs(2));
        assert_eq!(policy.wait_after(&limited, 2), Duration::from_secs(4));
        assert_eq!(policy.wait_after(&failed, 1), Duration::from_secs(2));
        assert_eq!(policy.wait_after(&failed, 2), Duration::from_secs(2));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));
        assert_eq!(policy.backoff(3), Duration::from_millis(8000));
    }

    #[test]
    fn default_policy_matches_upstream_limits() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn immediate_policy_never_waits() {
        let policy = RetryPolicy::immediate();
        assert!(policy.backoff(3).is_zero());
        assert!(policy.retry_delay.is_zero());
    }

    #[test]
    fn rate_limit_is_distinguished() {
        assert!(FetchError::RateLimited("/graph".into()).is_rate_limited());
        let other = FetchError::Unexpected {
            url: "/graph".into(),
            reason: "empty".into(),
        };
        assert!(!other.is_rate_limited());
    }
}
