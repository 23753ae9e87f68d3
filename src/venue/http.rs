//! Shared REST transport: rate limiting, retry with backoff, and circuit
//! breaking for every outbound venue call.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client as HttpClient;
use reqwest::StatusCode;
use tokio::time::sleep;
use tracing::warn;

use crate::config::collector::VenueConfig;
use crate::error::{Error, Result};
use crate::venue::breaker::CircuitBreaker;
use crate::venue::rate_limit::TokenBucket;

/// HTTP transport wrapping a reqwest client with the common venue contract:
/// acquire a rate-limit token, retry transient failures with exponential
/// backoff, honor 429 retry-after, surface other 4xx immediately, and count
/// failures against a circuit breaker.
pub struct RestTransport {
    http: HttpClient,
    limiter: Arc<TokenBucket>,
    breaker: CircuitBreaker,
    retry_max_attempts: u32,
    retry_backoff_ms: u64,
    retry_backoff_cap_ms: u64,
}

impl RestTransport {
    /// Build a transport for one logical client.
    #[must_use]
    pub fn new(client: &'static str, config: &VenueConfig, limiter: Arc<TokenBucket>) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });

        Self {
            http,
            limiter,
            breaker: CircuitBreaker::new(
                client,
                config.breaker_failures,
                Duration::from_millis(config.breaker_cooldown_ms),
            ),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_backoff_ms: config.retry_backoff_ms,
            retry_backoff_cap_ms: config.retry_backoff_cap_ms.max(config.retry_backoff_ms),
        }
    }

    /// GET `url` and deserialize the JSON body.
    ///
    /// # Errors
    ///
    /// - [`Error::CircuitOpen`] without issuing the request;
    /// - [`Error::Venue`] for non-429 4xx (no retry);
    /// - the final transient error once attempts are exhausted.
    pub async fn get_json<T>(&self, url: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.breaker.check()?;
            self.limiter.acquire().await;

            match self.issue(url).await {
                Ok(body) => {
                    self.breaker.record_success();
                    return Ok(body);
                }
                Err(err) if err.is_transient() && attempt < self.retry_max_attempts => {
                    self.breaker.record_failure();
                    let delay = self.backoff_delay(attempt, &err);
                    warn!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Venue request failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    if err.is_transient() {
                        self.breaker.record_failure();
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn issue<T>(&self, url: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map_or(1_000, |secs| secs * 1_000);
            return Err(Error::RateLimited { retry_after_ms });
        }
        if status.is_client_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Venue {
                status: status.as_u16(),
                message,
            });
        }
        let response = response.error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    /// Exponential backoff doubling per attempt, capped; a 429 retry-after
    /// hint overrides the computed delay when longer.
    fn backoff_delay(&self, attempt: u32, err: &Error) -> Duration {
        let exp = self
            .retry_backoff_ms
            .saturating_mul(1u64 << (attempt - 1).min(16))
            .min(self.retry_backoff_cap_ms);
        let floor = match err {
            Error::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => 0,
        };
        Duration::from_millis(exp.max(floor))
    }

    /// Consecutive failure count on this client's breaker (observability).
    #[must_use]
    pub fn breaker_failures(&self) -> u32 {
        self.breaker.failure_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> RestTransport {
        let config = VenueConfig {
            retry_backoff_ms: 100,
            retry_backoff_cap_ms: 1_000,
            ..VenueConfig::default()
        };
        RestTransport::new("test", &config, Arc::new(TokenBucket::new(100.0, 10)))
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let t = transport();
        let err = Error::Connection("x".into());
        assert_eq!(t.backoff_delay(1, &err), Duration::from_millis(100));
        assert_eq!(t.backoff_delay(2, &err), Duration::from_millis(200));
        assert_eq!(t.backoff_delay(3, &err), Duration::from_millis(400));
        assert_eq!(t.backoff_delay(10, &err), Duration::from_millis(1_000));
    }

    #[test]
    fn retry_after_hint_overrides_shorter_backoff() {
        let t = transport();
        let err = Error::RateLimited {
            retry_after_ms: 5_000,
        };
        assert_eq!(t.backoff_delay(1, &err), Duration::from_millis(5_000));
    }
}
