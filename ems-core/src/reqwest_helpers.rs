use crate::configuration::ScannerConfiguration;
use anyhow::{Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use http::Extensions;
use reqwest::{Client, Request, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use reqwest_retry::{RetryDecision, RetryPolicy, RetryTransientMiddleware};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, warn};

const ESI_REQUESTS_PER_SECOND: u32 = 20;

pub fn create_client(cfg: &ScannerConfiguration) -> Result<ClientWithMiddleware> {
    let reqwest_client = Client::builder()
        .user_agent(cfg.user_agent.clone())
        .timeout(cfg.esi_timeout)
        .build()
        .context("Failed to build http client")?;

    let per_second = NonZeroU32::new(ESI_REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);
    let limiter = RateLimiter::direct(Quota::per_second(per_second));
    let rate_limiting_middleware = RateLimitingMiddleware { limiter: Arc::new(limiter) };

    let retry_policy = LinearBackoff {
        step: cfg.esi_sleep,
        max_retries: cfg.esi_retries,
    };

    let client = ClientBuilder::new(reqwest_client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(ErrorLoggingMiddleware)
        .with(rate_limiting_middleware)
        .with(RequestPacingMiddleware { pause: cfg.esi_sleep })
        .build();

    Ok(client)
}

/// Retries up to `max_retries` times, waiting `step × attempt` before attempt number `attempt`.
#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    pub step: Duration,
    pub max_retries: u32,
}

impl LinearBackoff {
    pub fn delay_for(&self, n_past_retries: u32) -> Duration {
        self.step.saturating_mul(n_past_retries + 1)
    }
}

impl RetryPolicy for LinearBackoff {
    fn should_retry(&self, _request_start_time: SystemTime, n_past_retries: u32) -> RetryDecision {
        if n_past_retries >= self.max_retries {
            return RetryDecision::DoNotRetry;
        }
        RetryDecision::Retry {
            execute_after: SystemTime::now() + self.delay_for(n_past_retries),
        }
    }
}

struct RateLimitingMiddleware {
    limiter: Arc<DefaultDirectRateLimiter>,
}

#[async_trait::async_trait]
impl Middleware for RateLimitingMiddleware {
    async fn handle(&self, req: Request, extensions: &mut Extensions, next: Next<'_>) -> reqwest_middleware::Result<Response> {
        self.limiter.until_ready().await;
        next.run(req, extensions).await
    }
}

/// Sleeps for a fixed pause after every successful response.
struct RequestPacingMiddleware {
    pause: Duration,
}

#[async_trait::async_trait]
impl Middleware for RequestPacingMiddleware {
    async fn handle(&self, req: Request, extensions: &mut Extensions, next: Next<'_>) -> reqwest_middleware::Result<Response> {
        let result = next.run(req, extensions).await;
        if matches!(&result, Ok(resp) if resp.status().is_success()) && !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
        result
    }
}

pub struct ErrorLoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for ErrorLoggingMiddleware {
    async fn handle(&self, req: Request, extensions: &mut Extensions, next: Next<'_>) -> reqwest_middleware::Result<Response> {
        let start = Instant::now();
        let method = req.method().clone();
        let url = req.url().clone();

        let result = next.run(req, extensions).await;

        let duration = start.elapsed();

        match &result {
            Ok(resp) if !resp.status().is_success() => {
                let status = resp.status();
                match status {
                    // ESI answers 404 for ids that were never valid, the caller decides what that means
                    StatusCode::NOT_FOUND => debug!("Request not found: {} {} - Duration: {:?}", method, url, duration),
                    // 420 is ESI's error-limit response
                    s if s == StatusCode::TOO_MANY_REQUESTS || s.as_u16() == 420 => {
                        warn!("Request failed due to rate-limit {} {} - Status: {}, Duration: {:?}", method, url, status, duration)
                    }
                    _ => error!("Request failed: {} {} - Status: {}, Duration: {:?}", method, url, status, duration),
                }
            }
            Err(e) => {
                error!("Request error: {} {} - Error: {}, Duration: {:?}", method, url, e, duration);
            }
            _ => {
                debug!("Request succeeded: {} {} - Duration: {:?}", method, url, duration);
            }
        }

        result
    }
}
