//! Blocking HTTP transport shared by the service clients.
//!
//! Every request is paced by the client's [`RateLimiter`] and retried with
//! capped exponential backoff on 408/429/5xx and connection failures.

use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiter;

const USER_AGENT: &str = "crowns/0.1 (scrobble crown playlist builder)";

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(32);
const MAX_JITTER_MS: u64 = 250;

/// One outgoing request, rebuilt for every attempt.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub method: &'static str,
    pub url: &'a str,
    pub query: Vec<(&'a str, String)>,
    pub bearer: Option<&'a str>,
    pub body: Option<Value>,
}

impl<'a> Request<'a> {
    pub fn get(url: &'a str) -> Self {
        Request {
            method: "GET",
            url,
            query: Vec::new(),
            bearer: None,
            body: None,
        }
    }

    pub fn post(url: &'a str, body: Value) -> Self {
        Request {
            method: "POST",
            body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn put(url: &'a str, body: Value) -> Self {
        Request {
            method: "PUT",
            body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn delete(url: &'a str, body: Value) -> Self {
        Request {
            method: "DELETE",
            body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &'a str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    pub fn bearer(mut self, token: &'a str) -> Self {
        self.bearer = Some(token);
        self
    }
}

/// Delay before retry number `attempt` (1-based): 1s, 2s, 4s, ... capped at 32s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(6);
    BACKOFF_BASE
        .checked_mul(1u32 << exponent)
        .unwrap_or(BACKOFF_CAP)
        .min(BACKOFF_CAP)
}

pub struct HttpClient {
    agent: ureq::Agent,
    limiter: RateLimiter,
    max_retries: u32,
}

impl HttpClient {
    pub fn new(limiter: RateLimiter, max_retries: u32) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .timeout_write(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build();
        HttpClient {
            agent,
            limiter,
            max_retries,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Send `request`, retrying transient failures, and decode the JSON body.
    pub fn send_json<T: DeserializeOwned>(&mut self, request: &Request<'_>) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            self.limiter.wait_if_needed();
            match self.send_once(request) {
                Ok(response) => {
                    self.limiter.report_success();
                    return response.into_json::<T>().map_err(|e| {
                        Error::Transport(format!("unreadable body from {}: {e}", request.url))
                    });
                }
                Err(failure) => {
                    self.limiter.report_failure();
                    attempt += 1;
                    if !failure.error.is_transient() || attempt > self.max_retries {
                        return Err(failure.error);
                    }
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER_MS));
                    let delay = failure.retry_after.unwrap_or_else(|| backoff_delay(attempt)) + jitter;
                    log::warn!(
                        "[{}] {} (attempt {}/{}), retrying in {:.1}s",
                        self.limiter.name(),
                        failure.error,
                        attempt,
                        self.max_retries,
                        delay.as_secs_f64()
                    );
                    self.limiter.sleeper().sleep(delay);
                }
            }
        }
    }

    fn send_once(&self, request: &Request<'_>) -> std::result::Result<ureq::Response, Failure> {
        let mut req = self.agent.request(request.method, request.url);
        for (key, value) in &request.query {
            req = req.query(key, value);
        }
        if let Some(token) = request.bearer {
            req = req.set("Authorization", &format!("Bearer {token}"));
        }

        let outcome = match &request.body {
            Some(body) => req.send_json(body),
            None => req.call(),
        };

        outcome.map_err(|e| match e {
            ureq::Error::Status(status, response) => Failure {
                retry_after: response
                    .header("Retry-After")
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs),
                error: Error::Http {
                    status,
                    url: request.url.to_string(),
                },
            },
            ureq::Error::Transport(transport) => Failure {
                retry_after: None,
                error: Error::Transport(transport.to_string()),
            },
        })
    }
}

struct Failure {
    error: Error,
    retry_after: Option<Duration>,
}
