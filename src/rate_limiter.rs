//! Request pacing with adaptive backoff.
//!
//! Both service clients (Last.fm and Spotify) own one of these so every call
//! is spaced out by at least the configured pause.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Something that can block the pipeline for a while.
///
/// Production code sleeps the thread; tests record the requested delays.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Records requested delays instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

/// Enforces a minimum interval between requests, doubling it on failures
/// and halving it back after a run of successes.
pub struct RateLimiter {
    name: String,
    last_request: Option<Instant>,
    current_interval: Duration,
    base_interval: Duration,
    max_interval: Duration,
    success_count: u32,
    successes_to_reduce: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl RateLimiter {
    /// * `name`: label for log messages (e.g. "Last.fm", "Spotify")
    /// * `base_interval`: minimum time between requests
    /// * `max_interval`: upper bound after repeated failures
    /// * `successes_to_reduce`: consecutive successes before halving the interval
    ///   (0 disables the reduction)
    pub fn new(
        name: &str,
        base_interval: Duration,
        max_interval: Duration,
        successes_to_reduce: u32,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        RateLimiter {
            name: name.to_string(),
            last_request: None,
            current_interval: base_interval,
            base_interval,
            max_interval,
            success_count: 0,
            successes_to_reduce,
            sleeper,
        }
    }

    /// Max interval = 16× base, reduce after 10 successes.
    ///
    /// A zero pause still grows on failure, starting from 250 ms.
    pub fn from_millis(name: &str, millis: u64, sleeper: Arc<dyn Sleeper>) -> Self {
        let base = Duration::from_millis(millis);
        let max = (base * 16).max(Duration::from_secs(4));
        Self::new(name, base, max, 10, sleeper)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    /// Sleep if not enough time has elapsed since the last request.
    /// Must be called *before* making a request.
    pub fn wait_if_needed(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.current_interval {
                let wait_time = self.current_interval - elapsed;
                log::trace!(
                    "[{}] pacing: waiting {:.1}s",
                    self.name,
                    wait_time.as_secs_f64()
                );
                self.sleeper.sleep(wait_time);
            }
        }
        self.last_request = Some(Instant::now());
    }

    /// After enough consecutive successes the interval is halved (down to the base).
    pub fn report_success(&mut self) {
        if self.successes_to_reduce == 0 {
            return;
        }

        self.success_count += 1;

        if self.success_count >= self.successes_to_reduce
            && self.current_interval > self.base_interval
        {
            self.current_interval = (self.current_interval / 2).max(self.base_interval);
            log::debug!(
                "[{}] pacing reduced to {:.1}s after {} successes",
                self.name,
                self.current_interval.as_secs_f64(),
                self.success_count
            );
            self.success_count = 0;
        }
    }

    /// Doubles the interval (up to max).
    pub fn report_failure(&mut self) {
        let grown = if self.current_interval.is_zero() {
            Duration::from_millis(250)
        } else {
            self.current_interval * 2
        };
        self.current_interval = grown.min(self.max_interval);
        log::debug!(
            "[{}] pacing increased to {:.1}s due to error",
            self.name,
            self.current_interval.as_secs_f64()
        );
        self.success_count = 0;
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }
}
