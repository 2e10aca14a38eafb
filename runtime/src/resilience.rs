// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Retry and circuit breaking around origin renders.
//!
//! ## Retry
//!
//! Transient failures (navigation errors, timeouts) are retried with
//! exponential backoff: `initial * 2^(attempt-1)`, capped at `max_backoff`.
//!
//! ## Circuit breaker
//!
//! After `failure_threshold` consecutive failed renders the breaker opens and
//! renders fail fast for `cooldown`. The first call after the cooldown is a
//! probe: success closes the breaker, failure re-opens it. A render counts
//! once, after its retries are exhausted.
//!
//! Admission hands out a [`BreakerPermit`]. A permit dropped without an
//! outcome (the caller went away mid-render) records nothing, and an
//! abandoned probe lets the next caller probe instead.

use crate::error::RenderError;
use crate::renderer::Renderer;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Backoff policy for transient render failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

/// Consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        *self.lock()
    }

    /// Admit a call, or report how long until the breaker will allow one.
    pub fn acquire(&self) -> Result<BreakerPermit<'_>, RenderError> {
        let mut state = self.lock();
        let probe = match *state {
            BreakerState::Closed { .. } => false,
            BreakerState::Open { until } => {
                let now = Instant::now();
                if now < until {
                    return Err(RenderError::CircuitOpen {
                        retry_after_ms: (until - now).as_millis() as u64,
                    });
                }
                info!("circuit breaker: HALF-OPEN, probing origin");
                *state = BreakerState::HalfOpen;
                true
            }
            // One probe at a time.
            BreakerState::HalfOpen => {
                return Err(RenderError::CircuitOpen { retry_after_ms: 0 })
            }
        };
        Ok(BreakerPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        if !matches!(*state, BreakerState::Closed { consecutive_failures: 0 }) {
            info!("circuit breaker: CLOSED");
        }
        *state = BreakerState::Closed {
            consecutive_failures: 0,
        };
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        let failures = match *state {
            BreakerState::Closed {
                consecutive_failures,
            } => consecutive_failures + 1,
            BreakerState::HalfOpen | BreakerState::Open { .. } => self.config.failure_threshold,
        };

        if failures >= self.config.failure_threshold {
            warn!(
                "circuit breaker: OPEN after {failures} consecutive failures, cooling down for {}s",
                self.config.cooldown.as_secs()
            );
            *state = BreakerState::Open {
                until: Instant::now() + self.config.cooldown,
            };
        } else {
            *state = BreakerState::Closed {
                consecutive_failures: failures,
            };
        }
    }

    /// The probe never reported back; re-arm so the next caller probes.
    fn abandon_probe(&self) {
        let mut state = self.lock();
        if *state == BreakerState::HalfOpen {
            info!("circuit breaker: probe abandoned, OPEN until next caller");
            *state = BreakerState::Open {
                until: Instant::now(),
            };
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Admission ticket from [`CircuitBreaker::acquire`]. Settle it with
/// [`success`](Self::success) or [`failure`](Self::failure).
#[must_use]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.abandon_probe();
        }
    }
}

/// Renderer decorator adding retry and circuit breaking.
pub struct ResilientRenderer<R> {
    inner: R,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl<R: Renderer> ResilientRenderer<R> {
    pub fn new(inner: R, retry: RetryPolicy, breaker: BreakerConfig) -> Self {
        Self {
            inner,
            retry,
            breaker: CircuitBreaker::new(breaker),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn render_with_retry(
        &self,
        url: &str,
        wait_selector: Option<&str>,
    ) -> Result<String, RenderError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.render(url, wait_selector).await {
                Ok(html) => return Ok(html),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "render failed, retrying: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<R: Renderer> Renderer for ResilientRenderer<R> {
    async fn render(&self, url: &str, wait_selector: Option<&str>) -> Result<String, RenderError> {
        let permit = self.breaker.acquire()?;
        match self.render_with_retry(url, wait_selector).await {
            Ok(html) => {
                permit.success();
                Ok(html)
            }
            Err(e) => {
                permit.failure();
                Err(e)
            }
        }
    }
}
