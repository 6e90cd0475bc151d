// Admission policies for probe submissions
//
// The dispatcher calls `admit()` before every submission. Two policies:
// - FixedWindowThrottle: after every `limit` admissions, pause a full window
// - SlidingWindowLimiter: at most `limit` admissions inside any rolling window
//
// Both waits run on the submitting task only and end early on cancellation.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::config::{LimiterKind, ScanConfig};

/// Paces submissions into the worker pool.
#[async_trait]
pub trait AdmissionPolicy: Send {
  /// Wait until one more submission may go out.
  ///
  /// Returns `false` if `cancel` fired while waiting; nothing is admitted then.
  async fn admit(&mut self, cancel: &CancellationToken) -> bool;
}

/// Sleep for `wait` unless cancelled first. Returns `false` on cancellation.
async fn pause(wait: Duration, cancel: &CancellationToken) -> bool {
  tokio::select! {
      biased;
      _ = cancel.cancelled() => false,
      _ = sleep(wait) => true,
  }
}

/// Counting throttle: after every `limit` admissions the next one waits a full window.
///
/// Coarse on purpose. Overshooting only costs a recoverable 429.
#[derive(Debug)]
pub struct FixedWindowThrottle {
  limit: usize,
  window: Duration,
  admitted: usize,
}

impl FixedWindowThrottle {
  pub fn new(limit: usize, window: Duration) -> Self {
    Self {
      limit: limit.max(1),
      window,
      admitted: 0,
    }
  }
}

#[async_trait]
impl AdmissionPolicy for FixedWindowThrottle {
  async fn admit(&mut self, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
      return false;
    }

    if self.admitted >= self.limit {
      info!(
        limit = self.limit,
        pause_secs = self.window.as_secs(),
        "Rate limit reached, pausing submissions"
      );
      if !pause(self.window, cancel).await {
        return false;
      }
      self.admitted = 0;
    }

    self.admitted += 1;
    true
  }
}

const PREALLOCATED_SLOTS: usize = 1024;

/// Sliding window limiter
#[derive(Debug)]
pub struct SlidingWindowLimiter {
  limit: usize,
  window: Duration,
  /// Admission times still inside the window
  request_times: VecDeque<Instant>,
}

impl SlidingWindowLimiter {
  pub fn new(limit: usize, window: Duration) -> Self {
    let limit = limit.max(1);
    Self {
      limit,
      window,
      // the deque grows on demand past this
      request_times: VecDeque::with_capacity(limit.min(PREALLOCATED_SLOTS)),
    }
  }

  /// Drop admissions that have left the window
  fn prune_expired(&mut self, now: Instant) {
    while let Some(&oldest) = self.request_times.front() {
      if oldest + self.window <= now {
        self.request_times.pop_front();
      } else {
        break;
      }
    }
  }

  /// `None` if a slot is free now, otherwise how long until the oldest admission expires
  fn wait_time(&mut self, now: Instant) -> Option<Duration> {
    self.prune_expired(now);

    if self.request_times.len() < self.limit {
      return None;
    }
    self
      .request_times
      .front()
      .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
  }

  fn current_count(&mut self) -> usize {
    self.prune_expired(Instant::now());
    self.request_times.len()
  }
}

#[async_trait]
impl AdmissionPolicy for SlidingWindowLimiter {
  async fn admit(&mut self, cancel: &CancellationToken) -> bool {
    loop {
      if cancel.is_cancelled() {
        return false;
      }

      match self.wait_time(Instant::now()) {
        None => {
          self.request_times.push_back(Instant::now());
          return true;
        }
        Some(wait) => {
          debug!(
            wait_ms = wait.as_millis(),
            in_window = self.current_count(),
            limit = self.limit,
            "Rate limiter: waiting for slot"
          );
          if !pause(wait, cancel).await {
            return false;
          }
        }
      }
    }
  }
}

/// Build the policy selected in `config`
pub fn policy_for(config: &ScanConfig) -> Box<dyn AdmissionPolicy> {
  match config.limiter {
    LimiterKind::Fixed => Box::new(FixedWindowThrottle::new(config.rate_limit, config.rate_window)),
    LimiterKind::Sliding => Box::new(SlidingWindowLimiter::new(config.rate_limit, config.rate_window)),
  }
}
