//! Concurrent probing engine
//!
//! ```text
//! HashSpace → AdmissionPolicy → mpsc(max_workers) → probe workers → ScanController
//!                                                       ↑      │
//!                                                       └─429──┘ (cooldown, same worker)
//! ```
//!
//! A single coordinating task walks the hash space in ascending order, paces
//! submissions through the admission policy and hands candidates to a fixed
//! pool of worker tasks over a bounded channel. Workers classify each
//! candidate and retry rate-limited ones themselves after a flat cooldown.
//! Cancellation flows from the controller's token: the coordinator stops
//! submitting, workers stop taking queued candidates, in-flight probes finish.

mod controller;
mod dispatcher;
mod rate_limit;

pub use controller::ScanController;
pub use dispatcher::{Dispatcher, RetryPolicy};
pub use rate_limit::{AdmissionPolicy, FixedWindowThrottle, SlidingWindowLimiter, policy_for};

use crate::domain::config::ConfigError;

/// Totals for a finished (or cancelled) scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
  /// Candidates in the hash space
  pub total: u64,
  /// Candidates handed to the worker pool
  pub submitted: u64,
  /// Candidates that reached a final outcome
  pub completed: u64,
  pub not_found: u64,
  pub mainline: u64,
  pub forks: u64,
  pub transport_errors: u64,
  /// Cooldown-and-retry cycles caused by 429 responses
  pub rate_limited_retries: u64,
  /// Submitted candidates that never resolved: retry cap hit, or cancelled
  /// during a cooldown or while still queued
  pub abandoned: u64,
  /// Fork commit URLs, sorted
  pub fork_commits: Vec<String>,
  /// Mainline commit URLs, sorted
  pub mainline_commits: Vec<String>,
  pub cancelled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error("Unable to build HTTP client: {0}")]
  Client(#[from] reqwest::Error),
  #[error("Worker pool failure: {0}")]
  PoolFailure(String),
  #[error("Scan cancelled after {} of {} candidates", .0.completed, .0.total)]
  Cancelled(Box<ScanReport>),
}
