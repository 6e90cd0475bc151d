//! Dispatcher - feeds a fixed pool of probe workers from the hash space.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{AdmissionPolicy, ScanController, ScanError, ScanReport, policy_for};
use crate::domain::config::{DEFAULT_RETRY_COOLDOWN_SECS, MAX_WORKERS, ScanConfig};
use crate::domain::hash_space::CandidateHash;
use crate::probe::{Classifier, ProbeOutcome};

/// How rate-limited candidates are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Flat wait before every retry; does not grow with attempts
  pub cooldown: Duration,
  /// `None` retries until the candidate resolves
  pub max_retries: Option<u32>,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      cooldown: Duration::from_secs(DEFAULT_RETRY_COOLDOWN_SECS),
      max_retries: None,
    }
  }
}

impl RetryPolicy {
  pub fn from_config(config: &ScanConfig) -> Self {
    Self {
      cooldown: config.retry_cooldown,
      max_retries: config.max_retries,
    }
  }
}

/// Final state of one dispatched candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
  Outcome(ProbeOutcome),
  /// Retry cap hit, or cancelled during a cooldown
  Abandoned,
}

#[derive(Debug, Default)]
struct Tally {
  not_found: AtomicU64,
  mainline: AtomicU64,
  forks: AtomicU64,
  transport_errors: AtomicU64,
  retries: AtomicU64,
  abandoned: AtomicU64,
  fork_commits: Mutex<Vec<String>>,
  mainline_commits: Mutex<Vec<String>>,
}

impl Tally {
  async fn record(&self, resolution: Resolution, url: String) {
    match resolution {
      Resolution::Outcome(ProbeOutcome::NotFound) => {
        self.not_found.fetch_add(1, Ordering::Relaxed);
      }
      Resolution::Outcome(ProbeOutcome::MainlineCommit) => {
        self.mainline.fetch_add(1, Ordering::Relaxed);
        self.mainline_commits.lock().await.push(url);
      }
      Resolution::Outcome(ProbeOutcome::ForkCommit) => {
        self.forks.fetch_add(1, Ordering::Relaxed);
        self.fork_commits.lock().await.push(url);
      }
      Resolution::Outcome(ProbeOutcome::TransportError) => {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
      }
      // workers never hand back a non-terminal outcome
      Resolution::Outcome(ProbeOutcome::RateLimited) | Resolution::Abandoned => {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
      }
    }
  }

  async fn report(&self, controller: &ScanController, submitted: u64) -> ScanReport {
    // every candidate a worker picked up was counted on completion; the rest were still queued
    let never_started = submitted.saturating_sub(controller.completed());

    let mut fork_commits = self.fork_commits.lock().await.clone();
    let mut mainline_commits = self.mainline_commits.lock().await.clone();
    fork_commits.sort();
    mainline_commits.sort();

    ScanReport {
      total: controller.total(),
      submitted,
      completed: controller.completed(),
      not_found: self.not_found.load(Ordering::Relaxed),
      mainline: self.mainline.load(Ordering::Relaxed),
      forks: self.forks.load(Ordering::Relaxed),
      transport_errors: self.transport_errors.load(Ordering::Relaxed),
      rate_limited_retries: self.retries.load(Ordering::Relaxed),
      abandoned: self.abandoned.load(Ordering::Relaxed) + never_started,
      fork_commits,
      mainline_commits,
      cancelled: controller.is_cancelled(),
    }
  }
}

/// Owns the worker pool for one scan.
///
/// Submission runs on the calling task, in the order the candidates are
/// given, paced by the admission policy. Completion order is whatever the
/// workers make of it.
pub struct Dispatcher {
  max_workers: usize,
  retry: RetryPolicy,
  classifier: Arc<Classifier>,
  controller: Arc<ScanController>,
  policy: Box<dyn AdmissionPolicy>,
}

impl Dispatcher {
  pub fn new(
    max_workers: usize,
    retry: RetryPolicy,
    classifier: Arc<Classifier>,
    controller: Arc<ScanController>,
    policy: Box<dyn AdmissionPolicy>,
  ) -> Self {
    Self {
      max_workers: max_workers.clamp(1, MAX_WORKERS),
      retry,
      classifier,
      controller,
      policy,
    }
  }

  pub fn from_config(config: &ScanConfig, classifier: Arc<Classifier>, controller: Arc<ScanController>) -> Self {
    Self::new(
      config.max_workers,
      RetryPolicy::from_config(config),
      classifier,
      controller,
      policy_for(config),
    )
  }

  /// Probe every candidate, returning once the pool has drained.
  ///
  /// Cancellation yields [`ScanError::Cancelled`] carrying the partial report.
  pub async fn run<I>(mut self, candidates: I) -> Result<ScanReport, ScanError>
  where
    I: IntoIterator<Item = CandidateHash>,
  {
    let cancel = self.controller.token();
    let tally = Arc::new(Tally::default());

    // Capacity of one slot per worker keeps "queued" work small
    let (tx, rx) = mpsc::channel::<CandidateHash>(self.max_workers);
    let rx = Arc::new(Mutex::new(rx));

    let workers: Vec<_> = (0..self.max_workers)
      .map(|worker_id| {
        let worker = ProbeWorker {
          worker_id,
          rx: Arc::clone(&rx),
          classifier: Arc::clone(&self.classifier),
          controller: Arc::clone(&self.controller),
          retry: self.retry,
          tally: Arc::clone(&tally),
        };
        tokio::spawn(worker.run())
      })
      .collect();
    // Workers hold the only receivers, so the channel closes if they all die
    drop(rx);

    info!(
      workers = self.max_workers,
      total = self.controller.total(),
      "Dispatching candidates"
    );

    let mut submitted = 0u64;
    let mut pool_failure = None;

    for candidate in candidates {
      if !self.policy.admit(&cancel).await {
        debug!(submitted, "Submission stopped by cancellation");
        break;
      }

      let sent = tokio::select! {
          biased;
          _ = cancel.cancelled() => {
              debug!(submitted, "Submission stopped by cancellation");
              break;
          }
          sent = tx.send(candidate) => sent,
      };

      if let Err(mpsc::error::SendError(candidate)) = sent {
        error!(candidate = %candidate, "Worker pool stopped accepting work, shutting down");
        pool_failure = Some(format!("pool rejected candidate {}", candidate));
        self.controller.cancel();
        break;
      }
      submitted += 1;
      trace!(submitted, "Submitted candidate");
    }

    // Closing the channel lets idle workers exit once the queue is empty
    drop(tx);

    for result in join_all(workers).await {
      if let Err(e) = result {
        error!(err = %e, "Probe worker failed");
        pool_failure.get_or_insert_with(|| format!("probe worker failed: {}", e));
      }
    }
    self.controller.finish();

    let report = tally.report(&self.controller, submitted).await;
    debug!(?report, "Dispatcher finished");

    if let Some(reason) = pool_failure {
      return Err(ScanError::PoolFailure(reason));
    }
    if report.cancelled {
      return Err(ScanError::Cancelled(Box::new(report)));
    }
    Ok(report)
  }
}

/// One member of the pool. Pulls candidates until the channel closes or the scan is cancelled.
struct ProbeWorker {
  worker_id: usize,
  rx: Arc<Mutex<mpsc::Receiver<CandidateHash>>>,
  classifier: Arc<Classifier>,
  controller: Arc<ScanController>,
  retry: RetryPolicy,
  tally: Arc<Tally>,
}

impl ProbeWorker {
  async fn run(self) {
    let worker_id = self.worker_id;
    let cancel = self.controller.token();
    trace!(worker_id, "Probe worker starting");
    let mut processed = 0u64;

    loop {
      let next = {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                trace!(worker_id, processed, "Probe worker cancelled");
                break;
            }
            candidate = rx.recv() => candidate,
        }
      };

      let Some(candidate) = next else {
        trace!(worker_id, processed, "Probe worker: input exhausted");
        break;
      };

      let resolution = self.resolve(&candidate, &cancel).await;
      self.tally.record(resolution, self.classifier.commit_url(&candidate)).await;
      self.controller.increment();
      processed += 1;
    }

    trace!(worker_id, processed, "Probe worker finished");
  }

  /// Probe until the candidate reaches a terminal outcome.
  ///
  /// Each 429 costs one flat cooldown on this worker only, then one more attempt.
  async fn resolve(&self, candidate: &CandidateHash, cancel: &CancellationToken) -> Resolution {
    let mut attempt: u32 = 0;

    loop {
      let outcome = self.classifier.classify(candidate).await;
      if outcome.is_terminal() {
        if attempt > 0 {
          debug!(candidate = %candidate, attempt, ?outcome, "Rate-limited candidate resolved");
        }
        return Resolution::Outcome(outcome);
      }

      attempt += 1;
      if let Some(max) = self.retry.max_retries
        && attempt > max
      {
        self.controller.suspend(|| {
          warn!(
            candidate = %candidate,
            max_retries = max,
            "Retry limit reached for rate-limited candidate, abandoning"
          )
        });
        return Resolution::Abandoned;
      }

      self.tally.retries.fetch_add(1, Ordering::Relaxed);
      self.controller.suspend(|| {
        warn!(
          url = %self.classifier.commit_url(candidate),
          attempt,
          cooldown_secs = self.retry.cooldown.as_secs(),
          "Received 429, submitting too many requests; retrying after cooldown"
        )
      });

      tokio::select! {
          biased;
          _ = cancel.cancelled() => {
              debug!(candidate = %candidate, attempt, "Cancelled during cooldown, abandoning retry");
              return Resolution::Abandoned;
          }
          _ = sleep(self.retry.cooldown) => {}
      }
    }
  }
}
