//! Progress and cancellation for a running scan.
//!
//! The controller owns the only mutable state shared by every worker: the
//! completed-probe counter and the cancellation token. Signal handlers call
//! [`ScanController::cancel`]; the dispatcher and workers only observe the token.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const PROGRESS_TEMPLATE: &str =
  "{spinner:.cyan} GitSniff Status [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, {eta})";

pub struct ScanController {
  total: u64,
  completed: AtomicU64,
  cancel_requested: AtomicBool,
  cancel: CancellationToken,
  progress: ProgressBar,
}

impl ScanController {
  /// Controller with a live progress bar on stderr.
  ///
  /// indicatif skips drawing when stderr is not a terminal.
  pub fn new(total: u64) -> Self {
    let progress = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
    progress.set_style(
      ProgressStyle::with_template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );
    Self::with_progress(total, progress)
  }

  /// Controller without any terminal output
  pub fn hidden(total: u64) -> Self {
    let progress = ProgressBar::hidden();
    progress.set_length(total);
    Self::with_progress(total, progress)
  }

  fn with_progress(total: u64, progress: ProgressBar) -> Self {
    Self {
      total,
      completed: AtomicU64::new(0),
      cancel_requested: AtomicBool::new(false),
      cancel: CancellationToken::new(),
      progress,
    }
  }

  /// Record one finished candidate. Returns the new completed count.
  pub fn increment(&self) -> u64 {
    let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
    self.progress.inc(1);
    completed
  }

  pub fn completed(&self) -> u64 {
    self.completed.load(Ordering::SeqCst)
  }

  pub fn total(&self) -> u64 {
    self.total
  }

  /// Request an orderly shutdown.
  ///
  /// Queued work never starts, in-flight probes finish. Only the first call
  /// has any effect; it returns `true`, later calls return `false`.
  pub fn cancel(&self) -> bool {
    if self.cancel_requested.swap(true, Ordering::SeqCst) {
      debug!("Shutdown already in progress, ignoring cancel");
      return false;
    }

    self.suspend(|| info!("Terminating workers..."));
    self.cancel.cancel();
    true
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Token observed by the dispatcher and workers
  pub fn token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// Run `f` with the bar cleared, so log lines written to stderr don't tear it
  pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
    self.progress.suspend(f)
  }

  /// Handle for printing above the bar
  pub fn progress_bar(&self) -> ProgressBar {
    self.progress.clone()
  }

  /// Stop drawing; leaves the bar in place if cancelled
  pub fn finish(&self) {
    if self.is_cancelled() {
      self.progress.abandon();
    } else {
      self.progress.finish();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[test]
  fn test_increment_counts() {
    let controller = ScanController::hidden(10);
    assert_eq!(controller.increment(), 1);
    assert_eq!(controller.increment(), 2);
    assert_eq!(controller.completed(), 2);
    assert_eq!(controller.total(), 10);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_increments_are_not_lost() {
    let controller = Arc::new(ScanController::hidden(4000));
    let handles: Vec<_> = (0..4)
      .map(|_| {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
          for _ in 0..1000 {
            controller.increment();
          }
        })
      })
      .collect();
    for handle in handles {
      handle.await.unwrap();
    }
    assert_eq!(controller.completed(), 4000);
  }

  #[test]
  fn test_cancel_is_one_shot() {
    let controller = ScanController::hidden(1);
    let token = controller.token();
    assert!(!controller.is_cancelled());

    assert!(controller.cancel());
    assert!(token.is_cancelled());
    assert!(!controller.cancel());
    assert!(controller.is_cancelled());
  }
}
