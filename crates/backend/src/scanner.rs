//! Scan lifecycle.
//!
//! # Lifecycle
//!
//! 1. Validate configuration, size the hash space, create the controller
//! 2. Build the shared HTTP client (the pool's only fallible setup step)
//! 3. Caller registers signal handlers against the controller
//! 4. Fetch the canonical hash set once (degrades to empty on failure)
//! 5. Dispatch every candidate through the worker pool
//! 6. Drain and return the report, or `Cancelled` with the partial report

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
  domain::{
    config::ScanConfig,
    hash_space::{CandidateHash, HashSpace},
  },
  output::ConsoleSink,
  probe::{CanonicalHashSet, Classifier, HttpProbe, build_client},
  scan::{Dispatcher, ScanController, ScanError, ScanReport},
};

/// One configured scan of one repository.
pub struct Scanner {
  config: ScanConfig,
  space: HashSpace,
  client: reqwest::Client,
  controller: Arc<ScanController>,
}

impl Scanner {
  /// Scanner with a live progress bar
  pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
    let space = HashSpace::new(config.hash_digits)?;
    Self::with_controller(config, Arc::new(ScanController::new(space.len())))
  }

  /// Scanner reporting to an existing controller
  pub fn with_controller(config: ScanConfig, controller: Arc<ScanController>) -> Result<Self, ScanError> {
    let space = HashSpace::new(config.hash_digits)?;
    let client = build_client(config.request_timeout)?;

    Ok(Self {
      config,
      space,
      client,
      controller,
    })
  }

  pub fn config(&self) -> &ScanConfig {
    &self.config
  }

  pub fn space(&self) -> HashSpace {
    self.space
  }

  /// Controller to hand to signal handlers
  pub fn controller(&self) -> Arc<ScanController> {
    Arc::clone(&self.controller)
  }

  /// Scan the whole hash space
  pub async fn run(self) -> Result<ScanReport, ScanError> {
    let space = self.space;
    self.run_over(space.iter()).await
  }

  /// Scan only `candidates`, with the same canonical fetch and dispatch as [`Scanner::run`]
  pub async fn run_over<I>(self, candidates: I) -> Result<ScanReport, ScanError>
  where
    I: IntoIterator<Item = CandidateHash>,
  {
    let cancel = self.controller.token();
    let repo = &self.config.repo;

    let canonical = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("Cancelled before probing started");
            self.controller.finish();
            return Err(ScanError::Cancelled(Box::new(ScanReport {
                total: self.controller.total(),
                cancelled: true,
                ..Default::default()
            })));
        }
        set = CanonicalHashSet::fetch_or_empty(&self.client, &repo.api_url) => Arc::new(set),
    };
    debug!(canonical = canonical.len(), "Canonical hash set ready");

    let probe = Arc::new(HttpProbe::new(self.client.clone()));
    let sink = Arc::new(ConsoleSink::new(self.controller.progress_bar()));
    let classifier =
      Arc::new(Classifier::new(probe, canonical, sink, repo.web_url.clone()).with_progress(self.controller.progress_bar()));

    let dispatcher = Dispatcher::from_config(&self.config, classifier, Arc::clone(&self.controller));
    dispatcher.run(candidates).await
  }
}

/// Route SIGINT and SIGTERM (Ctrl-C elsewhere) to `controller.cancel()`.
///
/// Returns an error if the handlers cannot be registered. Repeated signals
/// are no-ops once shutdown has begun. The listener exits when `stop` fires.
pub fn install_signal_handlers(controller: Arc<ScanController>, stop: CancellationToken) -> std::io::Result<()> {
  #[cfg(unix)]
  {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
      loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        if controller.cancel() {
          info!("Received shutdown signal, draining workers");
        }
      }
    });
  }

  #[cfg(not(unix))]
  {
    tokio::spawn(async move {
      loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!("Failed to listen for ctrl-c: {}", e);
                    break;
                }
            }
        }
        if controller.cancel() {
          info!("Received ctrl-c, draining workers");
        }
      }
    });
  }

  Ok(())
}
