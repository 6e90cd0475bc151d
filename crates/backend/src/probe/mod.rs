//! Commit existence probes and hit classification.

mod canonical;
mod headers;
mod http;

use std::sync::Arc;

use async_trait::async_trait;
use indicatif::ProgressBar;
use tracing::{debug, warn};

pub use canonical::{BROWSER_USER_AGENT, CanonicalHashSet, UpstreamUnavailable};
pub use headers::{SPOOFED_IP_HEADERS, SeedSequence, XorShift64, random_ip, random_user_agent, spoofed_headers};
pub use http::{HttpProbe, build_client};

use crate::domain::hash_space::CandidateHash;
use crate::output::{Finding, FindingKind, FindingSink};

/// What a single probe found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeOutcome {
  /// No commit page (404 or any other non-200, non-429 status)
  NotFound,
  /// Commit page exists and the short hash prefixes a canonical hash
  MainlineCommit,
  /// Commit page exists but no canonical hash starts with the short hash
  ForkCommit,
  /// 429; the caller retries after a cooldown
  RateLimited,
  /// The request itself failed; the candidate is not retried
  TransportError,
}

impl ProbeOutcome {
  /// Everything except `RateLimited` ends a candidate
  pub fn is_terminal(self) -> bool {
    !matches!(self, ProbeOutcome::RateLimited)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
}

/// One HTTP existence check against a commit URL.
#[async_trait]
pub trait CommitProbe: Send + Sync {
  /// GET `url` and return the status code. The body is never read.
  async fn status(&self, url: &str) -> Result<u16, ProbeError>;
}

/// Map a probe status onto an outcome.
pub fn classify_status(status: u16, candidate: &CandidateHash, canonical: &CanonicalHashSet) -> ProbeOutcome {
  match status {
    200 if canonical.contains_prefix(candidate.as_str()) => ProbeOutcome::MainlineCommit,
    200 => ProbeOutcome::ForkCommit,
    429 => ProbeOutcome::RateLimited,
    _ => ProbeOutcome::NotFound,
  }
}

/// `<web_url>/commit/<candidate>`
pub fn commit_url(web_url: &str, candidate: &CandidateHash) -> String {
  format!("{}/commit/{}", web_url.trim_end_matches('/'), candidate)
}

/// Probes one candidate, classifies the response and reports hits.
///
/// Performs no retries or waits of its own; `RateLimited` goes back to the caller.
pub struct Classifier {
  probe: Arc<dyn CommitProbe>,
  canonical: Arc<CanonicalHashSet>,
  sink: Arc<dyn FindingSink>,
  web_url: String,
  progress: ProgressBar,
}

impl Classifier {
  pub fn new(
    probe: Arc<dyn CommitProbe>,
    canonical: Arc<CanonicalHashSet>,
    sink: Arc<dyn FindingSink>,
    web_url: impl Into<String>,
  ) -> Self {
    Self {
      probe,
      canonical,
      sink,
      web_url: web_url.into(),
      progress: ProgressBar::hidden(),
    }
  }

  /// Clear `progress` while logging so warnings don't tear the bar
  pub fn with_progress(mut self, progress: ProgressBar) -> Self {
    self.progress = progress;
    self
  }

  pub fn commit_url(&self, candidate: &CandidateHash) -> String {
    commit_url(&self.web_url, candidate)
  }

  pub async fn classify(&self, candidate: &CandidateHash) -> ProbeOutcome {
    let url = self.commit_url(candidate);

    let status = match self.probe.status(&url).await {
      Ok(status) => status,
      Err(e) => {
        self
          .progress
          .suspend(|| warn!(url = %url, err = %e, "Issue when probing commit, skipping candidate"));
        return ProbeOutcome::TransportError;
      }
    };

    let outcome = classify_status(status, candidate, &self.canonical);
    debug!(candidate = %candidate, status, ?outcome, "Classified probe");

    let kind = match outcome {
      ProbeOutcome::ForkCommit => Some(FindingKind::Fork),
      ProbeOutcome::MainlineCommit => Some(FindingKind::Mainline),
      _ => None,
    };
    if let Some(kind) = kind {
      self.sink.report(&Finding { kind, url });
    }

    outcome
  }
}
