//! Canonical hash set - commits reachable from the repository's own branches.
//!
//! Fetched once from the commit-listing API before probing starts. Anything a
//! probe finds that is *not* a prefix of one of these hashes is reported as a
//! fork commit.

use std::collections::HashSet;

use serde::Deserialize;
use tracing::{debug, info, warn};

/// The API rejects some non-browser agents, so the listing request borrows a real one
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/127.0.0.0 Safari/537.36";

/// The commit listing could not be obtained. The scan continues with an empty set.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamUnavailable {
  #[error("response returned a status of {0}")]
  Status(u16),
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Unexpected commit listing: {0}")]
  Decode(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct CommitRecord {
  sha: String,
}

/// Immutable set of full commit hashes. Shared read-only across workers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalHashSet {
  hashes: HashSet<String>,
}

impl CanonicalHashSet {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn from_hashes<I, S>(hashes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      hashes: hashes.into_iter().map(|h| h.into().to_lowercase()).collect(),
    }
  }

  /// Decode a commit listing body (`[{"sha": "..."}, ...]`)
  pub fn from_json(body: &[u8]) -> Result<Self, UpstreamUnavailable> {
    let records: Vec<CommitRecord> = serde_json::from_slice(body)?;
    Ok(Self::from_hashes(records.into_iter().map(|r| r.sha)))
  }

  pub fn len(&self) -> usize {
    self.hashes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.hashes.is_empty()
  }

  /// True when some canonical hash starts with `short_hash`
  pub fn contains_prefix(&self, short_hash: &str) -> bool {
    self.hashes.iter().any(|h| h.starts_with(short_hash))
  }

  /// Single GET of the commit listing; no retries.
  pub async fn fetch(client: &reqwest::Client, api_url: &str) -> Result<Self, UpstreamUnavailable> {
    debug!(api_url, "Fetching canonical commit hashes");

    let response = client
      .get(api_url)
      .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
      .send()
      .await?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
      return Err(UpstreamUnavailable::Status(status.as_u16()));
    }

    let body = response.bytes().await?;
    Self::from_json(&body)
  }

  /// Fetch, degrading to an empty set on any failure.
  ///
  /// With an empty set every hit is reported as a fork.
  pub async fn fetch_or_empty(client: &reqwest::Client, api_url: &str) -> Self {
    match Self::fetch(client, api_url).await {
      Ok(set) => {
        info!(commits = set.len(), "Loaded canonical commit hashes");
        set
      }
      Err(e) => {
        warn!(
          api_url,
          err = %e,
          "Unable to reach commit listing; everything found might be flagged as a fork"
        );
        Self::empty()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_json_collects_shas() {
    let body = br#"[
      {"sha": "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678", "commit": {"message": "init"}},
      {"sha": "ffee000000000000000000000000000000000000", "url": "https://example"}
    ]"#;
    let set = CanonicalHashSet::from_json(body).unwrap();
    assert_eq!(set.len(), 2);
    assert!(set.contains_prefix("a1b2"));
    assert!(set.contains_prefix("ffee0"));
    assert!(!set.contains_prefix("beef"));
  }

  #[test]
  fn test_from_json_rejects_non_listing() {
    let err = CanonicalHashSet::from_json(br#"{"message": "API rate limit exceeded"}"#).unwrap_err();
    assert!(matches!(err, UpstreamUnavailable::Decode(_)));
  }

  #[test]
  fn test_contains_prefix_is_prefix_only() {
    let set = CanonicalHashSet::from_hashes(["a1b2c3d4e5"]);
    assert!(set.contains_prefix("a1b2"));
    assert!(set.contains_prefix("a1b2c3d4e5"));
    assert!(!set.contains_prefix("b2c3"));
  }

  #[test]
  fn test_empty_set_matches_nothing() {
    let set = CanonicalHashSet::empty();
    assert!(set.is_empty());
    assert!(!set.contains_prefix("ffee"));
  }
}
