use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use super::headers::{SeedSequence, spoofed_headers};
use super::{CommitProbe, ProbeError};

/// Build the HTTP client shared by the canonical fetch and every probe.
///
/// `timeout` of `None` leaves requests unbounded.
pub fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client, reqwest::Error> {
  let mut builder = reqwest::Client::builder();
  if let Some(timeout) = timeout {
    builder = builder.timeout(timeout);
  }
  builder.build()
}

/// Probes commit pages over HTTP with randomised headers on every request.
#[derive(Debug)]
pub struct HttpProbe {
  client: reqwest::Client,
  seeds: SeedSequence,
}

impl HttpProbe {
  pub fn new(client: reqwest::Client) -> Self {
    Self {
      client,
      seeds: SeedSequence::from_clock(),
    }
  }

  /// Use a fixed header seed (reproducible headers)
  pub fn with_seed(mut self, seed: u64) -> Self {
    self.seeds = SeedSequence::new(seed);
    self
  }
}

#[async_trait]
impl CommitProbe for HttpProbe {
  async fn status(&self, url: &str) -> Result<u16, ProbeError> {
    let headers = spoofed_headers(&mut self.seeds.generator());

    let response = self.client.get(url).headers(headers).send().await?;
    let status = response.status().as_u16();
    trace!(url, status, "Probe response");

    Ok(status)
  }
}
