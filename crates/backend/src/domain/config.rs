//! Scan configuration.
//!
//! Numeric settings can come from an optional TOML file; the CLI layers its
//! flags on top and the result is validated once into an immutable
//! [`ScanConfig`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Web root every scanned repository must live under
pub const WEB_ROOT: &str = "https://github.com";
/// API root used for the canonical commit listing
pub const API_ROOT: &str = "https://api.github.com";

pub const DEFAULT_MAX_WORKERS: usize = 3;
/// Upper bound on the worker pool; also bounds the submission channel
pub const MAX_WORKERS: usize = 1024;
pub const DEFAULT_HASH_DIGITS: u32 = 4;
pub const MIN_HASH_DIGITS: u32 = 4;
/// 16^15 is the widest range that still fits in a `u64`
pub const MAX_HASH_DIGITS: u32 = 15;
pub const DEFAULT_RATE_LIMIT: usize = 450;
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;
pub const DEFAULT_RETRY_COOLDOWN_SECS: u64 = 15;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("url must point to a Github repository (got {0})")]
  NotGithub(String),
  #[error("url must name an owner and a repository (got {0})")]
  MissingRepoPath(String),
  #[error("maxworkers must spawn at least 1 worker")]
  NoWorkers,
  #[error("maxworkers must not exceed {MAX_WORKERS} (got {0})")]
  TooManyWorkers(usize),
  #[error("digits must be between {MIN_HASH_DIGITS} and {MAX_HASH_DIGITS} (got {0})")]
  Digits(u32),
  #[error("ratelimit must be greater than or equal to 1")]
  RateLimit,
  #[error("rate window must be at least 1 second")]
  RateWindow,
  #[error("retry cooldown must be at least 1 second")]
  RetryCooldown,
  #[error("unknown limiter '{0}' (expected 'fixed' or 'sliding')")]
  Limiter(String),
  #[error("Failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

/// Admission strategy used to pace probe submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimiterKind {
  /// Pause a full window after every `rate_limit` submissions
  #[default]
  Fixed,
  /// Keep at most `rate_limit` submissions inside any rolling window
  Sliding,
}

impl FromStr for LimiterKind {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "fixed" => Ok(Self::Fixed),
      "sliding" => Ok(Self::Sliding),
      other => Err(ConfigError::Limiter(other.to_string())),
    }
  }
}

/// Tunables that may be supplied by a config file.
///
/// Every field is optional in the file; missing ones take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
  /// Worker tasks probing in parallel, at most `MAX_WORKERS`
  /// Default: 3
  pub max_workers: usize,

  /// Width of the short hashes to enumerate
  /// Default: 4
  pub hash_digits: u32,

  /// Probe submissions allowed per rate window
  /// Default: 450
  pub rate_limit: usize,

  /// Length of the rate window in seconds
  /// Default: 60
  pub rate_window_secs: u64,

  /// Flat wait before re-probing a candidate that came back 429, at least 1
  /// Default: 15
  pub retry_cooldown_secs: u64,

  /// Give up on a candidate after this many 429s (unset = never give up)
  pub max_retries: Option<u32>,

  /// Per-request timeout in seconds (0 = no timeout)
  /// Default: 30
  pub timeout_secs: u64,

  pub limiter: LimiterKind,
}

impl Default for ScanSettings {
  fn default() -> Self {
    Self {
      max_workers: DEFAULT_MAX_WORKERS,
      hash_digits: DEFAULT_HASH_DIGITS,
      rate_limit: DEFAULT_RATE_LIMIT,
      rate_window_secs: DEFAULT_RATE_WINDOW_SECS,
      retry_cooldown_secs: DEFAULT_RETRY_COOLDOWN_SECS,
      max_retries: None,
      timeout_secs: DEFAULT_TIMEOUT_SECS,
      limiter: LimiterKind::default(),
    }
  }
}

impl ScanSettings {
  /// Load settings from a TOML file
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }
}

/// The repository being scanned, in both of its URL forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
  /// `owner/repo`
  pub slug: String,
  /// Web URL that commit probes are appended to
  pub web_url: String,
  /// Commit-listing endpoint for the canonical hash set
  pub api_url: String,
}

impl RepoTarget {
  /// Parse a repository web URL such as `https://github.com/owner/repo/`.
  ///
  /// Anything after `owner/repo` (e.g. `/tree/main`) and a trailing `.git` is dropped.
  pub fn parse(url: &str) -> Result<Self, ConfigError> {
    if !url.contains(WEB_ROOT) {
      return Err(ConfigError::NotGithub(url.to_string()));
    }

    let marker = format!("{}/", WEB_ROOT);
    let path = url
      .find(&marker)
      .map(|start| &url[start + marker.len()..])
      .ok_or_else(|| ConfigError::MissingRepoPath(url.to_string()))?;

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let (owner, repo) = match (segments.next(), segments.next()) {
      (Some(owner), Some(repo)) => (owner, repo.strip_suffix(".git").unwrap_or(repo)),
      _ => return Err(ConfigError::MissingRepoPath(url.to_string())),
    };
    if repo.is_empty() {
      return Err(ConfigError::MissingRepoPath(url.to_string()));
    }

    let slug = format!("{}/{}", owner, repo);
    Ok(Self {
      web_url: format!("{}/{}", WEB_ROOT, slug),
      api_url: format!("{}/repos/{}/commits", API_ROOT, slug),
      slug,
    })
  }
}

/// Validated, immutable scan configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
  pub repo: RepoTarget,
  pub max_workers: usize,
  pub hash_digits: u32,
  pub rate_limit: usize,
  pub rate_window: Duration,
  pub retry_cooldown: Duration,
  pub max_retries: Option<u32>,
  /// `None` leaves requests unbounded
  pub request_timeout: Option<Duration>,
  pub limiter: LimiterKind,
}

impl ScanConfig {
  pub fn new(url: &str, settings: ScanSettings) -> Result<Self, ConfigError> {
    let repo = RepoTarget::parse(url)?;

    if settings.max_workers == 0 {
      return Err(ConfigError::NoWorkers);
    }
    if settings.max_workers > MAX_WORKERS {
      return Err(ConfigError::TooManyWorkers(settings.max_workers));
    }
    if !(MIN_HASH_DIGITS..=MAX_HASH_DIGITS).contains(&settings.hash_digits) {
      return Err(ConfigError::Digits(settings.hash_digits));
    }
    if settings.rate_limit == 0 {
      return Err(ConfigError::RateLimit);
    }
    if settings.rate_window_secs == 0 {
      return Err(ConfigError::RateWindow);
    }
    if settings.retry_cooldown_secs == 0 {
      return Err(ConfigError::RetryCooldown);
    }

    Ok(Self {
      repo,
      max_workers: settings.max_workers,
      hash_digits: settings.hash_digits,
      rate_limit: settings.rate_limit,
      rate_window: Duration::from_secs(settings.rate_window_secs),
      retry_cooldown: Duration::from_secs(settings.retry_cooldown_secs),
      max_retries: settings.max_retries,
      request_timeout: (settings.timeout_secs > 0).then(|| Duration::from_secs(settings.timeout_secs)),
      limiter: settings.limiter,
    })
  }
}
