//! Status lines for probe hits.
//!
//! Hits are results, not logs: they go to stdout with a colour tag, printed
//! above the progress bar so the bar stays intact.

use std::fmt;

use indicatif::ProgressBar;

const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[93m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindingKind {
  /// Commit absent from every canonical branch
  Fork,
  /// Commit whose prefix matches a canonical hash
  Mainline,
}

impl FindingKind {
  pub fn tag(self) -> &'static str {
    match self {
      FindingKind::Fork => "[Fork Detected]",
      FindingKind::Mainline => "[Repo Commit]",
    }
  }

  fn color(self) -> &'static str {
    match self {
      FindingKind::Fork => YELLOW,
      FindingKind::Mainline => CYAN,
    }
  }
}

/// A commit page that exists for a probed short hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
  pub kind: FindingKind,
  pub url: String,
}

impl Finding {
  /// Colour-tagged status line
  pub fn render(&self) -> String {
    format!("{}{}{} {}", self.kind.color(), self.kind.tag(), RESET, self.url)
  }
}

impl fmt::Display for Finding {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.kind.tag(), self.url)
  }
}

/// Destination for findings. Called concurrently from every worker.
pub trait FindingSink: Send + Sync {
  fn report(&self, finding: &Finding);
}

/// Writes findings to stdout, suspending the progress bar around each line
pub struct ConsoleSink {
  progress: ProgressBar,
}

impl ConsoleSink {
  pub fn new(progress: ProgressBar) -> Self {
    Self { progress }
  }
}

impl FindingSink for ConsoleSink {
  fn report(&self, finding: &Finding) {
    self.progress.suspend(|| println!("{}", finding.render()));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_render_tags() {
    let fork = Finding {
      kind: FindingKind::Fork,
      url: "https://github.com/o/r/commit/ffee".to_string(),
    };
    assert_eq!(
      fork.render(),
      "\x1b[93m[Fork Detected]\x1b[0m https://github.com/o/r/commit/ffee"
    );

    let mainline = Finding {
      kind: FindingKind::Mainline,
      url: "https://github.com/o/r/commit/a1b2".to_string(),
    };
    assert!(mainline.render().starts_with("\x1b[36m[Repo Commit]"));
    assert_eq!(mainline.to_string(), "[Repo Commit] https://github.com/o/r/commit/a1b2");
  }
}
