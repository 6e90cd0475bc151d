//! End-to-end scans: real HTTP probes, dispatcher and worker pool against a local server

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CannedServer, CollectingSink};
use gitsniff::hash_space::{CandidateHash, HashSpace};
use gitsniff::output::FindingKind;
use gitsniff::probe::{CanonicalHashSet, Classifier, HttpProbe, build_client};
use gitsniff::scan::{Dispatcher, FixedWindowThrottle, RetryPolicy, ScanController, ScanError};
use pretty_assertions::assert_eq;

const REPO_PATH: &str = "/owner/repo";

struct Scan {
  server: CannedServer,
  sink: Arc<CollectingSink>,
  controller: Arc<ScanController>,
  dispatcher: Dispatcher,
}

async fn scan(routes: Vec<(&str, Vec<(u16, &str)>)>, canonical: CanonicalHashSet, total: u64, workers: usize) -> Scan {
  let server = CannedServer::start(routes).await;
  let client = build_client(Some(Duration::from_secs(5))).unwrap();
  let sink = Arc::new(CollectingSink::default());
  let controller = Arc::new(ScanController::hidden(total));

  let classifier = Arc::new(Classifier::new(
    Arc::new(HttpProbe::new(client)),
    Arc::new(canonical),
    sink.clone(),
    server.url(REPO_PATH),
  ));
  let dispatcher = Dispatcher::new(
    workers,
    RetryPolicy {
      cooldown: Duration::from_millis(50),
      max_retries: None,
    },
    classifier,
    Arc::clone(&controller),
    Box::new(FixedWindowThrottle::new(450, Duration::from_secs(60))),
  );

  Scan {
    server,
    sink,
    controller,
    dispatcher,
  }
}

fn hashes(values: &[&str]) -> Vec<CandidateHash> {
  values.iter().map(|h| CandidateHash::from(*h)).collect()
}

#[tokio::test]
async fn test_mainline_and_fork_hits_are_reported() {
  let scan = scan(
    vec![
      ("/owner/repo/commit/a1b2", vec![(200, "")]),
      ("/owner/repo/commit/ffee", vec![(200, "")]),
    ],
    CanonicalHashSet::from_hashes(["a1b2c3d4e5f6"]),
    4,
    3,
  )
  .await;

  let report = scan
    .dispatcher
    .run(hashes(&["0010", "a1b2", "c0de", "ffee"]))
    .await
    .unwrap();

  assert_eq!(report.completed, 4);
  assert_eq!(report.not_found, 2);
  assert_eq!(report.mainline_commits, vec![scan.server.url("/owner/repo/commit/a1b2")]);
  assert_eq!(report.fork_commits, vec![scan.server.url("/owner/repo/commit/ffee")]);

  let mut findings: Vec<(FindingKind, String)> = scan
    .sink
    .findings
    .lock()
    .unwrap()
    .iter()
    .map(|f| (f.kind, f.url.clone()))
    .collect();
  findings.sort_by(|a, b| a.1.cmp(&b.1));
  assert_eq!(
    findings,
    vec![
      (FindingKind::Mainline, scan.server.url("/owner/repo/commit/a1b2")),
      (FindingKind::Fork, scan.server.url("/owner/repo/commit/ffee")),
    ]
  );
}

#[tokio::test]
async fn test_rate_limited_probe_is_retried_once_resolved() {
  let scan = scan(
    vec![("/owner/repo/commit/beef", vec![(429, ""), (429, ""), (200, "")])],
    CanonicalHashSet::empty(),
    2,
    2,
  )
  .await;

  let report = scan.dispatcher.run(hashes(&["beef", "0010"])).await.unwrap();
  assert_eq!(report.rate_limited_retries, 2);
  assert_eq!(report.forks, 1);
  assert_eq!(report.not_found, 1);
  // progress counts each candidate once
  assert_eq!(scan.controller.completed(), 2);
  assert_eq!(scan.server.requests_for("/owner/repo/commit/beef").len(), 3);
}

#[tokio::test]
async fn test_full_hash_space_is_probed_once_each() {
  let space = HashSpace::new(4).unwrap();
  let candidates: Vec<CandidateHash> = space.iter().take(64).collect();
  let scan = scan(vec![], CanonicalHashSet::empty(), 64, 3).await;

  let report = scan.dispatcher.run(candidates.clone()).await.unwrap();
  assert_eq!(report.completed, 64);
  assert_eq!(report.not_found, 64);

  let mut seen: Vec<String> = scan.server.requests().into_iter().map(|r| r.path).collect();
  seen.sort();
  let expected: Vec<String> = candidates
    .iter()
    .map(|c| format!("/owner/repo/commit/{}", c))
    .collect();
  assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_cancelled_scan_returns_partial_report() {
  let scan = scan(vec![], CanonicalHashSet::empty(), 1000, 2).await;
  scan.controller.cancel();

  let candidates: Vec<CandidateHash> = HashSpace::new(4).unwrap().iter().take(1000).collect();
  match scan.dispatcher.run(candidates).await {
    Err(ScanError::Cancelled(report)) => {
      assert!(report.cancelled);
      assert_eq!(report.submitted, 0);
      assert_eq!(report.completed, 0);
    }
    other => panic!("expected cancellation, got {:?}", other),
  }
  assert!(scan.server.requests().is_empty());
}
