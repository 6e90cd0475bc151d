//! Common test utilities for gitsniff integration tests
//!
//! `CannedServer` answers plain HTTP/1.1 requests on localhost with scripted
//! responses per path, and records every request it saw so tests can assert
//! on paths and headers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use gitsniff::output::{Finding, FindingSink};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct RecordedRequest {
  pub path: String,
  /// Header names are lowercased
  pub headers: HashMap<String, String>,
}

type Routes = Arc<Mutex<HashMap<String, VecDeque<(u16, String)>>>>;

pub struct CannedServer {
  pub base_url: String,
  requests: Arc<Mutex<Vec<RecordedRequest>>>,
  handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl CannedServer {
  /// Serve `routes`: each path answers with its queued responses in order, then 404
  pub async fn start(routes: Vec<(&str, Vec<(u16, &str)>)>) -> Self {
    let routes: Routes = Arc::new(Mutex::new(
      routes
        .into_iter()
        .map(|(path, responses)| {
          let queue = responses.into_iter().map(|(s, b)| (s, b.to_string())).collect();
          (path.to_string(), queue)
        })
        .collect(),
    ));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");

    let handle = {
      let requests = Arc::clone(&requests);
      tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
          let routes = Arc::clone(&routes);
          let requests = Arc::clone(&requests);
          tokio::spawn(async move {
            let _ = handle_connection(stream, routes, requests).await;
          });
        }
      })
    };

    Self {
      base_url: format!("http://{}", addr),
      requests,
      handle,
    }
  }

  pub fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  pub fn requests(&self) -> Vec<RecordedRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
    self.requests().into_iter().filter(|r| r.path == path).collect()
  }
}

impl Drop for CannedServer {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

async fn handle_connection(
  mut stream: TcpStream,
  routes: Routes,
  requests: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
  let mut buf = Vec::new();
  let mut chunk = [0u8; 1024];
  while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
    let n = stream.read(&mut chunk).await?;
    if n == 0 {
      return Ok(());
    }
    buf.extend_from_slice(&chunk[..n]);
  }

  let head = String::from_utf8_lossy(&buf).to_string();
  let mut lines = head.split("\r\n");
  let path = lines
    .next()
    .and_then(|line| line.split_whitespace().nth(1))
    .unwrap_or("/")
    .to_string();
  let headers = lines
    .take_while(|line| !line.is_empty())
    .filter_map(|line| line.split_once(':'))
    .map(|(name, value)| (name.trim().to_lowercase(), value.trim().to_string()))
    .collect();

  requests.lock().unwrap().push(RecordedRequest {
    path: path.clone(),
    headers,
  });

  let (status, body) = routes
    .lock()
    .unwrap()
    .get_mut(&path)
    .and_then(|queue| queue.pop_front())
    .unwrap_or((404, "Not Found".to_string()));

  let reason = match status {
    200 => "OK",
    403 => "Forbidden",
    404 => "Not Found",
    429 => "Too Many Requests",
    _ => "Status",
  };
  let response = format!(
    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
    status,
    reason,
    body.len(),
    body
  );
  stream.write_all(response.as_bytes()).await?;
  stream.shutdown().await
}

/// Accepts connections and never answers
#[allow(dead_code)]
pub async fn silent_server() -> (String, JoinHandle<()>) {
  let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind silent listener");
  let addr = listener.local_addr().expect("listener address");
  let handle = tokio::spawn(async move {
    let mut held = Vec::new();
    while let Ok((stream, _)) = listener.accept().await {
      held.push(stream);
    }
  });
  (format!("http://{}", addr), handle)
}

/// Address with nothing listening on it
#[allow(dead_code)]
pub async fn closed_port_url() -> String {
  let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind probe listener");
  let addr = listener.local_addr().expect("listener address");
  drop(listener);
  format!("http://{}", addr)
}

/// Sink collecting findings in memory
#[derive(Default)]
#[allow(dead_code)]
pub struct CollectingSink {
  pub findings: Mutex<Vec<Finding>>,
}

impl FindingSink for CollectingSink {
  fn report(&self, finding: &Finding) {
    self.findings.lock().unwrap().push(finding.clone());
  }
}
