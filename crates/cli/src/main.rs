//! GitSniff CLI - sniffs for hidden or deleted forks of Github repositories

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use gitsniff::{
  Scanner,
  config::{LimiterKind, ScanConfig, ScanSettings},
  install_signal_handlers,
  scan::{ScanError, ScanReport},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod logging;

use logging::init_cli_logging;

const YELLOW: &str = "\x1b[93m";
const RESET: &str = "\x1b[0m";

const BANNER: &str = r"
   _____   _   _      _____           _    __    __
  / ____| (_) | |    / ____|         (_)  / _|  / _|
 | |  __   _  | |_  | (___    _ __    _  | |_  | |_
 | | |_ | | | | __|  \___ \  | '_ \  | | |  _| |  _|
 | |__| | | | | |_   ____) | | | | | | | | |   | |
  \_____| |_|  \__| |_____/  |_| |_| |_| |_|   |_|
";

#[derive(Parser, Debug)]
#[command(name = "gitsniff", version)]
#[command(about = "Sniffs for hidden or deleted forks of public (and certain private) Github repos.")]
#[command(after_help = "\
EXAMPLES:
  gitsniff -u https://github.com/owner/repo
  gitsniff -u https://github.com/owner/repo -m 5 -d 5 -r 300
  gitsniff -u https://github.com/owner/repo --config gitsniff.toml --limiter sliding")]
struct Cli {
  /// URL of the repository, e.g. "https://github.com/owner/repo"
  #[arg(short, long)]
  url: String,

  /// Maximum number of workers probing in parallel [default: 3]
  #[arg(short, long = "maxworkers")]
  max_workers: Option<usize>,

  /// Hex digits in the short hashes to enumerate, 4 to 15 [default: 4]
  #[arg(short, long)]
  digits: Option<u32>,

  /// Maximum probe submissions per minute [default: 450]
  #[arg(short, long = "ratelimit")]
  rate_limit: Option<usize>,

  /// Per-request timeout in seconds, 0 disables it [default: 30]
  #[arg(long, value_name = "SECS")]
  timeout: Option<u64>,

  /// Rate limiter strategy: fixed or sliding [default: fixed]
  #[arg(long)]
  limiter: Option<LimiterKind>,

  /// Give up on a candidate after this many 429 responses [default: never]
  #[arg(long)]
  max_retries: Option<u32>,

  /// TOML file with scan settings; flags given here take precedence
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Enable debug logging
  #[arg(short, long)]
  verbose: bool,
}

impl Cli {
  /// Settings from the config file (or defaults) with explicit flags applied on top
  fn settings(&self) -> Result<ScanSettings> {
    let mut settings = match &self.config {
      Some(path) => ScanSettings::load(path)?,
      None => ScanSettings::default(),
    };

    if let Some(workers) = self.max_workers {
      settings.max_workers = workers;
    }
    if let Some(digits) = self.digits {
      settings.hash_digits = digits;
    }
    if let Some(rate_limit) = self.rate_limit {
      settings.rate_limit = rate_limit;
    }
    if let Some(timeout) = self.timeout {
      settings.timeout_secs = timeout;
    }
    if let Some(limiter) = self.limiter {
      settings.limiter = limiter;
    }
    if self.max_retries.is_some() {
      settings.max_retries = self.max_retries;
    }

    Ok(settings)
  }
}

fn print_banner() {
  println!("{}{}{}", YELLOW, BANNER, RESET);
  println!("        Sniffing for Buried Forks.\n");
}

fn print_summary(report: &ScanReport) {
  println!(
    "Probed {} of {} candidates: {} fork commits, {} repo commits, {} not found, {} errors, {} rate-limit retries, {} abandoned",
    report.completed,
    report.total,
    report.forks,
    report.mainline,
    report.not_found,
    report.transport_errors,
    report.rate_limited_retries,
    report.abandoned,
  );
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(e) => {
      let help = matches!(
        e.kind(),
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
      );
      let _ = e.print();
      return if help { ExitCode::SUCCESS } else { ExitCode::FAILURE };
    }
  };

  init_cli_logging(cli.verbose);
  print_banner();

  let result = run(cli).await;
  match &result {
    Ok(report) => {
      println!("gitsniff complete.");
      print_summary(report);
    }
    Err(e) => {
      if let Some(ScanError::Cancelled(report)) = e.downcast_ref::<ScanError>() {
        println!("gitsniff cancelled.");
        print_summary(report);
      } else {
        error!("Error: {:#}", e);
      }
    }
  }
  ExitCode::from(exit_status(&result))
}

/// 0 only for a scan that ran to completion; errors and cancellation are 1
fn exit_status(result: &Result<ScanReport>) -> u8 {
  match result {
    Ok(_) => 0,
    Err(_) => 1,
  }
}

async fn run(cli: Cli) -> Result<ScanReport> {
  let settings = cli.settings()?;
  let config = ScanConfig::new(&cli.url, settings)?;

  let scanner = Scanner::new(config)?;
  let stop = CancellationToken::new();
  install_signal_handlers(scanner.controller(), stop.clone()).context("Unable to register signal handlers")?;

  let config = scanner.config();
  println!(
    "Launching gitsniff on {} with {} workers and {} query rate limit on {} digits...",
    config.repo.web_url, config.max_workers, config.rate_limit, config.hash_digits
  );
  info!(
    api = %config.repo.api_url,
    candidates = scanner.space().len(),
    limiter = ?config.limiter,
    "Scan starting"
  );

  let result = scanner.run().await;
  stop.cancel();
  Ok(result?)
}
