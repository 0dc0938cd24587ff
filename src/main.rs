mod bounds;
mod crawl;
mod extract;
mod fetch;
mod pages;
mod report;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info, warn};

use crawl::{CrawlConfig, Crawler, Mode, PartitionState};
use fetch::{HttpFetcher, Pacing};
use report::Report;

#[derive(Parser)]
#[command(
    name = "hltv_scraper",
    about = "Collects every player nickname from the HLTV archive (A-Z)"
)]
struct Cli {
    /// Traversal policy: estimator-driven page walk, or link following.
    #[arg(long, value_enum, default_value_t = Mode::Bounded)]
    mode: Mode,
    /// Directory the JSON/TXT/CSV reports are written to.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
    /// Drop low-confidence free-text matches from the result set.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let t0 = Instant::now();

    let outcome = run(cli).await;
    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    match outcome {
        Ok(summary) if summary.total > 0 && !summary.interrupted => ExitCode::SUCCESS,
        Ok(summary) => {
            if summary.total == 0 {
                eprintln!("No player nicknames collected");
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("run failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

struct RunSummary {
    total: usize,
    interrupted: bool,
}

async fn run(cli: Cli) -> anyhow::Result<RunSummary> {
    let pacing = Pacing::default();
    let fetcher = HttpFetcher::new(&pacing)?;
    let config = CrawlConfig {
        mode: cli.mode,
        keep_guessed: !cli.strict,
        ..CrawlConfig::default()
    };
    let mut crawler = Crawler::new(fetcher, pacing, config);

    let mut interrupted = false;
    tokio::select! {
        stats = crawler.run() => {
            info!(
                "crawl finished: {} partitions ({} failed), {} fetches, {} names",
                stats.partitions, stats.failed, stats.fetches, stats.names
            );
        }
        _ = tokio::signal::ctrl_c() => {
            interrupted = true;
            warn!("interrupted; keeping partial results");
        }
    }

    let failed: Vec<String> = crawler
        .runs()
        .iter()
        .filter(|r| r.state == PartitionState::Failed)
        .map(|r| r.partition.to_string())
        .collect();
    if !failed.is_empty() {
        warn!("skipped partitions: {}", failed.join(", "));
    }

    let mode = cli.mode.to_string();
    let nicknames = crawler.into_names().into_sorted();
    let total = nicknames.len();

    if total == 0 {
        return Ok(RunSummary { total, interrupted });
    }

    println!("Collected {total} unique nicknames");
    println!("\nDistribution by first letter:");
    for (letter, count) in report::letter_distribution(&nicknames) {
        println!("  {letter}: {count}");
    }

    let report = Report::new(nicknames, &mode);
    report.write_all(&cli.out_dir)?;

    Ok(RunSummary { total, interrupted })
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
