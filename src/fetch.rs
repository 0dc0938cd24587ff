use std::time::Duration;

use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT};
use reqwest::StatusCode;
use tracing::{debug, warn};

/// HLTV answers absent archive sections with a minimal shell page rather
/// than a 404; anything below this byte count cannot hold a listing.
pub const MIN_PLAUSIBLE_BODY: usize = 1000;

const MAX_ATTEMPTS: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Classified result of one page fetch, after retries.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// 2xx with a plausibly sized body.
    Page(String),
    /// 404, or a shell body too small to hold a listing. Never retried.
    Missing,
    /// Retry budget exhausted on timeouts, transport errors or non-404
    /// HTTP errors. "Unknown", not "empty".
    Failed,
}

/// Seam between the crawl machinery and the network, so the estimator and
/// crawler state machines can run against scripted pages in tests.
pub trait Fetch {
    async fn fetch(&mut self, url: &str) -> FetchOutcome;
}

/// Fixed inter-request delays. Tests run with `Pacing::none()`.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Between boundary-estimation probes.
    pub probe: Duration,
    /// After each crawled page.
    pub page: Duration,
    /// Between partitions.
    pub partition: Duration,
    /// Multiplied by the attempt number for retry backoff.
    pub retry_base: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            probe: Duration::from_millis(500),
            page: Duration::from_millis(1500),
            partition: Duration::from_secs(2),
            retry_base: Duration::from_secs(3),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            probe: Duration::ZERO,
            page: Duration::ZERO,
            partition: Duration::ZERO,
            retry_base: Duration::ZERO,
        }
    }
}

/// Real fetcher over a shared `reqwest::Client` with a browser header
/// profile. Retries transient errors with linear backoff; 404s and shell
/// pages short-circuit to `Missing`.
pub struct HttpFetcher {
    client: reqwest::Client,
    retry_base: Duration,
}

impl HttpFetcher {
    pub fn new(pacing: &Pacing) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            retry_base: pacing.retry_base,
        })
    }

    async fn try_once(&self, url: &str) -> Result<FetchOutcome> {
        debug!("GET {url}");
        let resp = self.client.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!("404: {url}");
            return Ok(FetchOutcome::Missing);
        }
        let body = resp.error_for_status()?.text().await?;
        if body.len() < MIN_PLAUSIBLE_BODY {
            debug!("shell page ({} bytes): {url}", body.len());
            return Ok(FetchOutcome::Missing);
        }
        Ok(FetchOutcome::Page(body))
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&mut self, url: &str) -> FetchOutcome {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_once(url).await {
                Ok(outcome) => return outcome,
                Err(e) if attempt < MAX_ATTEMPTS => {
                    let wait = self.retry_base * attempt;
                    warn!(
                        "request failed (attempt {attempt}/{MAX_ATTEMPTS}): {e}; \
                         retrying in {}s",
                        wait.as_secs()
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => warn!("giving up on {url}: {e}"),
            }
        }
        FetchOutcome::Failed
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        "Upgrade-Insecure-Requests",
        HeaderValue::from_static("1"),
    );
    headers
}

// ── Test support ──
