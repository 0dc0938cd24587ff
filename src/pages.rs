use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::extract::{self, Confidence, Nickname};
use crate::fetch::{Fetch, FetchOutcome, Pacing};

pub const BASE_URL: &str = "https://www.hltv.org/players";

/// Players shown per archive page; pagination offsets are multiples of this.
pub const PAGE_SIZE: u32 = 52;

static OFFSET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"offset=(\d+)").unwrap());
static PAGING_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="offset="]"#).unwrap());

/// One slice of the crawl space: a starting letter, or the unpartitioned
/// archive front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    All,
    Letter(char),
}

impl Partition {
    pub fn letters() -> impl Iterator<Item = Partition> {
        ('A'..='Z').map(Partition::Letter)
    }

    pub fn url(&self) -> String {
        match self {
            Partition::All => BASE_URL.to_string(),
            Partition::Letter(c) => format!("{BASE_URL}/{c}"),
        }
    }

    /// Page 0 is the bare partition URL; page i >= 1 carries
    /// `offset = i * PAGE_SIZE`.
    pub fn page_url(&self, page: u32) -> String {
        if page == 0 {
            self.url()
        } else {
            format!("{}?offset={}", self.url(), page * PAGE_SIZE)
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::All => write!(f, "all"),
            Partition::Letter(c) => write!(f, "{c}"),
        }
    }
}

/// A single fetchable unit: partition plus zero-based page index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub partition: Partition,
    pub page: u32,
}

impl PageRef {
    pub fn url(&self) -> String {
        self.partition.page_url(self.page)
    }
}

/// Page indices advertised by pagination anchors in `body`, ascending and
/// deduplicated.
pub fn linked_pages(body: &str) -> Vec<u32> {
    let doc = Html::parse_document(body);
    let mut pages: Vec<u32> = doc
        .select(&PAGING_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| OFFSET_RE.captures(href))
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .map(|offset| offset / PAGE_SIZE)
        .collect();
    pages.sort_unstable();
    pages.dedup();
    pages
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Ok,
    /// Structurally absent: 404 or shell body.
    Missing,
    /// Transient failures exhausted the retry budget.
    Failed,
}

/// Everything the crawl needs from one fetched page.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub status: PageStatus,
    pub names: Vec<Nickname>,
    linked: Vec<u32>,
}

impl PageResult {
    fn absent(status: PageStatus) -> Self {
        Self {
            status,
            names: Vec::new(),
            linked: Vec::new(),
        }
    }

    /// A page counts as content-bearing only on confidently extracted names;
    /// `Guessed` tokens never drive pagination decisions, or a drifted shell
    /// page would look endless.
    pub fn has_listing(&self) -> bool {
        self.status == PageStatus::Ok
            && self.names.iter().any(|n| n.confidence == Confidence::Listed)
    }

    /// Smallest advertised page index beyond `current`.
    pub fn next_after(&self, current: u32) -> Option<u32> {
        self.linked.iter().copied().find(|&p| p > current)
    }
}

/// Fetch + extract behind a per-run cache: any URL goes over the wire at
/// most once, and boundary probes are reused when the same page is crawled
/// afterwards.
pub struct PageReader<F: Fetch> {
    fetcher: F,
    pacing: Pacing,
    cache: HashMap<String, PageResult>,
    fetches: usize,
}

impl<F: Fetch> PageReader<F> {
    pub fn new(fetcher: F, pacing: Pacing) -> Self {
        Self {
            fetcher,
            pacing,
            cache: HashMap::new(),
            fetches: 0,
        }
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// Distinct URLs actually requested.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    pub fn get(&self, url: &str) -> Option<&PageResult> {
        self.cache.get(url)
    }

    #[cfg(test)]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Load a page, hitting the network only on a cache miss. `delay` is
    /// applied after a real fetch, never after a cache hit.
    pub async fn load(&mut self, url: &str, delay: Duration) -> &PageResult {
        if !self.cache.contains_key(url) {
            let result = match self.fetcher.fetch(url).await {
                FetchOutcome::Page(body) => PageResult {
                    status: PageStatus::Ok,
                    names: extract::extract(&body),
                    linked: linked_pages(&body),
                },
                FetchOutcome::Missing => PageResult::absent(PageStatus::Missing),
                FetchOutcome::Failed => PageResult::absent(PageStatus::Failed),
            };
            self.fetches += 1;
            self.cache.insert(url.to_string(), result);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        } else {
            debug!("cache hit: {url}");
        }
        &self.cache[url]
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::scripted::{archive_page, archive_page_with_next, ScriptedFetcher};

    #[test]
    fn first_page_has_no_offset() {
        let p = Partition::Letter('A');
        assert_eq!(p.page_url(0), "https://www.hltv.org/players/A");
    }

    #[test]
    fn later_pages_carry_offset_multiples() {
        let p = Partition::Letter('B');
        assert_eq!(p.page_url(1), "https://www.hltv.org/players/B?offset=52");
        assert_eq!(p.page_url(3), "https://www.hltv.org/players/B?offset=156");
    }

    #[test]
    fn all_partition_is_bare_base() {
        assert_eq!(Partition::All.page_url(0), "https://www.hltv.org/players");
    }

    #[test]
    fn linked_pages_parsed_sorted_deduped() {
        let body = r#"<html><body>
            <a href="?offset=104">3</a>
            <a href="/players/A?offset=52">2</a>
            <a href="?offset=104">3 again</a>
            <a href="/players/A">1</a>
        </body></html>"#;
        assert_eq!(linked_pages(body), vec![1, 2]);
    }

    #[test]
    fn next_after_picks_smallest_higher() {
        let body = archive_page_with_next(&["a"], 104);
        let result = PageResult {
            status: PageStatus::Ok,
            names: Vec::new(),
            linked: linked_pages(&body),
        };
        assert_eq!(result.next_after(0), Some(2));
        assert_eq!(result.next_after(2), None);
    }

    #[tokio::test]
    async fn reader_fetches_each_url_once() {
        let url = Partition::Letter('A').page_url(0);
        let fetcher = ScriptedFetcher::new().page(&url, archive_page(&["s1mple"]));
        let mut reader = PageReader::new(fetcher, Pacing::none());

        let first = reader.load(&url, Duration::ZERO).await.clone();
        let second = reader.load(&url, Duration::ZERO).await.clone();

        assert_eq!(first.names.len(), second.names.len());
        assert_eq!(reader.fetches(), 1);
        assert_eq!(reader.fetcher().log, vec![url]);
    }

    #[tokio::test]
    async fn unknown_page_is_missing() {
        let fetcher = ScriptedFetcher::new();
        let mut reader = PageReader::new(fetcher, Pacing::none());
        let result = reader.load("https://www.hltv.org/players/Q", Duration::ZERO).await;
        assert_eq!(result.status, PageStatus::Missing);
        assert!(!result.has_listing());
    }
}
