use std::collections::{HashSet, VecDeque};

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::bounds;
use crate::extract::{Confidence, Nickname};
use crate::fetch::{Fetch, Pacing};
use crate::pages::{PageReader, PageRef, PageStatus, Partition};

/// Traversal policy. The estimator-driven walk and the link-following walk
/// were near-duplicate drivers in spirit; everything but the per-partition
/// loop is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Estimate the last page up front, then walk 0..=last.
    Bounded,
    /// Follow discovered pagination links until the trail goes cold.
    Adaptive,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Bounded => write!(f, "bounded"),
            Mode::Adaptive => write!(f, "adaptive"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CrawlConfig {
    pub mode: Mode,
    /// Safety cap on pages walked within one partition (adaptive mode).
    pub max_pages_per_partition: u32,
    /// Consecutive pages contributing zero new names before a partition is
    /// declared exhausted, regardless of further next links.
    pub stale_page_limit: u32,
    /// Keep low-confidence free-text matches in the result set.
    pub keep_guessed: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Bounded,
            max_pages_per_partition: 50,
            stale_page_limit: 3,
            keep_guessed: true,
        }
    }
}

/// Deduplicated nickname accumulator shared by every partition walk. Grows
/// monotonically; ordering exists only at the final read.
#[derive(Debug, Default)]
pub struct NicknameSet {
    names: HashSet<String>,
}

impl NicknameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert trimmed names, returning how many were genuinely new. The
    /// return value is the crawler's organic stopping signal.
    pub fn add<'a, I>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = &'a Nickname>,
    {
        let mut added = 0;
        for name in names {
            let trimmed = name.text.trim();
            if trimmed.is_empty() {
                continue;
            }
            if self.names.insert(trimmed.to_string()) {
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn into_sorted(self) -> Vec<String> {
        let mut sorted: Vec<String> = self.names.into_iter().collect();
        sorted.sort();
        sorted
    }
}

/// FIFO of pending fetch targets; a target is accepted at most once for the
/// lifetime of the frontier, even after it has been popped.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<PageRef>,
    enqueued: HashSet<PageRef>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the target was new and is now queued.
    pub fn push(&mut self, target: PageRef) -> bool {
        if self.enqueued.insert(target) {
            self.queue.push_back(target);
            true
        } else {
            false
        }
    }

    pub fn pop(&mut self) -> Option<PageRef> {
        self.queue.pop_front()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Pending,
    InProgress,
    /// Terminal: boundary reached, trail went cold, or safety cap hit.
    Exhausted,
    /// Terminal: the partition's first page was unfetchable. Skipped, not
    /// retried.
    Failed,
}

/// Outcome of one partition walk.
#[derive(Debug, Clone, Copy)]
pub struct PartitionRun {
    pub partition: Partition,
    pub state: PartitionState,
    pub pages: u32,
    pub added: usize,
}

impl PartitionRun {
    fn started(partition: Partition) -> Self {
        Self {
            partition,
            state: PartitionState::InProgress,
            pages: 0,
            added: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CrawlStats {
    pub partitions: usize,
    pub failed: usize,
    pub fetches: usize,
    pub names: usize,
}

/// Drives the whole crawl: seeds partitions breadth-first, walks each one
/// depth-first under the configured policy, and feeds every page into the
/// shared nickname set. Per-page failures never propagate; they degrade to
/// "contributed nothing" so the run keeps moving.
pub struct Crawler<F: Fetch> {
    reader: PageReader<F>,
    names: NicknameSet,
    config: CrawlConfig,
    runs: Vec<PartitionRun>,
}

impl<F: Fetch> Crawler<F> {
    pub fn new(fetcher: F, pacing: Pacing, config: CrawlConfig) -> Self {
        Self {
            reader: PageReader::new(fetcher, pacing),
            names: NicknameSet::new(),
            config,
            runs: Vec::new(),
        }
    }

    pub fn into_names(self) -> NicknameSet {
        self.names
    }

    pub fn runs(&self) -> &[PartitionRun] {
        &self.runs
    }

    #[cfg(test)]
    pub fn reader(&self) -> &PageReader<F> {
        &self.reader
    }

    pub async fn run(&mut self) -> CrawlStats {
        let seeds: Vec<Partition> = match self.config.mode {
            Mode::Bounded => Partition::letters().collect(),
            Mode::Adaptive => std::iter::once(Partition::All)
                .chain(Partition::letters())
                .collect(),
        };

        info!("starting {} crawl over {} partitions", self.config.mode, seeds.len());

        let base = self.runs.len();
        self.runs.extend(seeds.iter().map(|&p| PartitionRun {
            partition: p,
            state: PartitionState::Pending,
            pages: 0,
            added: 0,
        }));

        let bar = ProgressBar::new(seeds.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=> "),
        );

        for (i, &partition) in seeds.iter().enumerate() {
            bar.set_message(format!("{partition}"));

            let run = match self.config.mode {
                Mode::Bounded => self.walk_bounded(partition).await,
                Mode::Adaptive => self.walk_adaptive(partition).await,
            };

            match run.state {
                PartitionState::Failed => {
                    warn!("partition {partition}: first page unfetchable, skipping")
                }
                _ => info!(
                    "partition {partition}: {} pages, {} new names, {} total",
                    run.pages,
                    run.added,
                    self.names.len()
                ),
            }
            self.runs[base + i] = run;
            bar.inc(1);

            let pause = self.reader.pacing().partition;
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
        bar.finish_and_clear();

        let failed = self
            .runs
            .iter()
            .filter(|r| r.state == PartitionState::Failed)
            .count();
        CrawlStats {
            partitions: self.runs.len(),
            failed,
            fetches: self.reader.fetches(),
            names: self.names.len(),
        }
    }

    /// Bounded policy: boundary estimation, then a sequential sweep over
    /// every page up to the boundary. Probed pages are served from cache.
    async fn walk_bounded(&mut self, partition: Partition) -> PartitionRun {
        let mut run = PartitionRun::started(partition);

        match bounds::estimate(&mut self.reader, partition).await {
            Some(last) => {
                let delay = self.reader.pacing().page;
                for page in 0..=last {
                    let result = self.reader.load(&partition.page_url(page), delay).await;
                    run.pages += 1;
                    run.added += add_names(&mut self.names, result, self.config.keep_guessed);
                }
                run.state = PartitionState::Exhausted;
            }
            None => {
                // Zero-page partition unless the very first fetch died.
                let first = self.reader.get(&partition.page_url(0));
                run.state = match first.map(|r| r.status) {
                    Some(PageStatus::Failed) => PartitionState::Failed,
                    _ => PartitionState::Exhausted,
                };
            }
        }
        run
    }

    /// Adaptive policy: walk next-page links from page 0 until no link is
    /// found, the safety cap trips, or a run of pages stops producing new
    /// names. The staleness signal wins over link availability, since the
    /// site keeps emitting benign next links past the real end.
    async fn walk_adaptive(&mut self, partition: Partition) -> PartitionRun {
        let mut run = PartitionRun::started(partition);
        let mut frontier = Frontier::new();
        frontier.push(PageRef { partition, page: 0 });
        let mut stale = 0u32;
        let delay = self.reader.pacing().page;

        while let Some(target) = frontier.pop() {
            if run.pages >= self.config.max_pages_per_partition {
                warn!(
                    "partition {partition}: safety cap of {} pages reached",
                    self.config.max_pages_per_partition
                );
                break;
            }

            let result = self.reader.load(&target.url(), delay).await;
            run.pages += 1;

            match result.status {
                PageStatus::Failed if target.page == 0 => {
                    run.state = PartitionState::Failed;
                    return run;
                }
                PageStatus::Missing | PageStatus::Failed => {
                    debug!("partition {partition}: page {} absent, stopping", target.page);
                    break;
                }
                PageStatus::Ok => {}
            }

            let added = add_names(&mut self.names, result, self.config.keep_guessed);
            run.added += added;

            let keep_walking = if !result.has_listing() {
                // Extraction miss on a structurally present page; only worth
                // pressing on right at the start of a partition.
                warn!(
                    "partition {partition}: nothing extracted from page {}",
                    target.page
                );
                target.page < 2
            } else if added == 0 {
                stale += 1;
                stale < self.config.stale_page_limit
            } else {
                stale = 0;
                true
            };

            if !keep_walking {
                if stale >= self.config.stale_page_limit {
                    info!(
                        "partition {partition}: {stale} consecutive pages with no new names"
                    );
                }
                break;
            }

            match result.next_after(target.page) {
                Some(next) => {
                    frontier.push(PageRef { partition, page: next });
                }
                None => debug!("partition {partition}: no next link on page {}", target.page),
            }
        }

        if run.state == PartitionState::InProgress {
            run.state = PartitionState::Exhausted;
        }
        run
    }
}

fn add_names(
    set: &mut NicknameSet,
    page: &crate::pages::PageResult,
    keep_guessed: bool,
) -> usize {
    if keep_guessed {
        set.add(&page.names)
    } else {
        set.add(
            page.names
                .iter()
                .filter(|n| n.confidence == Confidence::Listed),
        )
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Nickname;
    use crate::fetch::scripted::{archive_page, archive_page_with_next, ScriptedFetcher};
    use crate::fetch::FetchOutcome;
    use crate::pages::PAGE_SIZE;

    fn listed(text: &str) -> Nickname {
        Nickname {
            text: text.to_string(),
            confidence: Confidence::Listed,
        }
    }

    fn crawler(fetcher: ScriptedFetcher, mode: Mode) -> Crawler<ScriptedFetcher> {
        let config = CrawlConfig {
            mode,
            ..CrawlConfig::default()
        };
        Crawler::new(fetcher, Pacing::none(), config)
    }

    #[test]
    fn aggregator_add_is_idempotent() {
        let mut set = NicknameSet::new();
        let batch = [listed("s1mple"), listed("ZywOo"), listed(" s1mple ")];
        assert_eq!(set.add(&batch), 2);
        assert_eq!(set.add(&batch), 0);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn aggregator_skips_blank_names() {
        let mut set = NicknameSet::new();
        assert_eq!(set.add(&[listed("  "), listed("device")]), 1);
    }

    #[test]
    fn frontier_rejects_duplicates_forever() {
        let mut frontier = Frontier::new();
        let target = PageRef {
            partition: Partition::Letter('A'),
            page: 1,
        };
        assert!(frontier.push(target));
        assert!(!frontier.push(target));
        assert_eq!(frontier.pop(), Some(target));
        // Popped targets may not be re-enqueued either.
        assert!(!frontier.push(target));
        assert_eq!(frontier.pop(), None);
    }

    #[tokio::test]
    async fn bounded_walk_end_to_end() {
        let p = Partition::Letter('A');
        let fetcher = ScriptedFetcher::new()
            .page(p.page_url(0), archive_page(&["foo", "bar"]))
            .page(p.page_url(1), archive_page(&["baz"]))
            .page(p.page_url(2), archive_page(&["foo"]));

        let mut c = crawler(fetcher, Mode::Bounded);
        let run = c.walk_bounded(p).await;

        assert_eq!(run.state, PartitionState::Exhausted);
        assert_eq!(run.pages, 3);
        // Probes and the sweep overlap entirely: pages 0-3, nothing twice.
        assert_eq!(c.reader().fetches(), 4);
        let log = &c.reader().fetcher().log;
        let unique: std::collections::HashSet<_> = log.iter().collect();
        assert_eq!(unique.len(), log.len());
        assert_eq!(c.into_names().into_sorted(), vec!["bar", "baz", "foo"]);
    }

    #[tokio::test]
    async fn bounded_walk_empty_partition_exhausts() {
        let p = Partition::Letter('Z');
        let mut c = crawler(ScriptedFetcher::new(), Mode::Bounded);
        let run = c.walk_bounded(p).await;
        assert_eq!(run.state, PartitionState::Exhausted);
        assert_eq!(run.added, 0);
    }

    #[tokio::test]
    async fn bounded_walk_unfetchable_first_page_fails_partition() {
        let p = Partition::Letter('C');
        let fetcher =
            ScriptedFetcher::new().outcome(p.page_url(0), FetchOutcome::Failed);
        let mut c = crawler(fetcher, Mode::Bounded);
        let run = c.walk_bounded(p).await;
        assert_eq!(run.state, PartitionState::Failed);
    }

    #[tokio::test]
    async fn adaptive_walk_stops_after_stale_streak() {
        let p = Partition::Letter('D');
        // Pages 0-2 each contribute a new name; 3-5 only repeats. Every page
        // advertises a next link, including the stale ones.
        let mut fetcher = ScriptedFetcher::new();
        for (page, name) in [(0u32, "alpha"), (1, "bravo"), (2, "charlie")] {
            fetcher = fetcher.page(
                p.page_url(page),
                archive_page_with_next(&[name], (page + 1) * PAGE_SIZE),
            );
        }
        for page in [3u32, 4, 5, 6] {
            fetcher = fetcher.page(
                p.page_url(page),
                archive_page_with_next(&["alpha"], (page + 1) * PAGE_SIZE),
            );
        }

        let mut c = crawler(fetcher, Mode::Adaptive);
        let run = c.walk_adaptive(p).await;

        assert_eq!(run.state, PartitionState::Exhausted);
        assert_eq!(run.pages, 6);
        assert!(!c.reader().fetcher().log.contains(&p.page_url(6)));
    }

    #[tokio::test]
    async fn adaptive_walk_stops_without_next_link() {
        let p = Partition::Letter('E');
        let fetcher = ScriptedFetcher::new()
            .page(p.page_url(0), archive_page_with_next(&["one"], PAGE_SIZE))
            .page(p.page_url(1), archive_page(&["two"]));
        let mut c = crawler(fetcher, Mode::Adaptive);
        let run = c.walk_adaptive(p).await;
        assert_eq!(run.state, PartitionState::Exhausted);
        assert_eq!(run.pages, 2);
        assert_eq!(c.into_names().into_sorted(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn adaptive_walk_respects_page_cap() {
        let p = Partition::Letter('F');
        // Endless chain of pages, each with a fresh name and a next link.
        let mut fetcher = ScriptedFetcher::new();
        for page in 0u32..60 {
            fetcher = fetcher.page(
                p.page_url(page),
                archive_page_with_next(
                    &[format!("n{page}").as_str()],
                    (page + 1) * PAGE_SIZE,
                ),
            );
        }
        let mut c = crawler(fetcher, Mode::Adaptive);
        let run = c.walk_adaptive(p).await;
        assert_eq!(run.pages, 50);
        assert_eq!(run.state, PartitionState::Exhausted);
    }

    #[tokio::test]
    async fn adaptive_walk_failed_first_page() {
        let p = Partition::Letter('G');
        let fetcher =
            ScriptedFetcher::new().outcome(p.page_url(0), FetchOutcome::Failed);
        let mut c = crawler(fetcher, Mode::Adaptive);
        let run = c.walk_adaptive(p).await;
        assert_eq!(run.state, PartitionState::Failed);
        assert_eq!(run.added, 0);
    }

    #[tokio::test]
    async fn full_run_covers_all_letters() {
        let p = Partition::Letter('A');
        let fetcher = ScriptedFetcher::new().page(p.page_url(0), archive_page(&["s1mple"]));
        let mut c = crawler(fetcher, Mode::Bounded);
        let stats = c.run().await;
        assert_eq!(stats.partitions, 26);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.names, 1);
    }
}
