use tracing::{debug, info};

use crate::fetch::Fetch;
use crate::pages::{PageReader, Partition};

/// Probe step sizes for the galloping phase, smallest first.
const INCREMENTS: &[u32] = &[1, 5, 10, 20, 50, 100];

/// Pages checked past the last confirmed one before the boundary is final.
const CONFIRM_WINDOW: u32 = 5;

/// Find the last non-empty page index of `partition` without walking every
/// page. Returns `None` when even page 0 is empty (or unfetchable) — a
/// terminal case, probed no further.
///
/// Galloping phase: for each step size, repeatedly probe `confirmed + step`;
/// a non-empty probe advances `confirmed` and keeps the step, an empty one
/// ends the step. A step that advanced at all has bracketed the boundary and
/// ends the phase; a step that never advanced escalates to the next size, so
/// a single-page hole cannot truncate the search. Pages between probes are
/// assumed present without verification — only the final boundary is
/// guaranteed, not interior completeness.
///
/// A short linear confirmation sweep then extends past stragglers. Probes
/// that fail transiently count as empty: the estimate may undercount, never
/// overcount.
pub async fn estimate<F: Fetch>(
    reader: &mut PageReader<F>,
    partition: Partition,
) -> Option<u32> {
    let delay = reader.pacing().probe;

    let first = reader.load(&partition.page_url(0), delay).await;
    if !first.has_listing() {
        debug!("partition {partition}: no listing on first page");
        return None;
    }

    let mut confirmed: u32 = 0;
    for &step in INCREMENTS {
        let start = confirmed;
        loop {
            let probe = confirmed + step;
            let page = reader.load(&partition.page_url(probe), delay).await;
            if page.has_listing() {
                debug!("partition {partition}: page {probe} non-empty");
                confirmed = probe;
            } else {
                debug!("partition {partition}: page {probe} empty, ending step {step}");
                break;
            }
        }
        if confirmed > start {
            break;
        }
    }

    for probe in confirmed + 1..=confirmed + CONFIRM_WINDOW {
        let page = reader.load(&partition.page_url(probe), delay).await;
        if page.has_listing() {
            debug!("partition {partition}: confirmation extended to page {probe}");
            confirmed = probe;
        } else {
            break;
        }
    }

    info!("partition {partition}: last non-empty page is {confirmed}");
    Some(confirmed)
}

// ── Tests ──
