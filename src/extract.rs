use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

/// Structural selectors, most specific first. The first one that matches
/// wins; matches from later selectors are never merged in, so the same cell
/// cannot be counted twice.
const NICKNAME_SELECTORS: &[&str] = &[
    ".players-archive-nickname.text-ellipsis",
    ".players-archive-nickname",
    r#"div[class*="nickname"]"#,
    ".player-nick",
    ".playernick",
];

static PLAYER_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/player/\d+/([^/?#]+)").unwrap());
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z][A-Za-z0-9_.-]{2,15}\b").unwrap());
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Free-text scanning drags in ordinary English; these never count as names.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "its", "may", "new", "now", "old",
    "see", "two", "who", "boy", "did", "man", "men", "run", "too", "any", "big", "end", "far",
    "got", "let", "own", "put", "say", "she", "try", "use", "way", "win", "yes", "yet",
];

/// Cap on strategy-3 output; the token scan is noisy by design and exists
/// only to surface some signal on badly drifted pages.
const MAX_GUESSED: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Pulled from the archive listing markup or a player-profile link.
    Listed,
    /// Token-shaped substring found by the free-text fallback.
    Guessed,
}

#[derive(Debug, Clone)]
pub struct Nickname {
    pub text: String,
    pub confidence: Confidence,
}

impl Nickname {
    fn listed(text: String) -> Self {
        Self {
            text,
            confidence: Confidence::Listed,
        }
    }
}

/// Pull candidate nicknames out of one archive page. Never fails: a page
/// that defeats every strategy yields an empty list.
pub fn extract(body: &str) -> Vec<Nickname> {
    let doc = Html::parse_document(body);

    let mut names = from_selectors(&doc);
    if names.is_empty() {
        names = from_player_links(&doc);
    }
    if names.is_empty() {
        names = from_free_text(&doc);
    }
    dedup_in_order(names)
}

fn from_selectors(doc: &Html) -> Vec<Nickname> {
    for raw in NICKNAME_SELECTORS {
        let selector = Selector::parse(raw).unwrap();
        let found: Vec<Nickname> = doc
            .select(&selector)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .map(Nickname::listed)
            .collect();
        if !found.is_empty() {
            debug!("{} nicknames via selector {raw}", found.len());
            return found;
        }
    }
    Vec::new()
}

/// Strategy 2: the per-player URL shape `/player/<id>/<name>` survives most
/// markup drift; decode the name segment.
fn from_player_links(doc: &Html) -> Vec<Nickname> {
    let mut names = Vec::new();
    for anchor in doc.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(caps) = PLAYER_HREF_RE.captures(href) else {
            continue;
        };
        let cleaned = caps[1].replace("%20", " ").replace('-', " ");
        if cleaned.len() > 1 {
            names.push(Nickname::listed(cleaned));
        }
    }
    if !names.is_empty() {
        debug!("{} nicknames via player links", names.len());
    }
    names
}

/// Strategy 3: lossy token scan over the page text, length-capped.
fn from_free_text(doc: &Html) -> Vec<Nickname> {
    let text: String = doc.root_element().text().collect::<Vec<_>>().join(" ");
    let names: Vec<Nickname> = TOKEN_RE
        .find_iter(&text)
        .map(|m| m.as_str())
        .filter(|t| !STOPWORDS.contains(&t.to_ascii_lowercase().as_str()))
        .take(MAX_GUESSED)
        .map(|t| Nickname {
            text: t.to_string(),
            confidence: Confidence::Guessed,
        })
        .collect();
    if !names.is_empty() {
        debug!("{} low-confidence tokens via free-text scan", names.len());
    }
    names
}

fn dedup_in_order(names: Vec<Nickname>) -> Vec<Nickname> {
    let mut seen: HashSet<String> = HashSet::new();
    names
        .into_iter()
        .filter(|n| seen.insert(n.text.clone()))
        .collect()
}

// ── Tests ──
