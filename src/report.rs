use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::pages::BASE_URL;

const JSON_FILE: &str = "hltv_player_nicknames.json";
const TXT_FILE: &str = "hltv_player_nicknames.txt";
const CSV_FILE: &str = "hltv_player_nicknames.csv";

const SAMPLE_SIZE: usize = 10;

/// Final run artifact: one structured record plus two flat rederivations of
/// the same sorted list. Written once, at end of run; never appended.
#[derive(Debug, Serialize)]
pub struct Report {
    title: String,
    source_url: String,
    total_count: usize,
    timestamp: String,
    scraping_method: String,
    sample_nicknames: Vec<String>,
    player_nicknames: Vec<String>,
}

impl Report {
    pub fn new(nicknames: Vec<String>, method: &str) -> Self {
        let sample = nicknames.iter().take(SAMPLE_SIZE).cloned().collect();
        Self {
            title: "HLTV Player Nicknames".to_string(),
            source_url: BASE_URL.to_string(),
            total_count: nicknames.len(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            scraping_method: method.to_string(),
            sample_nicknames: sample,
            player_nicknames: nicknames,
        }
    }

    pub fn write_all(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;

        let json_path = dir.join(JSON_FILE);
        fs::write(&json_path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", json_path.display()))?;

        let txt_path = dir.join(TXT_FILE);
        fs::write(&txt_path, self.to_text())
            .with_context(|| format!("writing {}", txt_path.display()))?;

        let csv_path = dir.join(CSV_FILE);
        fs::write(&csv_path, self.to_csv())
            .with_context(|| format!("writing {}", csv_path.display()))?;

        for path in [&json_path, &txt_path, &csv_path] {
            let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            info!("wrote {} ({} bytes)", path.display(), size);
        }
        Ok(())
    }

    fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("HLTV Player Nicknames List\n");
        out.push_str(&"=".repeat(50));
        out.push('\n');
        out.push_str(&format!("Source: {}\n", self.source_url));
        out.push_str(&format!("Total: {} players\n", self.total_count));
        out.push_str(&format!("Generated: {}\n", self.timestamp));
        if !self.sample_nicknames.is_empty() {
            out.push_str(&format!(
                "Nickname samples: {}\n",
                self.sample_nicknames
                    .iter()
                    .take(5)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        out.push_str(&"=".repeat(50));
        out.push_str("\n\n");
        for (i, nickname) in self.player_nicknames.iter().enumerate() {
            out.push_str(&format!("{:4}. {}\n", i + 1, nickname));
        }
        out
    }

    fn to_csv(&self) -> String {
        let mut out = String::from("Number,Player Nickname\n");
        for (i, nickname) in self.player_nicknames.iter().enumerate() {
            out.push_str(&format!("{},{}\n", i + 1, nickname));
        }
        out
    }
}

/// Count of nicknames per upper-cased first letter; anything that does not
/// start with a letter lands under '?'.
pub fn letter_distribution(nicknames: &[String]) -> BTreeMap<char, usize> {
    let mut dist = BTreeMap::new();
    for name in nicknames {
        let key = name
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| c.is_ascii_alphabetic())
            .unwrap_or('?');
        *dist.entry(key).or_insert(0) += 1;
    }
    dist
}

// ── Tests ──
