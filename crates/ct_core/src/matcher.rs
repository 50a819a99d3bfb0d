//! Aligns freshly scraped article versions with their stored counterparts.
//!
//! The join key is the article URL, compared byte for byte. Scraped rows
//! without a stored counterpart are first sightings and are handed back as
//! `new_articles` instead of being paired.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::types::{ArticleVersion, ChangePair};

/// A scraped URL that appeared more than once in one pass. The last row wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchAmbiguity {
    pub url: String,
    pub dropped: usize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MatchOutcome {
    pub pairs: Vec<ChangePair>,
    pub new_articles: Vec<ArticleVersion>,
    pub ambiguities: Vec<MatchAmbiguity>,
    /// Stored rows that could not take part in matching (empty URL, no id).
    pub rejected_stored: usize,
}

/// Pairs stored and scraped versions on URL.
///
/// Output order follows the stored table, so running this twice on the same
/// inputs gives the same pairs in the same order.
pub fn match_articles(stored: &[ArticleVersion], scraped: &[ArticleVersion]) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();

    let mut stored_order: Vec<&str> = Vec::new();
    let mut stored_by_url: HashMap<&str, &ArticleVersion> = HashMap::new();
    for row in stored {
        if row.url.is_empty() {
            warn!("Skipping stored row with empty URL");
            outcome.rejected_stored += 1;
            continue;
        }
        if row.article_id.is_none() {
            warn!("Skipping stored row for {} without article id", row.url);
            outcome.rejected_stored += 1;
            continue;
        }
        match stored_by_url.get(row.url.as_str()) {
            Some(existing) => {
                debug!("Stored table holds {} twice, keeping the latest", row.url);
                if row.captured_at >= existing.captured_at {
                    stored_by_url.insert(&row.url, row);
                }
            }
            None => {
                stored_order.push(&row.url);
                stored_by_url.insert(&row.url, row);
            }
        }
    }

    let mut scraped_order: Vec<&str> = Vec::new();
    let mut scraped_by_url: HashMap<&str, (&ArticleVersion, usize)> = HashMap::new();
    for row in scraped {
        if row.url.is_empty() {
            warn!("Skipping scraped row with empty URL");
            continue;
        }
        match scraped_by_url.get_mut(row.url.as_str()) {
            Some(entry) => {
                entry.0 = row;
                entry.1 += 1;
            }
            None => {
                scraped_order.push(&row.url);
                scraped_by_url.insert(&row.url, (row, 0));
            }
        }
    }

    for url in &scraped_order {
        let (_, dropped) = scraped_by_url[url];
        if dropped > 0 {
            warn!("⚠️ {} scraped {} times, keeping the last row", url, dropped + 1);
            outcome.ambiguities.push(MatchAmbiguity {
                url: url.to_string(),
                dropped,
            });
        }
    }

    for url in &stored_order {
        let Some((scraped_row, _)) = scraped_by_url.get(url) else {
            continue;
        };
        let stored_row = stored_by_url[url];
        match ChangePair::new(stored_row.clone(), (*scraped_row).clone()) {
            Ok(pair) => outcome.pairs.push(pair),
            Err(e) => warn!("Could not pair {}: {}", url, e),
        }
    }

    outcome.new_articles = scraped_order
        .iter()
        .filter(|url| !stored_by_url.contains_key(*url))
        .map(|url| scraped_by_url[url].0.clone())
        .collect();

    debug!(
        "Matched {} pairs, {} new articles",
        outcome.pairs.len(),
        outcome.new_articles.len()
    );

    outcome
}
