//! One batch run: match, classify, diff, score, build.
//!
//! Pairs are independent of each other. A failure inside one pair is logged,
//! recorded in the report and skipped; only problems with the input as a
//! whole are returned as errors.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::classify;
use crate::diff::annotate;
use crate::matcher::{match_articles, MatchAmbiguity};
use crate::record::{build_entry, build_version_update, ChangeEntry};
use crate::similarity::similarity_with_precision;
use crate::types::{ArticleVersion, ChangePair, ChangeRecord, ChangeType, FieldChange, VersionUpdate};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Decimal places kept on similarity scores.
    pub similarity_decimals: u32,
    /// Hand unmatched scraped rows back as new articles.
    pub report_new_articles: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_decimals: 2,
            report_new_articles: true,
        }
    }
}

/// A change that could not be produced, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedChange {
    pub url: String,
    /// `None` when the whole pair was skipped.
    pub field: Option<ChangeType>,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub pairs_compared: usize,
    pub changes: Vec<ChangeEntry>,
    pub version_updates: Vec<VersionUpdate>,
    pub new_articles: Vec<ArticleVersion>,
    pub ambiguities: Vec<MatchAmbiguity>,
    pub skipped: Vec<SkippedChange>,
}

impl BatchReport {
    pub fn records(&self) -> Vec<ChangeRecord> {
        self.changes.iter().map(|c| c.record.clone()).collect()
    }

    pub fn count(&self, change_type: ChangeType) -> usize {
        self.changes
            .iter()
            .filter(|c| c.record.change_type == change_type)
            .count()
    }
}

/// What one pair contributed to the batch.
#[derive(Debug, Default)]
struct PairOutcome {
    changes: Vec<ChangeEntry>,
    version_update: Option<VersionUpdate>,
    skipped: Vec<SkippedChange>,
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonPipeline {
    config: PipelineConfig,
}

impl ComparisonPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Compares every scraped version against the stored version with the
    /// same URL.
    pub fn run(&self, stored: &[ArticleVersion], scraped: &[ArticleVersion]) -> Result<BatchReport> {
        if stored.is_empty() || scraped.is_empty() {
            info!(
                "Nothing to compare ({} stored, {} scraped)",
                stored.len(),
                scraped.len()
            );
        } else {
            info!(
                "🔍 Comparing {} scraped articles against {} stored versions",
                scraped.len(),
                stored.len()
            );
        }
        let outcome = match_articles(stored, scraped);
        if !stored.is_empty() && outcome.rejected_stored == stored.len() {
            return Err(Error::Input(format!(
                "none of the {} stored rows is usable",
                stored.len()
            )));
        }

        let mut report = BatchReport {
            pairs_compared: outcome.pairs.len(),
            ambiguities: outcome.ambiguities,
            ..Default::default()
        };
        if self.config.report_new_articles {
            report.new_articles = outcome.new_articles;
        }

        for pair in &outcome.pairs {
            match self.process_pair(pair) {
                Ok(pair_outcome) => {
                    report.changes.extend(pair_outcome.changes);
                    report.version_updates.extend(pair_outcome.version_update);
                    report.skipped.extend(pair_outcome.skipped);
                }
                Err(e) if e.is_per_pair() => {
                    warn!("⚠️ Skipping {}: {}", pair.url(), e);
                    report.skipped.push(skipped(pair, None, &e));
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "✨ {} changes detected ({} heading, {} body), {} new articles, {} skipped",
            report.changes.len(),
            report.count(ChangeType::Heading),
            report.count(ChangeType::Body),
            report.new_articles.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn process_pair(&self, pair: &ChangePair) -> Result<PairOutcome> {
        let mut outcome = PairOutcome::default();
        let classification = classify(pair)?;

        for e in &classification.skipped {
            warn!("⚠️ Skipping field of {}: {}", pair.url(), e);
            let field = match e {
                Error::MalformedText { field, .. } => Some(*field),
                _ => None,
            };
            outcome.skipped.push(skipped(pair, field, e));
        }

        if classification.is_unchanged() {
            debug!("No change for {}", pair.url());
            return Ok(outcome);
        }

        for delta in classification.deltas {
            let score = similarity_with_precision(
                &delta.previous_text,
                &delta.current_text,
                self.config.similarity_decimals,
            );
            let annotation = annotate(&delta.previous_text, &delta.current_text);
            debug!("📝 {} {} changed, similarity {:.2}", pair.url(), delta.field, score);
            outcome
                .changes
                .push(build_entry(pair, FieldChange::new(delta, score, annotation)));
        }
        outcome.version_update = build_version_update(pair);
        Ok(outcome)
    }
}

fn skipped(pair: &ChangePair, field: Option<ChangeType>, error: &Error) -> SkippedChange {
    SkippedChange {
        url: pair.url().to_string(),
        field,
        reason: error.to_string(),
    }
}
