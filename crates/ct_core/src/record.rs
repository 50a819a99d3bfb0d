//! Flattens analysed field changes into the shapes the store persists.

use serde::{Deserialize, Serialize};

use crate::types::{ChangePair, ChangeRecord, FieldChange, VersionUpdate};

/// A persisted record together with the diff annotation it was scored from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub record: ChangeRecord,
    pub diff_annotation: String,
}

pub fn build_record(pair: &ChangePair, change: &FieldChange) -> ChangeRecord {
    ChangeRecord {
        article_id: pair.article_id(),
        article_url: pair.url().to_string(),
        change_type: change.field,
        previous: change.previous_text.clone(),
        current: change.current_text.clone(),
        previous_scraped_at: change.previous_captured_at,
        current_scraped_at: change.current_captured_at,
        similarity: change.similarity,
    }
}

pub fn build_entry(pair: &ChangePair, change: FieldChange) -> ChangeEntry {
    ChangeEntry {
        record: build_record(pair, &change),
        diff_annotation: change.diff_annotation,
    }
}

/// The article_version row to append once a pair is known to have changed.
///
/// A field the scrape could not provide falls back to the stored text. Returns
/// `None` when neither side has it.
pub fn build_version_update(pair: &ChangePair) -> Option<VersionUpdate> {
    let stored = pair.stored();
    let scraped = pair.scraped();
    let heading = scraped.heading.as_ref().or(stored.heading.as_ref())?;
    let body = scraped.body.as_ref().or(stored.body.as_ref())?;

    Some(VersionUpdate {
        article_id: pair.article_id(),
        heading: heading.clone(),
        body: body.clone(),
        scraped_at: scraped.captured_at,
    })
}
