//! Decides which fields of a matched pair changed.
//!
//! Heading and body are compared independently with exact string equality:
//! case and whitespace both count. A pair where both fields differ yields two
//! deltas, one per field.

use tracing::debug;

use crate::types::{ChangePair, ChangeType, FieldDelta};
use crate::{Error, Result};

/// Deltas for the fields that differ, plus the fields that could not be
/// compared because one side had no text.
#[derive(Debug, Default)]
pub struct Classification {
    pub deltas: Vec<FieldDelta>,
    pub skipped: Vec<Error>,
}

impl Classification {
    pub fn is_unchanged(&self) -> bool {
        self.deltas.is_empty()
    }
}

pub fn classify(pair: &ChangePair) -> Result<Classification> {
    let stored = pair.stored();
    let scraped = pair.scraped();

    if scraped.captured_at < stored.captured_at {
        return Err(Error::OutOfOrder {
            url: pair.url().to_string(),
            previous: stored.captured_at,
            current: scraped.captured_at,
        });
    }

    let mut classification = Classification::default();
    for field in ChangeType::ALL {
        let (Some(previous), Some(current)) = (stored.field(field), scraped.field(field)) else {
            classification.skipped.push(Error::MalformedText {
                url: pair.url().to_string(),
                field,
            });
            continue;
        };

        if previous == current {
            continue;
        }

        debug!("{} changed for {}", field, pair.url());
        classification.deltas.push(FieldDelta {
            field,
            previous_text: previous.to_string(),
            current_text: current.to_string(),
            previous_captured_at: stored.captured_at,
            current_captured_at: scraped.captured_at,
        });
    }

    Ok(classification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArticleId, ArticleVersion};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 20, hour, 0, 0).unwrap()
    }

    fn pair(old: (&str, &str), new: (&str, &str)) -> ChangePair {
        ChangePair::new(
            ArticleVersion::stored(ArticleId(1), "a.com", old.0, old.1, at(8)),
            ArticleVersion::scraped("a.com", new.0, new.1, at(9)),
        )
        .unwrap()
    }

    fn fields(classification: &Classification) -> Vec<ChangeType> {
        classification.deltas.iter().map(|d| d.field).collect()
    }

    #[test]
    fn test_decision_table() {
        let cases = [
            (("h", "b"), ("h", "b"), vec![]),
            (("h", "b"), ("H", "b"), vec![ChangeType::Heading]),
            (("h", "b"), ("h", "b2"), vec![ChangeType::Body]),
            (("h", "b"), ("h2", "b2"), vec![ChangeType::Heading, ChangeType::Body]),
        ];
        for (old, new, expected) in cases {
            let classification = classify(&pair(old, new)).unwrap();
            assert_eq!(fields(&classification), expected, "{:?} -> {:?}", old, new);
        }
    }

    #[test]
    fn test_whitespace_is_significant() {
        let classification = classify(&pair(("PM resigns", "b"), ("PM  resigns", "b"))).unwrap();
        assert_eq!(fields(&classification), vec![ChangeType::Heading]);
    }

    #[test]
    fn test_delta_carries_texts_and_timestamps() {
        let classification = classify(&pair(("h", "old body"), ("h", "new body"))).unwrap();
        let delta = &classification.deltas[0];
        assert_eq!(delta.previous_text, "old body");
        assert_eq!(delta.current_text, "new body");
        assert_eq!(delta.previous_captured_at, at(8));
        assert_eq!(delta.current_captured_at, at(9));
    }

    #[test]
    fn test_missing_text_skips_only_that_field() {
        let mut scraped = ArticleVersion::scraped("a.com", "new heading", "", at(9));
        scraped.body = None;
        let pair = ChangePair::new(
            ArticleVersion::stored(ArticleId(1), "a.com", "h", "b", at(8)),
            scraped,
        )
        .unwrap();

        let classification = classify(&pair).unwrap();
        assert_eq!(fields(&classification), vec![ChangeType::Heading]);
        assert_eq!(classification.skipped.len(), 1);
        assert!(matches!(
            classification.skipped[0],
            Error::MalformedText { field: ChangeType::Body, .. }
        ));
    }

    #[test]
    fn test_rejects_scrape_older_than_stored_version() {
        let pair = ChangePair::new(
            ArticleVersion::stored(ArticleId(1), "a.com", "h", "b", at(9)),
            ArticleVersion::scraped("a.com", "h", "b2", at(8)),
        )
        .unwrap();
        assert!(matches!(classify(&pair), Err(Error::OutOfOrder { .. })));
    }

    #[test]
    fn test_same_timestamp_is_allowed() {
        let pair = ChangePair::new(
            ArticleVersion::stored(ArticleId(1), "a.com", "h", "b", at(9)),
            ArticleVersion::scraped("a.com", "h", "b2", at(9)),
        )
        .unwrap();
        assert_eq!(fields(&classify(&pair).unwrap()), vec![ChangeType::Body]);
    }
}
