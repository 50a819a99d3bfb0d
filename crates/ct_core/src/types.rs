use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Opaque key the external store assigns to an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(pub i64);

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One captured version of an article, either read back from the store or
/// freshly scraped. Scraped rows carry no `article_id`.
///
/// `heading` and `body` are optional because scrape output can have holes;
/// a missing field is reported as malformed text rather than compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleVersion {
    #[serde(default)]
    pub article_id: Option<ArticleId>,
    #[serde(rename = "article_url")]
    pub url: String,
    pub heading: Option<String>,
    pub body: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl ArticleVersion {
    pub fn stored(
        article_id: ArticleId,
        url: impl Into<String>,
        heading: impl Into<String>,
        body: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            article_id: Some(article_id),
            url: url.into(),
            heading: Some(heading.into()),
            body: Some(body.into()),
            captured_at,
        }
    }

    pub fn scraped(
        url: impl Into<String>,
        heading: impl Into<String>,
        body: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            article_id: None,
            url: url.into(),
            heading: Some(heading.into()),
            body: Some(body.into()),
            captured_at,
        }
    }

    pub fn field(&self, field: ChangeType) -> Option<&str> {
        match field {
            ChangeType::Heading => self.heading.as_deref(),
            ChangeType::Body => self.body.as_deref(),
        }
    }
}

/// The field a change was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Heading,
    Body,
}

impl ChangeType {
    pub const ALL: [ChangeType; 2] = [ChangeType::Heading, ChangeType::Body];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Heading => "heading",
            ChangeType::Body => "body",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "heading" => Ok(ChangeType::Heading),
            "body" => Ok(ChangeType::Body),
            other => Err(Error::Input(format!("Unknown change type: {}", other))),
        }
    }
}

/// A stored version and a scraped version of the same article, joined on URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangePair {
    article_id: ArticleId,
    stored: ArticleVersion,
    scraped: ArticleVersion,
}

impl ChangePair {
    pub fn new(stored: ArticleVersion, scraped: ArticleVersion) -> Result<Self> {
        if stored.url.is_empty() {
            return Err(Error::EmptyUrl);
        }
        if stored.url != scraped.url {
            return Err(Error::Input(format!(
                "Cannot pair {} with {}",
                stored.url, scraped.url
            )));
        }
        let article_id = stored
            .article_id
            .ok_or_else(|| Error::MissingArticleId(stored.url.clone()))?;

        Ok(Self {
            article_id,
            stored,
            scraped,
        })
    }

    pub fn article_id(&self) -> ArticleId {
        self.article_id
    }

    pub fn url(&self) -> &str {
        &self.stored.url
    }

    pub fn stored(&self) -> &ArticleVersion {
        &self.stored
    }

    pub fn scraped(&self) -> &ArticleVersion {
        &self.scraped
    }
}

/// A differing field as found by the classifier, before diffing and scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDelta {
    pub field: ChangeType,
    pub previous_text: String,
    pub current_text: String,
    pub previous_captured_at: DateTime<Utc>,
    pub current_captured_at: DateTime<Utc>,
}

/// A fully analysed field change. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: ChangeType,
    pub previous_text: String,
    pub current_text: String,
    pub previous_captured_at: DateTime<Utc>,
    pub current_captured_at: DateTime<Utc>,
    pub similarity: f64,
    pub diff_annotation: String,
}

impl FieldChange {
    pub fn new(delta: FieldDelta, similarity: f64, diff_annotation: String) -> Self {
        Self {
            field: delta.field,
            previous_text: delta.previous_text,
            current_text: delta.current_text,
            previous_captured_at: delta.previous_captured_at,
            current_captured_at: delta.current_captured_at,
            similarity,
            diff_annotation,
        }
    }
}

/// The persisted unit. Field order is the column order of the change table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub article_id: ArticleId,
    pub article_url: String,
    pub change_type: ChangeType,
    pub previous: String,
    pub current: String,
    pub previous_scraped_at: DateTime<Utc>,
    pub current_scraped_at: DateTime<Utc>,
    pub similarity: f64,
}

impl ChangeRecord {
    pub const COLUMNS: [&'static str; 8] = [
        "article_id",
        "article_url",
        "change_type",
        "previous",
        "current",
        "previous_scraped_at",
        "current_scraped_at",
        "similarity",
    ];
}

/// New article_version row appended for every article that changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionUpdate {
    pub article_id: ArticleId,
    pub heading: String,
    pub body: String,
    pub scraped_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 20, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_change_pair_requires_matching_urls() {
        let stored = ArticleVersion::stored(ArticleId(1), "a.com", "h", "b", at(9));
        let scraped = ArticleVersion::scraped("b.com", "h", "b", at(10));
        assert!(ChangePair::new(stored, scraped).is_err());
    }

    #[test]
    fn test_change_pair_requires_article_id() {
        let mut stored = ArticleVersion::stored(ArticleId(1), "a.com", "h", "b", at(9));
        stored.article_id = None;
        let scraped = ArticleVersion::scraped("a.com", "h", "b", at(10));
        let err = ChangePair::new(stored, scraped).unwrap_err();
        assert!(matches!(err, Error::MissingArticleId(url) if url == "a.com"));
    }

    #[test]
    fn test_change_type_round_trips_through_str() {
        for field in ChangeType::ALL {
            assert_eq!(field.as_str().parse::<ChangeType>().unwrap(), field);
        }
        assert!("title".parse::<ChangeType>().is_err());
    }

    #[test]
    fn test_change_record_serializes_in_column_order() {
        let record = ChangeRecord {
            article_id: ArticleId(7),
            article_url: "a.com".to_string(),
            change_type: ChangeType::Body,
            previous: "old".to_string(),
            current: "new".to_string(),
            previous_scraped_at: at(9),
            current_scraped_at: at(10),
            similarity: 50.0,
        };
        let value = serde_json::to_value(&record).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        let mut expected: Vec<_> = ChangeRecord::COLUMNS.iter().map(|c| c.to_string()).collect();
        expected.sort();
        // serde_json maps are sorted without preserve_order; check the set instead.
        assert_eq!(keys, expected);
        assert_eq!(value["change_type"], "body");
    }
}
