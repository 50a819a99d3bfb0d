use async_trait::async_trait;
use ct_core::{
    ArticleId, ArticleVersion, BatchReport, ChangeRecord, ChangeStore, Error, Result, VersionUpdate,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::StorageBackend;

struct MemoryStore {
    latest: Vec<ArticleVersion>,
    changes: Vec<ChangeRecord>,
    next_id: i64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    fn new() -> Self {
        Self {
            latest: Vec::new(),
            changes: Vec::new(),
            next_id: 1,
        }
    }

    fn knows(&self, article_id: ArticleId) -> bool {
        self.latest.iter().any(|a| a.article_id == Some(article_id))
    }

    fn find_mut(&mut self, article_id: ArticleId) -> Option<&mut ArticleVersion> {
        self.latest
            .iter_mut()
            .find(|a| a.article_id == Some(article_id))
    }

    /// Checks every version update against what is stored before anything
    /// is written, so a rejected report leaves the store untouched.
    fn check_report(&self, records: &[ChangeRecord], updates: &[VersionUpdate]) -> Result<()> {
        for update in updates {
            if self.knows(update.article_id) {
                continue;
            }
            let Some(record) = records.iter().find(|r| r.article_id == update.article_id) else {
                return Err(Error::Storage(format!(
                    "No article {} to version",
                    update.article_id
                )));
            };
            if self.latest.iter().any(|a| a.url == record.article_url) {
                return Err(Error::Storage(format!(
                    "{} is already tracked under another id than {}",
                    record.article_url, update.article_id
                )));
            }
        }
        Ok(())
    }

    fn persist_report(&mut self, report: &BatchReport) -> Result<()> {
        let records = report.records();
        self.check_report(&records, &report.version_updates)?;

        for update in &report.version_updates {
            match self.find_mut(update.article_id) {
                Some(latest) => {
                    if latest.captured_at <= update.scraped_at {
                        latest.heading = Some(update.heading.clone());
                        latest.body = Some(update.body.clone());
                        latest.captured_at = update.scraped_at;
                    }
                }
                None => {
                    let url = records
                        .iter()
                        .find(|r| r.article_id == update.article_id)
                        .map(|r| r.article_url.clone())
                        .unwrap_or_default();
                    self.latest.push(ArticleVersion::stored(
                        update.article_id,
                        url,
                        update.heading.clone(),
                        update.body.clone(),
                        update.scraped_at,
                    ));
                    self.next_id = self.next_id.max(update.article_id.0 + 1);
                }
            }
        }
        self.changes.extend(records);

        for article in &report.new_articles {
            if self.latest.iter().any(|a| a.url == article.url) {
                continue;
            }
            let mut stored = article.clone();
            stored.article_id = Some(ArticleId(self.next_id));
            self.next_id += 1;
            self.latest.push(stored);
        }
        debug!(
            "Stored {} changes, {} versions, {} new articles",
            report.changes.len(),
            report.version_updates.len(),
            report.new_articles.len()
        );
        Ok(())
    }

    fn changes_for_url(&self, url: &str) -> Vec<ChangeRecord> {
        let mut changes: Vec<_> = self
            .changes
            .iter()
            .filter(|c| c.article_url == url)
            .cloned()
            .collect();
        changes.sort_by(|a, b| a.current_scraped_at.cmp(&b.current_scraped_at));
        changes
    }
}

pub struct MemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(MemoryStore::new())),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn connect(_url: Option<&str>) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ChangeStore for MemoryStorage {
    async fn latest_versions(&self) -> Result<Vec<ArticleVersion>> {
        Ok(self.store.read().await.latest.clone())
    }

    async fn persist_report(&self, report: &BatchReport) -> Result<()> {
        self.store.write().await.persist_report(report)
    }

    async fn changes_for_url(&self, url: &str) -> Result<Vec<ChangeRecord>> {
        Ok(self.store.read().await.changes_for_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use ct_core::{ChangeType, ComparisonPipeline};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 20, hour, 0, 0).unwrap()
    }

    fn first_sightings(articles: Vec<ArticleVersion>) -> BatchReport {
        BatchReport {
            new_articles: articles,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_store_starts_ids_at_one() {
        let mut store = MemoryStore::default();
        store
            .persist_report(&first_sightings(vec![ArticleVersion::scraped("a.com", "h", "b", at(8))]))
            .unwrap();
        assert_eq!(store.latest[0].article_id, Some(ArticleId(1)));
    }

    #[tokio::test]
    async fn test_new_articles_get_ids() {
        let storage = MemoryStorage::new();
        storage
            .persist_report(&first_sightings(vec![
                ArticleVersion::scraped("a.com", "h", "b", at(8)),
                ArticleVersion::scraped("b.com", "h", "b", at(8)),
                ArticleVersion::scraped("a.com", "dup", "dup", at(8)),
            ]))
            .await
            .unwrap();

        let latest = storage.latest_versions().await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].article_id, Some(ArticleId(1)));
        assert_eq!(latest[1].article_id, Some(ArticleId(2)));
        assert_eq!(latest[0].heading.as_deref(), Some("h"));
    }

    #[tokio::test]
    async fn test_round_trip_through_pipeline() {
        let storage = MemoryStorage::new();
        storage
            .persist_report(&first_sightings(vec![ArticleVersion::scraped(
                "a.com",
                "PM resigns",
                "The PM resigned today.",
                at(8),
            )]))
            .await
            .unwrap();

        let stored = storage.latest_versions().await.unwrap();
        let scraped = vec![ArticleVersion::scraped(
            "a.com",
            "PM resigns",
            "The PM resigned today after scandal.",
            at(9),
        )];
        let report = ComparisonPipeline::default().run(&stored, &scraped).unwrap();
        storage.persist_report(&report).await.unwrap();

        let history = storage.changes_for_url("a.com").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].change_type, ChangeType::Body);

        let latest = storage.latest_versions().await.unwrap();
        assert_eq!(latest[0].body.as_deref(), Some("The PM resigned today after scandal."));
        assert_eq!(latest[0].captured_at, at(9));

        // A second pass over the same scrape finds nothing new.
        let report = ComparisonPipeline::default().run(&latest, &scraped).unwrap();
        assert!(report.changes.is_empty());
    }

    #[tokio::test]
    async fn test_articles_from_outside_the_store_are_registered() {
        let storage = MemoryStorage::new();
        let stored = vec![ArticleVersion::stored(ArticleId(7), "a.com", "h", "old body", at(8))];
        let scraped = vec![
            ArticleVersion::scraped("a.com", "h", "new body", at(9)),
            ArticleVersion::scraped("c.com", "h", "b", at(9)),
        ];
        let report = ComparisonPipeline::default().run(&stored, &scraped).unwrap();
        storage.persist_report(&report).await.unwrap();

        let latest = storage.latest_versions().await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].article_id, Some(ArticleId(7)));
        assert_eq!(latest[0].body.as_deref(), Some("new body"));
        assert_eq!(latest[1].article_id, Some(ArticleId(8)));
        assert_eq!(storage.changes_for_url("a.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_report_stores_nothing() {
        let storage = MemoryStorage::new();
        let stored = vec![ArticleVersion::stored(ArticleId(1), "a.com", "h", "old body", at(8))];
        let scraped = vec![ArticleVersion::scraped("a.com", "h", "new body", at(9))];
        let mut report = ComparisonPipeline::default().run(&stored, &scraped).unwrap();
        report.version_updates.push(VersionUpdate {
            article_id: ArticleId(99),
            heading: "h".to_string(),
            body: "b".to_string(),
            scraped_at: at(9),
        });

        assert!(storage.persist_report(&report).await.is_err());
        assert!(storage.changes_for_url("a.com").await.unwrap().is_empty());
        assert!(storage.latest_versions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_older_version_does_not_replace_latest() {
        let storage = MemoryStorage::new();
        storage
            .persist_report(&first_sightings(vec![ArticleVersion::scraped("a.com", "h", "b", at(9))]))
            .await
            .unwrap();
        let stale = BatchReport {
            version_updates: vec![VersionUpdate {
                article_id: ArticleId(1),
                heading: "old".to_string(),
                body: "old".to_string(),
                scraped_at: at(7),
            }],
            ..Default::default()
        };
        storage.persist_report(&stale).await.unwrap();
        let latest = storage.latest_versions().await.unwrap();
        assert_eq!(latest[0].heading.as_deref(), Some("h"));
    }
}
