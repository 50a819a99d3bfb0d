use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ct_core::{
    ArticleId, ArticleVersion, BatchReport, ChangeRecord, ChangeStore, ChangeType, Error, Result,
    VersionUpdate,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::StorageBackend;

const DEFAULT_URL: &str = "sqlite:articles.db";

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS article (
        article_id INTEGER PRIMARY KEY AUTOINCREMENT,
        article_url TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS article_version (
        article_version_id INTEGER PRIMARY KEY AUTOINCREMENT,
        article_id INTEGER NOT NULL REFERENCES article (article_id),
        heading TEXT NOT NULL,
        body TEXT NOT NULL,
        scraped_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS article_change (
        change_id INTEGER PRIMARY KEY AUTOINCREMENT,
        article_id INTEGER NOT NULL REFERENCES article (article_id),
        change_type TEXT NOT NULL,
        previous TEXT NOT NULL,
        current TEXT NOT NULL,
        previous_scraped_at TEXT NOT NULL,
        current_scraped_at TEXT NOT NULL,
        similarity REAL NOT NULL
    )
    "#,
    // Add future migrations here
];

fn db_error(context: &str) -> impl FnOnce(sqlx::Error) -> Error + '_ {
    move |e| Error::Database(format!("{}: {}", context, e))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("Failed to parse date {}: {}", raw, e)))
}

pub struct SQLiteStorage {
    pool: SqlitePool,
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    async fn connect(url: Option<&str>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url.unwrap_or(DEFAULT_URL))
            .map_err(db_error("Invalid database URL"))?
            .create_if_missing(true);
        Self::connect_with(options).await
    }
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        Self::connect_with(options).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self> {
        // One connection keeps `sqlite::memory:` databases shared and the
        // batch writes serialised.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_error("Failed to connect to database"))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }

        Ok(Self { pool })
    }

    async fn register_articles(conn: &mut SqliteConnection, records: &[ChangeRecord]) -> Result<()> {
        for record in records {
            sqlx::query("INSERT INTO article (article_id, article_url) VALUES (?, ?) ON CONFLICT DO NOTHING")
                .bind(record.article_id.0)
                .bind(&record.article_url)
                .execute(&mut *conn)
                .await
                .map_err(db_error("Failed to register article"))?;
        }
        Ok(())
    }

    async fn insert_changes(conn: &mut SqliteConnection, records: &[ChangeRecord]) -> Result<()> {
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO article_change
                (article_id, change_type, previous, current, previous_scraped_at, current_scraped_at, similarity)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.article_id.0)
            .bind(record.change_type.as_str())
            .bind(&record.previous)
            .bind(&record.current)
            .bind(record.previous_scraped_at.to_rfc3339())
            .bind(record.current_scraped_at.to_rfc3339())
            .bind(record.similarity)
            .execute(&mut *conn)
            .await
            .map_err(db_error("Failed to store change"))?;
        }
        Ok(())
    }

    async fn insert_versions(conn: &mut SqliteConnection, updates: &[VersionUpdate]) -> Result<()> {
        for update in updates {
            sqlx::query(
                r#"
                INSERT INTO article_version (article_id, heading, body, scraped_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(update.article_id.0)
            .bind(&update.heading)
            .bind(&update.body)
            .bind(update.scraped_at.to_rfc3339())
            .execute(&mut *conn)
            .await
            .map_err(db_error("Failed to store version"))?;
        }
        Ok(())
    }

    async fn insert_articles(conn: &mut SqliteConnection, articles: &[ArticleVersion]) -> Result<()> {
        for article in articles {
            let (Some(heading), Some(body)) = (&article.heading, &article.body) else {
                warn!("Not registering {} without heading and body", article.url);
                continue;
            };

            let inserted = sqlx::query(
                "INSERT INTO article (article_url) VALUES (?) ON CONFLICT (article_url) DO NOTHING",
            )
            .bind(&article.url)
            .execute(&mut *conn)
            .await
            .map_err(db_error("Failed to store article"))?;
            if inserted.rows_affected() == 0 {
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO article_version (article_id, heading, body, scraped_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(inserted.last_insert_rowid())
            .bind(heading)
            .bind(body)
            .bind(article.captured_at.to_rfc3339())
            .execute(&mut *conn)
            .await
            .map_err(db_error("Failed to store first version"))?;
        }
        Ok(())
    }

    fn row_to_record(row: &SqliteRow) -> Result<ChangeRecord> {
        Ok(ChangeRecord {
            article_id: ArticleId(row.get("article_id")),
            article_url: row.get("article_url"),
            change_type: row.get::<String, _>("change_type").parse::<ChangeType>()?,
            previous: row.get("previous"),
            current: row.get("current"),
            previous_scraped_at: parse_time(&row.get::<String, _>("previous_scraped_at"))?,
            current_scraped_at: parse_time(&row.get::<String, _>("current_scraped_at"))?,
            similarity: row.get("similarity"),
        })
    }
}

#[async_trait]
impl ChangeStore for SQLiteStorage {
    async fn latest_versions(&self) -> Result<Vec<ArticleVersion>> {
        let rows = sqlx::query(
            r#"
            SELECT a.article_id, a.article_url, v.heading, v.body, v.scraped_at
            FROM article a
            JOIN article_version v ON v.article_id = a.article_id
            WHERE v.article_version_id = (
                SELECT latest.article_version_id FROM article_version latest
                WHERE latest.article_id = a.article_id
                ORDER BY latest.scraped_at DESC, latest.article_version_id DESC
                LIMIT 1
            )
            ORDER BY a.article_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load latest versions"))?;

        rows.iter()
            .map(|row| -> Result<ArticleVersion> {
                Ok(ArticleVersion {
                    article_id: Some(ArticleId(row.get("article_id"))),
                    url: row.get("article_url"),
                    heading: Some(row.get("heading")),
                    body: Some(row.get("body")),
                    captured_at: parse_time(&row.get::<String, _>("scraped_at"))?,
                })
            })
            .collect()
    }

    async fn persist_report(&self, report: &BatchReport) -> Result<()> {
        let records = report.records();
        let mut tx = self.pool.begin().await.map_err(db_error("Failed to begin"))?;

        // Dropping `tx` on an early return rolls the whole batch back.
        Self::register_articles(&mut *tx, &records).await?;
        Self::insert_changes(&mut *tx, &records).await?;
        Self::insert_versions(&mut *tx, &report.version_updates).await?;
        Self::insert_articles(&mut *tx, &report.new_articles).await?;

        tx.commit().await.map_err(db_error("Failed to commit batch"))?;
        debug!(
            "Stored {} changes, {} versions, {} new articles",
            records.len(),
            report.version_updates.len(),
            report.new_articles.len()
        );
        Ok(())
    }

    async fn changes_for_url(&self, url: &str) -> Result<Vec<ChangeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT c.article_id, a.article_url, c.change_type, c.previous, c.current,
                   c.previous_scraped_at, c.current_scraped_at, c.similarity
            FROM article_change c
            JOIN article a ON a.article_id = c.article_id
            WHERE a.article_url = ?
            ORDER BY c.current_scraped_at, c.change_id
            "#,
        )
        .bind(url)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load changes"))?;

        rows.iter().map(Self::row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ct_core::ComparisonPipeline;
    use tempfile::tempdir;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 20, hour, 0, 0).unwrap()
    }

    fn first_sightings(articles: Vec<ArticleVersion>) -> BatchReport {
        BatchReport {
            new_articles: articles,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sqlite_storage() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let storage = SQLiteStorage::new_with_path(&db_path).await.unwrap();

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
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].captured_at, at(8));

        let scraped = vec![ArticleVersion::scraped("a.com", "PM quits", "The PM resigned today after scandal.", at(9))];
        let report = ComparisonPipeline::default().run(&stored, &scraped).unwrap();
        storage.persist_report(&report).await.unwrap();

        let history = storage.changes_for_url("a.com").await.unwrap();
        assert_eq!(history, report.records());

        let latest = storage.latest_versions().await.unwrap();
        assert_eq!(latest[0].heading.as_deref(), Some("PM quits"));
        assert_eq!(latest[0].captured_at, at(9));
    }

    #[tokio::test]
    async fn test_stored_rows_from_outside_the_database() {
        let storage = SQLiteStorage::connect(Some("sqlite::memory:")).await.unwrap();
        let stored = vec![ArticleVersion::stored(ArticleId(1), "a.com", "h", "old body", at(8))];
        let scraped = vec![
            ArticleVersion::scraped("a.com", "h", "new body", at(9)),
            ArticleVersion::scraped("c.com", "h", "b", at(9)),
        ];
        let report = ComparisonPipeline::default().run(&stored, &scraped).unwrap();
        storage.persist_report(&report).await.unwrap();

        assert_eq!(storage.changes_for_url("a.com").await.unwrap().len(), 1);
        let latest = storage.latest_versions().await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].url, "a.com");
        assert_eq!(latest[0].body.as_deref(), Some("new body"));
        assert_eq!(latest[1].url, "c.com");
    }

    #[tokio::test]
    async fn test_failed_version_insert_rolls_back_changes() {
        let storage = SQLiteStorage::connect(Some("sqlite::memory:")).await.unwrap();
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
    async fn test_known_urls_are_not_registered_twice() {
        let storage = SQLiteStorage::connect(Some("sqlite::memory:")).await.unwrap();
        let batch = first_sightings(vec![ArticleVersion::scraped("a.com", "h", "b", at(8))]);
        storage.persist_report(&batch).await.unwrap();
        storage.persist_report(&batch).await.unwrap();
        assert_eq!(storage.latest_versions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_values_are_bound_not_interpolated() {
        let storage = SQLiteStorage::connect(Some("sqlite::memory:")).await.unwrap();
        let url = "x.com'); DROP TABLE article; --";
        storage
            .persist_report(&first_sightings(vec![ArticleVersion::scraped(url, "h", "b", at(8))]))
            .await
            .unwrap();
        let stored = storage.latest_versions().await.unwrap();
        assert_eq!(stored[0].url, url);
        assert!(storage.changes_for_url(url).await.unwrap().is_empty());
    }
}
