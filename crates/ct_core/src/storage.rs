use async_trait::async_trait;

use crate::pipeline::BatchReport;
use crate::types::{ArticleVersion, ChangeRecord};
use crate::Result;

#[async_trait]
pub trait ChangeStore: Send + Sync {
    /// Latest known version of every tracked article
    async fn latest_versions(&self) -> Result<Vec<ArticleVersion>>;

    /// Writes the changes, version updates and first sightings of one batch.
    ///
    /// Either the whole report is stored or none of it is. Articles that
    /// change records refer to but the store has not seen yet (stored rows
    /// read from a file) are registered under the given id first.
    async fn persist_report(&self, report: &BatchReport) -> Result<()>;

    /// Change history for one article, oldest first
    async fn changes_for_url(&self, url: &str) -> Result<Vec<ChangeRecord>>;
}
