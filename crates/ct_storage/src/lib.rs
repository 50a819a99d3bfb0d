use async_trait::async_trait;
use ct_core::{ChangeStore, Error, Result};
use std::sync::Arc;
use tracing::info;

pub mod backends;

pub use backends::*;

#[async_trait]
pub trait StorageBackend: ChangeStore + Sized {
    async fn connect(url: Option<&str>) -> Result<Self>;
}

/// Opens the backend named `kind` ("memory" or "sqlite").
pub async fn create_storage(kind: &str, url: Option<&str>) -> Result<Arc<dyn ChangeStore>> {
    let storage: Arc<dyn ChangeStore> = match kind {
        "memory" => Arc::new(MemoryStorage::connect(url).await?),
        #[cfg(feature = "sqlite")]
        "sqlite" => Arc::new(SQLiteStorage::connect(url).await.map_err(|e| {
            Error::Storage(format!(
                "SQLite database should be reachable (default ./articles.db) ({})",
                e
            ))
        })?),
        other => {
            return Err(Error::Storage(format!("Unknown storage backend: {}", other)));
        }
    };
    info!("🏦 Storage backend ready (using {})", kind);
    Ok(storage)
}
