use thiserror::Error;

use crate::types::ChangeType;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed {field} text for {url}")]
    MalformedText { url: String, field: ChangeType },

    #[error("Scraped version of {url} predates the stored one ({previous} > {current})")]
    OutOfOrder {
        url: String,
        previous: chrono::DateTime<chrono::Utc>,
        current: chrono::DateTime<chrono::Utc>,
    },

    #[error("Stored article {0} has no article id")]
    MissingArticleId(String),

    #[error("Article version has an empty URL")]
    EmptyUrl,

    #[error("Invalid diff annotation: {0}")]
    Annotation(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures scoped to a single article pair; the batch keeps going.
    pub fn is_per_pair(&self) -> bool {
        matches!(
            self,
            Error::MalformedText { .. }
                | Error::OutOfOrder { .. }
                | Error::MissingArticleId(_)
                | Error::EmptyUrl
                | Error::Annotation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_pair_scoped_errors() {
        let at = Utc.with_ymd_and_hms(2024, 2, 20, 8, 0, 0).unwrap();
        assert!(Error::OutOfOrder { url: "a.com".to_string(), previous: at, current: at }.is_per_pair());
        assert!(Error::MalformedText { url: "a.com".to_string(), field: ChangeType::Body }.is_per_pair());
        assert!(!Error::Input("unreadable".to_string()).is_per_pair());
        assert!(!Error::Database("locked".to_string()).is_per_pair());
    }
}
