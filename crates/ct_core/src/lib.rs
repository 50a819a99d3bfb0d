pub mod classifier;
pub mod diff;
pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod record;
pub mod similarity;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
pub use pipeline::{BatchReport, ComparisonPipeline, PipelineConfig, SkippedChange};
pub use storage::ChangeStore;
pub use types::{
    ArticleId, ArticleVersion, ChangePair, ChangeRecord, ChangeType, FieldChange, FieldDelta,
    VersionUpdate,
};

pub mod prelude {
    pub use super::{
        ArticleId, ArticleVersion, BatchReport, ChangeRecord, ChangeStore, ChangeType,
        ComparisonPipeline, Error, PipelineConfig, Result,
    };
}
