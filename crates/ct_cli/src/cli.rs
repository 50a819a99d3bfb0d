use clap::{Parser, Subcommand};
use ct_core::diff::{annotate, unified};
use ct_core::similarity::similarity_with_precision;
use ct_core::{ArticleVersion, ChangeStore, ComparisonPipeline, PipelineConfig, Result};
use std::path::PathBuf;

use crate::logging::Logger;
use crate::tables;

#[derive(Parser, Debug)]
#[command(author, version, about = "Track changes to published news articles", long_about = None)]
pub struct Cli {
    /// Storage backend: memory or sqlite
    #[arg(long, env = "CT_STORAGE", default_value = "memory")]
    pub storage: String,

    /// Database URL for the sqlite backend (e.g. sqlite:articles.db)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Decimal places kept on similarity scores
    #[arg(long, env = "CT_SIMILARITY_DECIMALS", default_value_t = 2)]
    pub similarity_decimals: u32,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            similarity_decimals: self.similarity_decimals,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare a scrape pass against the latest stored versions
    Compare {
        /// CSV of scraped versions (article_url, heading, body, captured_at)
        #[arg(long)]
        scraped: PathBuf,
        /// CSV of stored versions; read from the storage backend when absent
        #[arg(long)]
        stored: Option<PathBuf>,
        /// Write detected changes to this CSV
        #[arg(long)]
        output: Option<PathBuf>,
        /// Write new article versions to this CSV
        #[arg(long)]
        versions_output: Option<PathBuf>,
        /// Print the full batch report as JSON
        #[arg(long)]
        json: bool,
        /// Do not write anything to the storage backend
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the word diff between two texts
    Diff {
        previous: String,
        current: String,
        /// Unchanged tokens shown around each change
        #[arg(long, default_value_t = 3)]
        context: usize,
    },
    /// List recorded changes for an article
    History { url: String },
}

pub async fn handle_command(cli: Cli, logger: Logger) -> Result<()> {
    let config = cli.pipeline_config();
    match cli.command {
        Commands::Compare {
            scraped,
            stored,
            output,
            versions_output,
            json,
            dry_run,
        } => {
            let logger = logger.with_prefix("[compare]");
            let storage =
                ct_storage::create_storage(&cli.storage, cli.database_url.as_deref()).await?;

            let stored: Vec<ArticleVersion> = match stored {
                Some(path) => tables::read_versions(&path)?,
                None => storage.latest_versions().await?,
            };
            let scraped = tables::read_versions(&scraped)?;

            let report = ComparisonPipeline::new(config).run(&stored, &scraped)?;
            for ambiguity in &report.ambiguities {
                logger.warn(&format!(
                    "{} appeared {} times in the scrape",
                    ambiguity.url,
                    ambiguity.dropped + 1
                ));
            }

            let records = report.records();
            if dry_run {
                logger.info("Dry run, storage left untouched");
            } else {
                storage.persist_report(&report).await?;
                logger.info(&format!(
                    "💾 Stored {} changes, {} versions, {} new articles",
                    records.len(),
                    report.version_updates.len(),
                    report.new_articles.len()
                ));
            }

            if let Some(path) = output {
                tables::write_records(&path, &records)?;
                logger.info(&format!("Wrote changes to {}", path.display()));
            }
            if let Some(path) = versions_output {
                tables::write_versions(&path, &report.version_updates)?;
                logger.info(&format!("Wrote versions to {}", path.display()));
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Commands::Diff {
            previous,
            current,
            context,
        } => {
            for line in unified(&previous, &current, context) {
                println!("{}", line);
            }
            println!("annotation: {:?}", annotate(&previous, &current));
            println!(
                "similarity: {}",
                similarity_with_precision(&previous, &current, config.similarity_decimals)
            );
        }
        Commands::History { url } => {
            let storage =
                ct_storage::create_storage(&cli.storage, cli.database_url.as_deref()).await?;
            let changes = storage.changes_for_url(&url).await?;
            if changes.is_empty() {
                println!("No changes recorded for {}", url);
            }
            for change in changes {
                println!(
                    "{} {:>7} {:>6.2}%  {} -> {}",
                    change.current_scraped_at.format("%Y-%m-%d %H:%M"),
                    change.change_type,
                    change.similarity,
                    change.previous,
                    change.current
                );
            }
        }
    }
    Ok(())
}
