use std::collections::VecDeque;
use std::sync::Once;
use tracing::Level;

static INIT: Once = Once::new();

/// Prefixes every message with the stage it comes from.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    prefixes: VecDeque<String>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push_back(prefix.into());
        self
    }

    fn prefix(&self) -> String {
        self.prefixes.iter().map(|p| format!("{} ", p)).collect()
    }

    pub fn info(&self, message: &str) {
        tracing::info!("{}{}", self.prefix(), message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!("{}{}", self.prefix(), message);
    }
}

pub fn init_logging(verbose: bool) -> Logger {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    if !tracing::dispatcher::has_been_set() {
        INIT.call_once(|| {
            tracing_subscriber::fmt().with_max_level(level).init();
        });
    }
    Logger::new()
}
