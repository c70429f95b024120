use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Where a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    App,
    Stdout,
    Stderr,
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogSource::App => "app",
            LogSource::Stdout => "stdout",
            LogSource::Stderr => "stderr",
        })
    }
}

/// Append-only, user-visible log shared by the launcher and the recorder
pub trait LogSink: Send + Sync + fmt::Debug {
    fn line(&self, source: LogSource, text: &str);
}

/// Forwards lines to `tracing`; stderr lines are logged as warnings
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn line(&self, source: LogSource, text: &str) {
        match source {
            LogSource::Stderr => warn!(target: "action_gen::script", "{}", text),
            LogSource::Stdout => info!(target: "action_gen::script", "{}", text),
            LogSource::App => info!(target: "action_gen::app", "{}", text),
        }
    }
}

/// Keeps lines in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<(LogSource, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far
    pub fn lines(&self) -> Vec<(LogSource, String)> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Lines from one source, in order
    pub fn lines_from(&self, source: LogSource) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(s, _)| *s == source)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|(_, text)| text.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn line(&self, source: LogSource, text: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((source, text.to_string()));
    }
}
