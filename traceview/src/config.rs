//! Configuration types for field mapping and the ingestion pipeline.
//!
//! [`TraceConfig`] tells the parser which payload fields carry the timestamp,
//! message, level and correlation id. An empty list for a concept means the
//! parser falls back to its built-in heuristic names; a non-empty list means
//! only those names are tried, in order. The retention flag controls whether
//! the store keeps the raw payload text next to each record.
//!
//! [`PipelineConfig`] sizes the bounded ingestion queue and its worker pool.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default bounded queue capacity between the receive loop and the workers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;

/// Default number of ingestion workers.
pub const DEFAULT_WORKERS: usize = 1;

/// Field-mapping configuration consumed by the parser and the store.
///
/// # Example
///
/// ```rust
/// use traceview::config::TraceConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TraceConfig {
///     timestamp_fields: TraceConfig::split_names("ts, when"),
///     correlation_id_fields: vec!["requestId".to_string()],
///     ..TraceConfig::default()
/// };
/// config.validate()?;
/// assert_eq!(config.timestamp_fields, vec!["ts", "when"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Candidate timestamp field names, tried left to right.
    #[serde(default)]
    pub timestamp_fields: Vec<String>,

    /// Candidate message field names, tried left to right.
    #[serde(default)]
    pub message_fields: Vec<String>,

    /// Candidate level field names, tried left to right.
    #[serde(default)]
    pub level_fields: Vec<String>,

    /// Candidate correlation id field names. There is no heuristic fallback
    /// for this concept, so an empty list means no correlation id is ever
    /// extracted.
    #[serde(default)]
    pub correlation_id_fields: Vec<String>,

    /// Retain the raw payload text keyed by record id.
    #[serde(default)]
    pub keep_original_payload: bool,
}

impl TraceConfig {
    /// Validates every candidate list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BlankFieldName`] if any candidate name is empty
    /// or whitespace only.
    pub fn validate(&self) -> Result<()> {
        let lists: [(&'static str, &[String]); 4] = [
            ("timestamp", &self.timestamp_fields),
            ("message", &self.message_fields),
            ("level", &self.level_fields),
            ("correlation id", &self.correlation_id_fields),
        ];

        for (concept, names) in lists {
            if let Some(index) = names.iter().position(|n| n.trim().is_empty()) {
                return Err(ConfigError::BlankFieldName { concept, index }.into());
            }
        }
        Ok(())
    }

    /// Splits a comma-separated list of field names.
    ///
    /// Each name is trimmed and empty entries are dropped, so `""` yields an
    /// empty list (heuristic mode) and `"a,,b"` yields `["a", "b"]`.
    pub fn split_names(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Sizing of the ingestion queue and worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of payloads waiting in the queue.
    pub queue_capacity: usize,
    /// Number of worker tasks draining the queue.
    pub workers: usize,
}

impl PipelineConfig {
    /// Creates a pipeline configuration. Zero values are raised to one.
    pub fn new(queue_capacity: usize, workers: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            workers: workers.max(1),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS)
    }
}
