//! The normalized event record produced by the parser and held by the store.
//!
//! An [`EventRecord`] is write-once: it is built by the parser (or a test
//! helper), handed to the store exactly once, and from then on only shared
//! behind an `Arc`. There are no setters.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity assigned when a payload carries no usable level.
pub const DEFAULT_LEVEL: &str = "info";

/// Unique identifier of an event record.
///
/// Generated at creation time from a random v4 UUID and never reused.
/// Uniqueness against records already in a store is the store's concern,
/// not the generator's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Smallest possible identifier. Used as the lower key of a time bound.
    pub const fn min() -> Self {
        Self(Uuid::nil())
    }

    /// Largest possible identifier. Used as the upper key of a time bound.
    pub const fn max() -> Self {
        Self(Uuid::max())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A single normalized log event.
///
/// The timestamp is always UTC and is the ordering key of the store's time
/// index. Properties hold string-valued payload fields and metrics hold
/// numeric ones; no payload field ever lands in both, and fields consumed
/// for the timestamp, message, level or correlation id land in neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    id: EventId,
    timestamp: DateTime<Utc>,
    message: String,
    level: String,
    #[serde(default)]
    correlation_id: String,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    metrics: BTreeMap<String, f64>,
}

impl EventRecord {
    /// Creates a record with a freshly generated identifier and no
    /// properties or metrics.
    ///
    /// # Arguments
    ///
    /// * `timestamp` - When the event happened
    /// * `message` - Free-form message text
    /// * `level` - Severity; pass [`DEFAULT_LEVEL`] when unknown
    /// * `correlation_id` - Correlation id, or an empty string when absent
    pub fn new(
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
        level: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            timestamp,
            message: message.into(),
            level: level.into(),
            correlation_id: correlation_id.into(),
            properties: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// Replaces the property map.
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    /// Replaces the metric map.
    pub fn with_metrics(mut self, metrics: BTreeMap<String, f64>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Unique identifier.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Event time, always UTC.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Message text. Empty when the payload had none.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Severity level.
    pub fn level(&self) -> &str {
        &self.level
    }

    /// Correlation id. Empty when the payload had none.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// String-valued payload fields not consumed by a structured attribute.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Numeric payload fields not consumed by a structured attribute.
    pub fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }
}
