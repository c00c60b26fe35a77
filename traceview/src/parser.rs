//! Field-mapping payload parser.
//!
//! Turns one raw payload into an [`EventRecord`]. Three shapes are accepted:
//!
//! - **Plain text**: anything not starting with `{`. The trimmed text becomes
//!   the message, stamped now with level `info`.
//! - **Structured convention**: a JSON object whose `@t` key holds a parseable
//!   timestamp. `@t`, `@m`/`@mt` and `@l` have fixed meanings.
//! - **Generic JSON**: any other object. Timestamp, message and level are
//!   resolved from configured candidate names, or from built-in heuristic
//!   names when none are configured.
//!
//! Fields consumed for a structured attribute are removed from the pool.
//! What remains is bucketed: strings into properties, numbers into metrics,
//! everything else dropped.
//!
//! Candidate names are always tried strictly left to right and the first one
//! present with a usable value wins. There is no case-insensitive matching.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::trace;

use crate::config::TraceConfig;
use crate::error::{ParseError, Result};
use crate::event::{DEFAULT_LEVEL, EventRecord};
use crate::timestamp::parse_timestamp;

/// Timestamp key of the structured convention. Its presence with a parseable
/// value is what selects structured mode.
pub const CLEF_TIMESTAMP: &str = "@t";
/// Rendered message key of the structured convention.
pub const CLEF_MESSAGE: &str = "@m";
/// Message template key of the structured convention.
pub const CLEF_MESSAGE_TEMPLATE: &str = "@mt";
/// Level key of the structured convention.
pub const CLEF_LEVEL: &str = "@l";

/// Timestamp names tried when none are configured.
pub const TIMESTAMP_HEURISTICS: &[&str] = &[
    "timestamp",
    "Timestamp",
    "time",
    "Time",
    "date",
    "Date",
    "datetime",
    "DateTime",
    "eventDate",
    "EventDate",
];

/// Message names tried when none are configured.
pub const MESSAGE_HEURISTICS: &[&str] = &[
    "message",
    "Message",
    "Description",
    "description",
    "Text",
    "text",
    "Error",
    "error",
    "ErrorText",
    "errorText",
];

/// Level names tried when none are configured.
pub const LEVEL_HEURISTICS: &[&str] = &["level", "Level", "severity", "Severity"];

/// Which payload shape a parse resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Not a JSON object.
    PlainText,
    /// JSON object using the `@`-prefixed convention.
    Structured,
    /// Any other JSON object.
    Generic,
}

/// Parses raw payloads according to a [`TraceConfig`].
///
/// The parser holds only immutable configuration, so one instance can be
/// shared across any number of worker tasks.
///
/// # Examples
///
/// ```rust
/// use traceview::config::TraceConfig;
/// use traceview::parser::PayloadParser;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let parser = PayloadParser::new(TraceConfig::default());
/// let record = parser.parse(r#"{"@t":"2016-11-21T11:22:33Z","@m":"hello","bar":2}"#)?;
/// assert_eq!(record.message(), "hello");
/// assert_eq!(record.metrics()["bar"], 2.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct PayloadParser {
    config: TraceConfig,
}

impl PayloadParser {
    /// Creates a parser for the given field mapping.
    pub fn new(config: TraceConfig) -> Self {
        Self { config }
    }

    /// Parses one payload into a record with a fresh identifier.
    ///
    /// # Errors
    ///
    /// - [`ParseError::EmptyPayload`] if the payload is blank
    /// - [`ParseError::InvalidPayload`] if it starts with `{` but is not a
    ///   JSON object
    /// - [`ParseError::NoTimestampField`] if timestamp candidates are
    ///   configured and none of them parses
    /// - [`ParseError::NoMessageField`] if message candidates are configured
    ///   and none of them holds a string
    pub fn parse(&self, raw: &str) -> Result<EventRecord> {
        self.parse_detailed(raw).map(|(record, _)| record)
    }

    /// Like [`parse`](Self::parse), also reporting which format was detected.
    ///
    /// # Errors
    ///
    /// Same as [`parse`](Self::parse).
    pub fn parse_detailed(&self, raw: &str) -> Result<(EventRecord, PayloadFormat)> {
        let payload = raw.trim();
        if payload.is_empty() {
            return Err(ParseError::EmptyPayload.into());
        }

        if !payload.starts_with('{') {
            let record = EventRecord::new(Utc::now(), payload, DEFAULT_LEVEL, "");
            return Ok((record, PayloadFormat::PlainText));
        }

        let mut fields: Map<String, Value> = serde_json::from_str(payload)
            .map_err(|source| ParseError::InvalidPayload { source })?;

        let clef_timestamp = fields
            .get(CLEF_TIMESTAMP)
            .and_then(|v| parse_timestamp(v).ok());

        let (record, format) = match clef_timestamp {
            Some(timestamp) => {
                fields.remove(CLEF_TIMESTAMP);
                (self.parse_structured(timestamp, fields), PayloadFormat::Structured)
            }
            None => (self.parse_generic(fields)?, PayloadFormat::Generic),
        };
        trace!(id = %record.id(), ?format, "parsed payload");
        Ok((record, format))
    }

    fn parse_structured(
        &self,
        timestamp: DateTime<Utc>,
        mut fields: Map<String, Value>,
    ) -> EventRecord {
        let rendered = fields.remove(CLEF_MESSAGE);
        let template = fields.remove(CLEF_MESSAGE_TEMPLATE);
        let message = match (rendered, template) {
            (Some(Value::String(m)), _) if !m.is_empty() => m,
            (_, Some(Value::String(mt))) => mt,
            _ => String::new(),
        };

        // A non-string level is consumed and ignored.
        let level = match fields.remove(CLEF_LEVEL) {
            Some(Value::String(l)) => l,
            _ => DEFAULT_LEVEL.to_string(),
        };

        let correlation_id = self.take_correlation_id(&mut fields);
        build(timestamp, message, level, correlation_id, fields)
    }

    fn parse_generic(&self, mut fields: Map<String, Value>) -> Result<EventRecord> {
        let config = &self.config;

        let timestamp = if config.timestamp_fields.is_empty() {
            take_first(&mut fields, TIMESTAMP_HEURISTICS, timestamp_value)
                .unwrap_or_else(Utc::now)
        } else {
            take_first(&mut fields, config.timestamp_fields.as_slice(), timestamp_value).ok_or_else(
                || ParseError::NoTimestampField {
                    candidates: config.timestamp_fields.clone(),
                },
            )?
        };

        let message = if config.message_fields.is_empty() {
            take_first(&mut fields, MESSAGE_HEURISTICS, string_value).unwrap_or_default()
        } else {
            take_first(&mut fields, config.message_fields.as_slice(), string_value).ok_or_else(|| {
                ParseError::NoMessageField {
                    candidates: config.message_fields.clone(),
                }
            })?
        };

        // Level never fails, configured or not.
        let level = if config.level_fields.is_empty() {
            take_first(&mut fields, LEVEL_HEURISTICS, string_value)
        } else {
            take_first(&mut fields, config.level_fields.as_slice(), string_value)
        }
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string());

        let correlation_id = self.take_correlation_id(&mut fields);
        Ok(build(timestamp, message, level, correlation_id, fields))
    }

    fn take_correlation_id(&self, fields: &mut Map<String, Value>) -> String {
        take_first(fields, self.config.correlation_id_fields.as_slice(), |v| {
            v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
        })
        .unwrap_or_default()
    }
}

/// Removes and returns the value of the first name whose value `extract`
/// accepts. Names whose values are rejected stay in the pool.
fn take_first<N, T>(
    fields: &mut Map<String, Value>,
    names: &[N],
    extract: impl Fn(&Value) -> Option<T>,
) -> Option<T>
where
    N: AsRef<str>,
{
    names.iter().find_map(|name| {
        let name = name.as_ref();
        let found = fields.get(name).and_then(&extract)?;
        fields.remove(name);
        Some(found)
    })
}

fn timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    parse_timestamp(value).ok()
}

fn string_value(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn build(
    timestamp: DateTime<Utc>,
    message: String,
    level: String,
    correlation_id: String,
    remaining: Map<String, Value>,
) -> EventRecord {
    let mut properties = BTreeMap::new();
    let mut metrics = BTreeMap::new();

    for (key, value) in remaining {
        match value {
            Value::String(s) => {
                properties.insert(key, s);
            }
            Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    metrics.insert(key, f);
                }
            }
            Value::Bool(_) | Value::Array(_) | Value::Object(_) | Value::Null => {}
        }
    }

    EventRecord::new(timestamp, message, level, correlation_id)
        .with_properties(properties)
        .with_metrics(metrics)
}
