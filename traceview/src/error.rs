//! Error types for traceview ingestion, storage and queries.

use thiserror::Error;

/// The main error type for all traceview operations.
///
/// Each variant wraps the error enum of one concern so callers can match
/// on the concern first and the specific failure second.
#[derive(Error, Debug)]
pub enum TraceviewError {
    /// A payload could not be turned into an event record.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The indexed storage failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Query parameters supplied by a client were invalid.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// The field-mapping configuration is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A payload could not be handed to the ingestion queue.
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),
}

/// Input errors reported by the payload parser.
///
/// These never abort ingestion: the worker that hits one logs it and moves
/// on to the next queued payload.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The payload was empty after trimming whitespace.
    #[error("empty payload")]
    EmptyPayload,

    /// The payload looked like a JSON object but did not decode as one.
    #[error("invalid JSON payload: {source}")]
    InvalidPayload {
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// None of the configured timestamp fields held a parseable timestamp.
    #[error("no timestamp field found among configured candidates {candidates:?}")]
    NoTimestampField {
        /// The configured candidate names, in the order they were tried.
        candidates: Vec<String>,
    },

    /// None of the configured message fields held a string.
    #[error("no message field found among configured candidates {candidates:?}")]
    NoMessageField {
        /// The configured candidate names, in the order they were tried.
        candidates: Vec<String>,
    },

    /// A numeric timestamp whose digit count maps to no known epoch unit.
    #[error("invalid epoch {value}: {digits} digits does not match seconds, millis, micros or nanos")]
    InvalidEpoch {
        /// The integer part of the numeric value.
        value: i128,
        /// Decimal digit count of `value`.
        digits: usize,
    },

    /// A timestamp value matched none of the supported text formats.
    #[error("unrecognised timestamp format: {value}")]
    InvalidTimestampFormat {
        /// The offending value, rendered as text.
        value: String,
    },
}

/// Errors surfaced by the time-indexed store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The indexed storage mechanism failed. Callers treat this as opaque.
    #[error("storage failure: {reason}")]
    Storage {
        /// Description of the failure.
        reason: String,
    },
}

/// Client input errors at the query boundary.
#[derive(Error, Debug)]
pub enum QueryError {
    /// A time bound was not a valid RFC 3339 timestamp.
    #[error("invalid '{param}' timestamp '{value}': expected RFC 3339")]
    InvalidTimestamp {
        /// Name of the query parameter (`from` or `to`).
        param: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },

    /// The requested count was not a positive integer.
    #[error("invalid count '{value}': expected a positive integer")]
    InvalidCount {
        /// The raw value that failed to parse.
        value: String,
    },

    /// A boolean flag was neither `true` nor `false`.
    #[error("invalid '{param}' flag '{value}': expected true or false")]
    InvalidFlag {
        /// Name of the query parameter.
        param: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },
}

/// Errors in the field-mapping configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A candidate field name was empty or whitespace only.
    #[error("blank {concept} field name at position {index}")]
    BlankFieldName {
        /// Which concept the list belongs to (timestamp, message, ...).
        concept: &'static str,
        /// Zero-based position in the list.
        index: usize,
    },
}

/// Errors when handing payloads to the ingestion queue.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Every worker has stopped and the queue no longer accepts payloads.
    #[error("ingestion queue is closed")]
    QueueClosed,

    /// The queue is at capacity. Only returned by the non-blocking submit.
    #[error("ingestion queue is full")]
    QueueFull,
}

/// Type alias for `Result<T, TraceviewError>`.
pub type Result<T> = std::result::Result<T, TraceviewError>;
