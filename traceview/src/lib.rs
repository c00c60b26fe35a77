//! # traceview
//!
//! In-memory log event ingestion and time-range querying.
//!
//! traceview accepts free-form or structured log payloads, normalizes them
//! into uniform event records and indexes those records by time. It answers
//! "up to N events between A and B" with snapshot-consistent reads while
//! ingestion keeps writing.
//!
//! ## Key Properties
//!
//! - Plain text, arbitrary JSON objects and the `@t`/`@m`/`@l` structured
//!   convention are all accepted
//! - Configurable field mapping with heuristic fallbacks
//! - Epoch timestamps in seconds, milliseconds, microseconds or nanoseconds
//! - Lock-free readers: every scan sees one published version of the store
//! - Bounded ingestion queue that applies backpressure instead of dropping
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use traceview::{InMemoryStore, PayloadParser, TraceConfig, TraceStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TraceConfig::default();
//! let parser = PayloadParser::new(config.clone());
//! let store = InMemoryStore::new(&config);
//!
//! let record = parser.parse(r#"{"@t":"2016-11-21T11:22:33Z","@m":"hello","@l":"debug"}"#)?;
//! store.insert(record, None)?;
//!
//! for record in store.list_by_time_range(10, None, None, false)? {
//!     println!("{} [{}] {}", record.timestamp(), record.level(), record.message());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`event`]: the normalized record and its identifier
//! - [`config`]: field mapping and pipeline sizing
//! - [`timestamp`]: epoch and text timestamp decoding
//! - [`parser`]: payload format detection and field resolution
//! - [`query`]: range scan planning and query parameter parsing
//! - [`store`]: the time-indexed store
//! - [`ingest`]: bounded queue and worker pool
//! - [`error`]: error types

pub mod config;
pub mod error;
pub mod event;
pub mod ingest;
pub mod parser;
pub mod query;
pub mod store;
pub mod timestamp;

// Re-export primary API types at crate root for convenience.
pub use config::{PipelineConfig, TraceConfig};
pub use error::{Result, TraceviewError};
pub use event::{EventId, EventRecord};
pub use ingest::{IngestCounts, IngestHandle, IngestPipeline};
pub use parser::PayloadParser;
pub use query::{ScanPlan, TraceQuery};
pub use store::{InMemoryStore, TraceStore};
