//! Time-indexed event storage.
//!
//! This module provides the [`TraceStore`] trait and its in-memory
//! implementation, [`InMemoryStore`].
//!
//! # Design
//!
//! The store keeps three persistent maps inside one immutable snapshot:
//!
//! - `by_id`: unique index from record id to record
//! - `by_time`: ordered index keyed by `(timestamp, id)`, so records sharing a
//!   timestamp stay distinct and scans can seek to any instant
//! - `payloads`: raw payload text, filled only when retention is enabled
//!
//! Readers load the current snapshot with a single atomic pointer read and
//! scan it without taking any lock. The single writer clones the snapshot
//! (O(1) for persistent maps), applies the insert and publishes the new
//! version with one atomic swap. A reader therefore sees either the whole
//! insert or none of it, and never waits for the writer.
//!
//! ```text
//!   writer ── lock ── clone ── insert ── swap ──▶ current
//!                                                   │
//!   reader ─────────────── load ◀───────────────────┘
//! ```

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use imbl::{HashMap, OrdMap};
use parking_lot::Mutex;
use tracing::debug;

use crate::config::TraceConfig;
use crate::error::Result;
use crate::event::{EventId, EventRecord};
use crate::query::{ScanDirection, ScanPlan};

/// Key of the time index.
type TimeKey = (DateTime<Utc>, EventId);

/// Storage contract shared by the ingestion pipeline and the query service.
///
/// Implementations must serialize writers and give readers snapshot
/// isolation: a scan that starts before an insert commits observes either
/// the state before it or the state after it, never a mix.
pub trait TraceStore: Send + Sync {
    /// Adds a record to both indexes. A record whose id is already stored
    /// replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) if the underlying
    /// storage fails.
    fn insert(&self, record: EventRecord, original_payload: Option<&str>) -> Result<()>;

    /// Point lookup. `Ok(None)` means the id was never stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) if the underlying
    /// storage fails.
    fn get_by_id(&self, id: &EventId) -> Result<Option<Arc<EventRecord>>>;

    /// Runs a resolved scan. Results are always in ascending time order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) if the underlying
    /// storage fails.
    fn scan(&self, plan: &ScanPlan) -> Result<Vec<Arc<EventRecord>>>;

    /// Lists up to `min(limit, 100)` records in ascending time order.
    ///
    /// Absent bounds are resolved by [`ScanPlan::resolve`] against the
    /// current time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) if the underlying
    /// storage fails.
    fn list_by_time_range(
        &self,
        limit: usize,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        exclusive: bool,
    ) -> Result<Vec<Arc<EventRecord>>> {
        self.scan(&ScanPlan::resolve(limit, from, to, exclusive, Utc::now()))
    }

    /// Raw payload text retained for a record, if retention is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::error::StoreError) if the underlying
    /// storage fails.
    fn original_payload(&self, id: &EventId) -> Result<Option<Arc<str>>>;

    /// Number of stored records.
    fn len(&self) -> usize;

    /// True if nothing has been stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One published version of the store's indexes.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    by_id: HashMap<EventId, Arc<EventRecord>>,
    by_time: OrdMap<TimeKey, Arc<EventRecord>>,
    payloads: HashMap<EventId, Arc<str>>,
}

/// Process-memory store with snapshot-isolated reads.
///
/// # Examples
///
/// ```rust
/// use chrono::Utc;
/// use traceview::config::TraceConfig;
/// use traceview::event::{EventRecord, DEFAULT_LEVEL};
/// use traceview::store::{InMemoryStore, TraceStore};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryStore::new(&TraceConfig::default());
/// let record = EventRecord::new(Utc::now(), "hello", DEFAULT_LEVEL, "");
/// let id = record.id();
/// store.insert(record, None)?;
///
/// assert_eq!(store.get_by_id(&id)?.map(|r| r.message().to_string()), Some("hello".into()));
/// assert_eq!(store.list_by_time_range(10, None, None, false)?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    keep_original_payload: bool,
    current: ArcSwap<Snapshot>,
    writer: Mutex<()>,
}

impl InMemoryStore {
    /// Creates an empty store. Only the retention flag of `config` is used.
    pub fn new(config: &TraceConfig) -> Self {
        Self {
            keep_original_payload: config.keep_original_payload,
            current: ArcSwap::from_pointee(Snapshot::default()),
            writer: Mutex::new(()),
        }
    }
}

impl TraceStore for InMemoryStore {
    fn insert(&self, record: EventRecord, original_payload: Option<&str>) -> Result<()> {
        let _writer = self.writer.lock();
        let mut next = Snapshot::clone(&self.current.load());

        let id = record.id();
        if let Some(previous) = next.by_id.get(&id).cloned() {
            debug!(%id, "overwriting record with duplicate id");
            next.by_time.remove(&(previous.timestamp(), id));
            next.payloads.remove(&id);
        }

        let record = Arc::new(record);
        next.by_time.insert((record.timestamp(), id), Arc::clone(&record));
        next.by_id.insert(id, record);

        if self.keep_original_payload
            && let Some(payload) = original_payload
        {
            next.payloads.insert(id, Arc::from(payload));
        }

        self.current.store(Arc::new(next));
        Ok(())
    }

    fn get_by_id(&self, id: &EventId) -> Result<Option<Arc<EventRecord>>> {
        Ok(self.current.load().by_id.get(id).cloned())
    }

    fn scan(&self, plan: &ScanPlan) -> Result<Vec<Arc<EventRecord>>> {
        if plan.is_empty_range() {
            return Ok(Vec::new());
        }

        let snapshot = self.current.load_full();
        let lower: TimeKey = (plan.from, EventId::min());
        let upper: TimeKey = (plan.to, EventId::max());
        let range = snapshot.by_time.range(lower..=upper);

        let records = match plan.direction {
            ScanDirection::Forward => range
                .filter(|((ts, _), _)| plan.admits(*ts))
                .take(plan.limit)
                .map(|(_, record)| Arc::clone(record))
                .collect(),
            ScanDirection::Reverse => {
                let mut newest_first: Vec<_> = range
                    .rev()
                    .filter(|((ts, _), _)| plan.admits(*ts))
                    .take(plan.limit)
                    .map(|(_, record)| Arc::clone(record))
                    .collect();
                newest_first.reverse();
                newest_first
            }
        };
        Ok(records)
    }

    fn original_payload(&self, id: &EventId) -> Result<Option<Arc<str>>> {
        Ok(self.current.load().payloads.get(id).cloned())
    }

    fn len(&self) -> usize {
        self.current.load().by_id.len()
    }
}
