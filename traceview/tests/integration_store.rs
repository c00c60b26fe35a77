//! Integration tests for the time-indexed store.
//!
//! Exercises range scans in both directions, bound defaulting, the hard
//! cap, and snapshot consistency while a writer runs concurrently with
//! readers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use traceview::error::{Result, StoreError};
use traceview::event::{DEFAULT_LEVEL, EventId, EventRecord};
use traceview::query::{HARD_CAP, ScanPlan};
use traceview::{InMemoryStore, TraceConfig, TraceStore, TraceviewError};

fn store() -> InMemoryStore {
    InMemoryStore::new(&TraceConfig::default())
}

fn at(ts: DateTime<Utc>, message: &str) -> EventRecord {
    EventRecord::new(ts, message, DEFAULT_LEVEL, "")
}

fn assert_ascending(records: &[Arc<EventRecord>]) {
    for pair in records.windows(2) {
        assert!(pair[0].timestamp() <= pair[1].timestamp(), "records out of order");
    }
}

#[test]
fn test_bounded_range_returns_requested_count_ascending() {
    let store = store();
    let a = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let b = a + Duration::hours(10);

    // Insert out of order so the index, not insertion order, drives results.
    for i in (0..100).rev() {
        store.insert(at(a + Duration::minutes(i * 6), "inside"), None).unwrap();
    }
    store.insert(at(a - Duration::seconds(1), "before"), None).unwrap();
    store.insert(at(b + Duration::seconds(1), "after"), None).unwrap();

    let records = store.list_by_time_range(42, Some(a), Some(b), false).unwrap();
    assert_eq!(records.len(), 42);
    assert_ascending(&records);
    for record in &records {
        assert!(record.timestamp() >= a && record.timestamp() <= b);
        assert_eq!(record.message(), "inside");
    }
    assert_eq!(records[0].timestamp(), a);
}

#[test]
fn test_reverse_query_ends_at_boundary_record() {
    let store = store();
    let x = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

    for i in 1..=60 {
        store.insert(at(x - Duration::minutes(i), "older"), None).unwrap();
    }
    store.insert(at(x, "boundary"), None).unwrap();
    store.insert(at(x + Duration::hours(2), "later"), None).unwrap();

    let records = store
        .list_by_time_range(42, None, Some(x + Duration::hours(1)), false)
        .unwrap();

    assert_eq!(records.len(), 42);
    assert_ascending(&records);
    assert_eq!(records.last().map(|r| r.message()), Some("boundary"));
    assert_eq!(records[0].timestamp(), x - Duration::minutes(41));
}

#[test]
fn test_reverse_query_exclusive_upper_bound() {
    let store = store();
    let x = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    store.insert(at(x - Duration::minutes(1), "older"), None).unwrap();
    store.insert(at(x, "boundary"), None).unwrap();

    let records = store.list_by_time_range(10, None, Some(x), true).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message(), "older");

    let records = store.list_by_time_range(10, None, Some(x), false).unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn test_reverse_exclusive_keeps_earliest_representable_record() {
    let store = store();
    let x = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    store.insert(at(DateTime::<Utc>::MIN_UTC, "min"), None).unwrap();
    store.insert(at(x, "x"), None).unwrap();

    let records = store
        .list_by_time_range(10, None, Some(x + Duration::hours(1)), true)
        .unwrap();
    let messages: Vec<_> = records.iter().map(|r| r.message()).collect();
    assert_eq!(messages, vec!["min", "x"]);
}

#[test]
fn test_from_only_scans_up_to_now() {
    let store = store();
    let now = Utc::now();
    store.insert(at(now - Duration::hours(2), "past"), None).unwrap();
    store.insert(at(now + Duration::days(1), "future"), None).unwrap();

    let records = store
        .list_by_time_range(10, Some(now - Duration::hours(3)), None, false)
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message(), "past");
}

#[test]
fn test_no_bounds_scans_epoch_to_now() {
    let store = store();
    let now = Utc::now();
    store.insert(at(DateTime::UNIX_EPOCH, "epoch"), None).unwrap();
    store.insert(at(DateTime::UNIX_EPOCH - Duration::days(1), "pre-epoch"), None).unwrap();
    store.insert(at(now - Duration::minutes(1), "recent"), None).unwrap();
    store.insert(at(now + Duration::days(1), "future"), None).unwrap();

    let records = store.list_by_time_range(10, None, None, false).unwrap();
    let messages: Vec<_> = records.iter().map(|r| r.message()).collect();
    assert_eq!(messages, vec!["epoch", "recent"]);
}

#[test]
fn test_bound_defaults_do_not_interact() {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let from = now - Duration::hours(5);

    let plan = ScanPlan::resolve(10, Some(from), None, false, now);
    assert_eq!(plan.from, from, "defaulting `to` must leave `from` untouched");
    assert_eq!(plan.to, now);

    let plan = ScanPlan::resolve(10, None, None, false, now);
    assert_eq!(plan.from, DateTime::<Utc>::UNIX_EPOCH);
    assert_eq!(plan.to, now);
}

#[test]
fn test_hard_cap_applies_to_large_limits() {
    let store = store();
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    for i in 0..250 {
        store.insert(at(base + Duration::seconds(i), "x"), None).unwrap();
    }

    let records = store
        .list_by_time_range(usize::MAX, Some(base), Some(base + Duration::hours(1)), false)
        .unwrap();
    assert_eq!(records.len(), HARD_CAP);
    assert_eq!(records[0].timestamp(), base);

    let records = store
        .list_by_time_range(1000, None, Some(base + Duration::hours(1)), false)
        .unwrap();
    assert_eq!(records.len(), HARD_CAP);
    assert_eq!(records.last().map(|r| r.timestamp()), Some(base + Duration::seconds(249)));
}

/// Store whose scans fail, relying on the provided `list_by_time_range`.
struct UnavailableStore;

impl TraceStore for UnavailableStore {
    fn insert(&self, _record: EventRecord, _original_payload: Option<&str>) -> Result<()> {
        Ok(())
    }

    fn get_by_id(&self, _id: &EventId) -> Result<Option<Arc<EventRecord>>> {
        Err(StoreError::Storage {
            reason: "lookup failed".to_string(),
        }
        .into())
    }

    fn scan(&self, _plan: &ScanPlan) -> Result<Vec<Arc<EventRecord>>> {
        Err(StoreError::Storage {
            reason: "scan failed".to_string(),
        }
        .into())
    }

    fn original_payload(&self, _id: &EventId) -> Result<Option<Arc<str>>> {
        Ok(None)
    }

    fn len(&self) -> usize {
        0
    }
}

#[test]
fn test_storage_failures_reach_the_caller() {
    let store = UnavailableStore;

    let err = store.list_by_time_range(10, None, None, false).unwrap_err();
    assert!(matches!(err, TraceviewError::Store(StoreError::Storage { .. })));
    assert!(err.to_string().contains("scan failed"));

    let err = store.get_by_id(&EventId::new()).unwrap_err();
    assert!(matches!(err, TraceviewError::Store(StoreError::Storage { .. })));
}

#[test]
fn test_not_found_is_not_an_error() {
    let store = store();
    store.insert(at(Utc::now(), "x"), None).unwrap();
    assert!(store.get_by_id(&EventId::new()).unwrap().is_none());
    assert!(store.original_payload(&EventId::new()).unwrap().is_none());
}

#[test]
fn test_concurrent_readers_see_whole_inserts() {
    let store = Arc::new(store());
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..2000 {
                let record = at(base + Duration::milliseconds(i), "w");
                let id = record.id();
                store.insert(record, None).unwrap();
                assert!(store.get_by_id(&id).unwrap().is_some());
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let to = base + Duration::hours(1);
                let mut last_len = 0;
                while !done.load(Ordering::SeqCst) {
                    let records = store.list_by_time_range(100, None, Some(to), false).unwrap();
                    assert_ascending(&records);
                    for record in &records {
                        // Anything visible in the time index is visible by id.
                        assert!(store.get_by_id(&record.id()).unwrap().is_some());
                    }
                    let len = store.len();
                    assert!(len >= last_len, "store shrank from {last_len} to {len}");
                    last_len = len;
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(store.len(), 2000);
}
