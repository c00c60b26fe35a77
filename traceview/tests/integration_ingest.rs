//! Integration tests for the ingestion pipeline.
//!
//! Payloads go through the bounded queue, the worker pool, the parser and
//! the store. Bad payloads and failing inserts must be counted and skipped
//! without stopping the pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use traceview::error::{Result, StoreError};
use traceview::event::{EventId, EventRecord};
use traceview::ingest::{self, IngestCounts};
use traceview::query::ScanPlan;
use traceview::{InMemoryStore, PayloadParser, PipelineConfig, TraceConfig, TraceStore};

/// Store that fails every other insert.
#[derive(Default)]
struct FlakyStore {
    inner: Option<InMemoryStore>,
    calls: AtomicUsize,
}

impl TraceStore for FlakyStore {
    fn insert(&self, record: EventRecord, original_payload: Option<&str>) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
            return Err(StoreError::Storage {
                reason: "simulated failure".to_string(),
            }
            .into());
        }
        match &self.inner {
            Some(inner) => inner.insert(record, original_payload),
            None => Ok(()),
        }
    }

    fn get_by_id(&self, id: &EventId) -> Result<Option<Arc<EventRecord>>> {
        match &self.inner {
            Some(inner) => inner.get_by_id(id),
            None => Ok(None),
        }
    }

    fn scan(&self, plan: &ScanPlan) -> Result<Vec<Arc<EventRecord>>> {
        match &self.inner {
            Some(inner) => inner.scan(plan),
            None => Ok(Vec::new()),
        }
    }

    fn original_payload(&self, id: &EventId) -> Result<Option<Arc<str>>> {
        match &self.inner {
            Some(inner) => inner.original_payload(id),
            None => Ok(None),
        }
    }

    fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, InMemoryStore::len)
    }
}

#[tokio::test]
async fn test_end_to_end_with_retained_payloads() {
    let config = TraceConfig {
        keep_original_payload: true,
        correlation_id_fields: vec!["rid".to_string()],
        ..TraceConfig::default()
    };
    let parser = Arc::new(PayloadParser::new(config.clone()));
    let store = Arc::new(InMemoryStore::new(&config));
    let (handle, pipeline) = ingest::spawn(parser, store.clone(), PipelineConfig::default());

    let raw = r#"{"@t":"2016-11-21T11:22:33Z","@m":"hello","rid":"r-9","bar":2}"#;
    handle.submit(raw.to_string()).await.unwrap();
    handle.submit("plain line".to_string()).await.unwrap();
    drop(handle);

    let counts = pipeline.join().await;
    assert_eq!(
        counts,
        IngestCounts {
            received: 2,
            stored: 2,
            rejected: 0,
            store_failed: 0,
        }
    );

    let records = store.list_by_time_range(10, None, None, false).unwrap();
    assert_eq!(records.len(), 2);
    let hello = records.iter().find(|r| r.message() == "hello").unwrap();
    assert_eq!(hello.correlation_id(), "r-9");
    assert_eq!(
        store.original_payload(&hello.id()).unwrap().as_deref(),
        Some(raw)
    );
}

#[tokio::test]
async fn test_bad_payloads_do_not_poison_the_queue() {
    let parser = Arc::new(PayloadParser::new(TraceConfig {
        message_fields: vec!["msg".to_string()],
        ..TraceConfig::default()
    }));
    let store = Arc::new(InMemoryStore::new(&TraceConfig::default()));
    let (handle, pipeline) = ingest::spawn(parser, store.clone(), PipelineConfig::new(4, 2));

    let payloads = [
        r#"{"msg":"one"}"#,
        "{oops",
        r#"{"text":"no configured message"}"#,
        "",
        r#"{"msg":"two"}"#,
        "three",
    ];
    for payload in payloads {
        handle.submit(payload.to_string()).await.unwrap();
    }
    drop(handle);

    let counts = pipeline.join().await;
    assert_eq!(counts.received, 6);
    assert_eq!(counts.rejected, 3);
    assert_eq!(counts.stored, 3);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_insert_failures_are_counted_and_skipped() {
    let store = Arc::new(FlakyStore {
        inner: Some(InMemoryStore::new(&TraceConfig::default())),
        ..FlakyStore::default()
    });
    let (handle, pipeline) = ingest::spawn(
        Arc::new(PayloadParser::default()),
        store.clone(),
        PipelineConfig::new(16, 1),
    );

    for i in 0..10 {
        handle.submit(format!("line {i}")).await.unwrap();
    }
    drop(handle);

    let counts = pipeline.join().await;
    assert_eq!(counts.stored, 5);
    assert_eq!(counts.store_failed, 5);
    assert_eq!(store.len(), 5);
}

#[tokio::test]
async fn test_backpressure_never_drops() {
    let store = Arc::new(InMemoryStore::new(&TraceConfig::default()));
    let (handle, pipeline) = ingest::spawn(
        Arc::new(PayloadParser::default()),
        store.clone(),
        PipelineConfig::new(1, 1),
    );

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let handle = handle.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    handle.submit(format!("p{p} m{i}")).await.unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }
    drop(handle);

    let counts = pipeline.join().await;
    assert_eq!(counts.received, 200);
    assert_eq!(counts.stored, 200);
    assert_eq!(store.len(), 200);
}
