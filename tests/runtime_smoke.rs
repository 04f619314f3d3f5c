use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::NaiveDate;

use readlog::{
    catalog::StaticCatalog,
    core::store::ProgressStore,
    ledger::StoredOp,
    persist::{LedgerSink, PersistError, PersistResult},
    progress::ProgressInput,
    runtime::{
        events::ProgressEvent,
        handle::{RuntimeConfig, RuntimeError, spawn_readlog},
    },
    types::{Medium, OpSeq, ProgressKey},
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).expect("date")
}

fn catalog() -> StaticCatalog {
    let mut catalog = StaticCatalog::new();
    catalog.set(42, 200);
    catalog
}

struct SlowSink {
    seen: Arc<Mutex<Vec<OpSeq>>>,
    delay: Duration,
}

impl LedgerSink for SlowSink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        std::thread::sleep(self.delay);
        let mut seen = self.seen.lock().expect("lock");
        for op in ops {
            seen.push(op.seq);
        }
        Ok(ops.last().map(|o| o.seq).unwrap_or(0))
    }
}

struct FailingSink;

impl LedgerSink for FailingSink {
    fn append_ops(&mut self, _ops: &[StoredOp]) -> PersistResult<OpSeq> {
        Err(PersistError::Message("disk full".to_string()))
    }
}

#[tokio::test]
async fn sink_failures_surface_their_original_message() {
    let cfg = RuntimeConfig {
        flush_on_report: false,
        batch_max_latency_ms: 10_000,
        ..RuntimeConfig::default()
    };
    let handle = spawn_readlog(
        ProgressStore::new(),
        Some(Box::new(catalog())),
        Some(Box::new(FailingSink)),
        cfg,
    );
    let key = ProgressKey::new(7, 42);

    handle
        .report(key, Medium::Paper, ProgressInput::Page(10), day(1))
        .await
        .expect("report accepted before flush");

    let err = handle.flush().await.expect_err("flush fails");
    assert_eq!(err.to_string(), "disk full");

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn runtime_report_finish_query_and_events_ordered() {
    let handle = spawn_readlog(
        ProgressStore::new(),
        Some(Box::new(catalog())),
        None,
        RuntimeConfig::default(),
    );
    let mut sub = handle.subscribe();
    let key = ProgressKey::new(7, 42);

    let result = handle
        .report(key, Medium::Paper, ProgressInput::Page(50), day(1))
        .await
        .expect("report");
    assert_eq!(result.snapshot.percent_centi, 2_500);

    let snap = handle.get_progress(key).await.expect("query").expect("record");
    assert_eq!(snap.current_page, Some(50));

    handle.mark_finished(key, day(2)).await.expect("finish");

    let days = handle.daily_totals(7, day(1), day(2)).await.expect("totals");
    assert_eq!(days.len(), 2);
    assert_eq!(days[0].pages_centi, 5_000);
    assert_eq!(days[1].pages_centi, 15_000);

    let mut seen = Vec::new();
    for _ in 0..6 {
        let evt = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("event")
            .expect("recv");
        if !matches!(evt, ProgressEvent::DurableUpTo { .. }) {
            seen.push(evt);
        }
        if seen.len() == 2 {
            break;
        }
    }

    assert!(matches!(
        seen[0],
        ProgressEvent::Advanced {
            reader_id: 7,
            book_id: 42,
            percent_centi: 2_500,
            ..
        }
    ));
    assert!(matches!(
        seen[1],
        ProgressEvent::Completed {
            reader_id: 7,
            book_id: 42,
            ..
        }
    ));

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn durable_event_advances_and_slow_sink_surfaces_queue_pressure() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = SlowSink {
        seen: Arc::clone(&seen),
        delay: Duration::from_millis(250),
    };

    let cfg = RuntimeConfig {
        flush_on_report: true,
        batch_max_ops: 16,
        batch_max_latency_ms: 500,
        persist_queue_bound: 1,
        snapshot_every_ops: 0,
        compact_after_snapshot: false,
    };

    let handle = spawn_readlog(ProgressStore::new(), Some(Box::new(catalog())), Some(Box::new(sink)), cfg);
    let mut sub = handle.subscribe();
    let key = ProgressKey::new(7, 42);

    handle
        .report(key, Medium::Paper, ProgressInput::Page(10), day(1))
        .await
        .expect("report");

    let mut durable_seen = false;
    for _ in 0..5 {
        let evt = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("recv timeout")
            .expect("recv");
        if matches!(evt, ProgressEvent::DurableUpTo { .. }) {
            durable_seen = true;
            break;
        }
    }
    assert!(durable_seen, "expected DurableUpTo event");

    let mut queue_error_seen = false;
    for i in 0..12u32 {
        let r = handle
            .report(key, Medium::Paper, ProgressInput::Page(20 + i), day(2))
            .await;
        if let Err(RuntimeError::Persist(_)) = r {
            queue_error_seen = true;
            break;
        }
    }
    assert!(
        queue_error_seen,
        "expected persistence queue pressure to surface as error"
    );

    handle.shutdown().await.expect("shutdown");
    assert!(!seen.lock().expect("lock").is_empty());
}
