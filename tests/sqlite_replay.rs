use chrono::NaiveDate;
use tempfile::TempDir;

use readlog::{
    core::store::ProgressStore,
    persist::{LedgerSink, sqlite::SqliteLedgerSink},
    progress::{MediumConfig, ProgressInput},
    types::{Medium, ProgressKey},
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).expect("date")
}

#[test]
fn sqlite_replay_round_trips_state_and_ledger() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("ops.db");

    let mut store = ProgressStore::new();
    let mut sink = SqliteLedgerSink::open(&db_path).expect("open sqlite");

    let paper = ProgressKey::new(1, 10);
    let audio = ProgressKey::new(1, 20);

    store
        .report(paper, Medium::Paper, ProgressInput::Page(50), day(1), Some(200))
        .expect("report");
    store
        .activate_medium(
            audio,
            Medium::Audio,
            MediumConfig {
                audio_length_secs: Some(36_000),
                ..MediumConfig::default()
            },
            Some(300),
        )
        .expect("activate");
    store.set_playback_speed(audio, 150).expect("speed");
    store
        .report(
            audio,
            Medium::Audio,
            ProgressInput::AudioListened { seconds: 7_200 },
            day(2),
            Some(300),
        )
        .expect("listen");
    store.mark_finished(paper, day(3), Some(200)).expect("finish");

    sink.append_ops(&store.drain_pending_ops()).expect("append");

    drop(sink);

    let reopened = SqliteLedgerSink::open(&db_path).expect("reopen");
    let replayed = reopened.load_store().expect("replay");

    assert_eq!(replayed.export_snapshot(), store.export_snapshot());
    assert_eq!(replayed.ledger().len(), store.ledger().len());
}

#[test]
fn snapshot_and_compaction_preserve_replay() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("snap.db");

    let mut store = ProgressStore::new();
    let mut sink = SqliteLedgerSink::open(&db_path).expect("open sqlite");

    let key = ProgressKey::new(7, 1);
    for i in 1..=10u32 {
        store
            .report(key, Medium::Paper, ProgressInput::Page(i * 10), day(i), Some(200))
            .expect("report");
    }
    sink.append_ops(&store.drain_pending_ops()).expect("append");

    let snapshot = store.export_snapshot();
    let last_seq = store.latest_op_seq();
    sink.write_snapshot(&snapshot, last_seq).expect("snapshot");
    let removed = sink.compact_through(last_seq).expect("compact");
    assert_eq!(removed, 10);

    // Ops journaled after the snapshot replay as the tail.
    store
        .report(key, Medium::Paper, ProgressInput::Page(150), day(11), Some(200))
        .expect("tail report");
    sink.append_ops(&store.drain_pending_ops()).expect("append tail");

    drop(sink);

    let reopened = SqliteLedgerSink::open(&db_path).expect("reopen");
    assert_eq!(reopened.latest_seq().expect("latest"), 11);
    let replayed = reopened.load_store().expect("replay");

    assert_eq!(replayed.export_snapshot(), store.export_snapshot());
    assert_eq!(
        replayed.get(key).expect("record").percent_centi,
        store.get(key).expect("record").percent_centi,
    );
}
