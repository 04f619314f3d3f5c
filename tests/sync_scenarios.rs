use chrono::NaiveDate;

use readlog::{
    core::{store::ProgressStore, store::StoreError, sync::SyncStatus},
    progress::{MediumConfig, MediumState, ProgressInput},
    types::{Medium, ProgressKey, ProgressState},
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).expect("date")
}

#[test]
fn paper_reports_append_daily_deltas_and_advance_percent() {
    let mut store = ProgressStore::new();
    let key = ProgressKey::new(1, 10);

    let (r1, _) = store
        .report(key, Medium::Paper, ProgressInput::Page(50), day(1), Some(200))
        .expect("report day 1");
    assert_eq!(r1.status, SyncStatus::Advanced);
    assert_eq!(r1.snapshot.percent_centi, 2_500);
    assert_eq!(r1.entries_appended, 1);

    let (r2, _) = store
        .report(key, Medium::Paper, ProgressInput::Page(100), day(2), Some(200))
        .expect("report day 2");
    assert_eq!(r2.snapshot.percent_centi, 5_000);

    let ledger = store.ledger();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[0].pages_centi, 5_000);
    assert_eq!(ledger[0].logged_on, day(1));
    assert_eq!(ledger[0].medium, Medium::Paper);
    assert_eq!(ledger[0].audio_seconds, None);
    assert_eq!(ledger[1].pages_centi, 5_000);
    assert_eq!(ledger[1].logged_on, day(2));
}

#[test]
fn mark_finished_fills_remaining_pages_and_is_idempotent() {
    let mut store = ProgressStore::new();
    let key = ProgressKey::new(1, 10);

    store
        .report(key, Medium::Paper, ProgressInput::Page(100), day(1), Some(200))
        .expect("report");

    let (fin, _) = store.mark_finished(key, day(3), Some(200)).expect("finish");
    assert_eq!(fin.status, SyncStatus::Advanced);
    assert_eq!(fin.snapshot.percent_centi, 10_000);
    assert_eq!(fin.snapshot.state, ProgressState::Complete);
    assert_eq!(fin.snapshot.completed_on, Some(day(3)));
    assert_eq!(fin.entries_appended, 1);
    assert_eq!(store.ledger().last().expect("entry").pages_centi, 10_000);

    // Completed records ignore further reports and repeat completions.
    let (again, _) = store
        .report(key, Medium::Paper, ProgressInput::Page(120), day(4), Some(200))
        .expect("report after complete");
    assert_eq!(again.status, SyncStatus::AlreadyComplete);
    assert_eq!(again.entries_appended, 0);

    let (refin, _) = store.mark_finished(key, day(5), Some(200)).expect("refinish");
    assert_eq!(refin.status, SyncStatus::AlreadyComplete);
    assert_eq!(refin.snapshot.completed_on, Some(day(3)));
    assert_eq!(store.ledger().len(), 2);
}

#[test]
fn audio_position_and_wall_clock_listening_convert_to_page_equivalents() {
    let mut store = ProgressStore::new();
    let key = ProgressKey::new(1, 20);

    store
        .activate_medium(
            key,
            Medium::Audio,
            MediumConfig {
                audio_length_secs: Some(36_000),
                ..MediumConfig::default()
            },
            Some(300),
        )
        .expect("activate audio");

    // Halfway through a 10h audiobook of a 300-page book.
    let (r1, _) = store
        .report(
            key,
            Medium::Audio,
            ProgressInput::AudioPosition { seconds: 18_000 },
            day(1),
            Some(300),
        )
        .expect("position report");
    assert_eq!(r1.snapshot.percent_centi, 5_000);
    assert_eq!(store.ledger()[0].pages_centi, 15_000);
    assert_eq!(store.ledger()[0].audio_seconds, Some(18_000));

    // 2h of wall-clock listening at 1.5x advances the position by 3h.
    store.set_playback_speed(key, 150).expect("set speed");
    let (r2, _) = store
        .report(
            key,
            Medium::Audio,
            ProgressInput::AudioListened { seconds: 7_200 },
            day(2),
            Some(300),
        )
        .expect("listened report");
    assert_eq!(r2.snapshot.percent_centi, 8_000);
    assert_eq!(store.ledger()[1].pages_centi, 9_000);
    assert_eq!(store.ledger()[1].audio_seconds, Some(7_200));

    let rec = store.get(key).expect("record");
    assert_eq!(rec.medium_state(Medium::Audio).expect("audio").raw(), 28_800);
}

#[test]
fn unknown_total_records_position_only_until_override_is_set() {
    let mut store = ProgressStore::new();
    let key = ProgressKey::new(1, 30);

    let (r1, _) = store
        .report(key, Medium::Paper, ProgressInput::Page(30), day(1), None)
        .expect("report without total");
    assert_eq!(r1.status, SyncStatus::PositionOnly);
    assert_eq!(r1.entries_appended, 0);
    assert_eq!(r1.snapshot.percent_centi, 0);
    assert_eq!(r1.snapshot.current_page, None);
    assert_eq!(store.get(key).expect("record").medium_state(Medium::Paper).expect("paper").raw(), 30);

    store.set_custom_total_pages(key, 200).expect("set total");

    // No backfill: only the 30 -> 60 advance lands in the ledger.
    let (r2, _) = store
        .report(key, Medium::Paper, ProgressInput::Page(60), day(2), None)
        .expect("report with override");
    assert_eq!(r2.status, SyncStatus::Advanced);
    assert_eq!(r2.snapshot.percent_centi, 3_000);
    assert_eq!(store.ledger().len(), 1);
    assert_eq!(store.ledger()[0].pages_centi, 3_000);
    assert_eq!(store.ledger()[0].logged_on, day(2));
}

#[test]
fn late_total_clamps_positions_recorded_beyond_it() {
    let mut store = ProgressStore::new();
    let key = ProgressKey::new(1, 35);

    let (r, report_op) = store
        .report(key, Medium::Paper, ProgressInput::Page(300), day(1), None)
        .expect("report without total");
    assert_eq!(r.status, SyncStatus::PositionOnly);
    assert_eq!(store.get(key).expect("record").medium_state(Medium::Paper).expect("paper").raw(), 300);

    let (snap, set_op) = store.set_custom_total_pages(key, 200).expect("set total");
    let paper = snap
        .media
        .iter()
        .find(|m| m.medium() == Medium::Paper)
        .expect("paper state");
    assert_eq!(paper.raw(), 200);

    // Replay clamps the same way.
    let mut replayed = ProgressStore::new();
    replayed.apply_replayed_op(report_op).expect("replay report");
    replayed.apply_replayed_op(set_op).expect("replay set total");
    assert_eq!(replayed.export_snapshot(), store.export_snapshot());
}

#[test]
fn activating_an_ebook_projects_the_unified_percent_onto_it() {
    let mut store = ProgressStore::new();
    let key = ProgressKey::new(1, 40);

    store
        .report(key, Medium::Paper, ProgressInput::Page(100), day(1), Some(200))
        .expect("paper report");

    let (snap, _) = store
        .activate_medium(
            key,
            Medium::Ebook,
            MediumConfig {
                total_pages_override: Some(400),
                ..MediumConfig::default()
            },
            Some(200),
        )
        .expect("activate ebook");

    // 50% of a 400-page edition.
    let ebook = snap
        .media
        .iter()
        .find(|m| m.medium() == Medium::Ebook)
        .expect("ebook state");
    assert_eq!(ebook.raw(), 200);

    assert!(matches!(
        store.activate_medium(key, Medium::Ebook, MediumConfig::default(), Some(200)),
        Err(StoreError::MediumAlreadyActive(Medium::Ebook))
    ));

    // An ebook advance flows back onto the paper position.
    let (r, _) = store
        .report(key, Medium::Ebook, ProgressInput::Page(250), day(2), Some(200))
        .expect("ebook report");
    assert_eq!(r.snapshot.percent_centi, 6_250);
    assert_eq!(store.ledger().last().expect("entry").pages_centi, 2_500);

    let rec = store.get(key).expect("record");
    assert_eq!(rec.medium_state(Medium::Paper).expect("paper").raw(), 125);
}

#[test]
fn page_input_beyond_total_clamps_without_completing() {
    let mut store = ProgressStore::new();
    let key = ProgressKey::new(1, 50);

    let (r, _) = store
        .report(key, Medium::Paper, ProgressInput::Page(500), day(1), Some(200))
        .expect("report");
    assert_eq!(r.snapshot.percent_centi, 10_000);
    assert_eq!(r.snapshot.state, ProgressState::InProgress);
    assert_eq!(store.get(key).expect("record").medium_state(Medium::Paper).expect("paper").raw(), 200);

    // Completion still requires the explicit finish; no pages remain to fill.
    let (fin, _) = store.mark_finished(key, day(2), Some(200)).expect("finish");
    assert_eq!(fin.snapshot.state, ProgressState::Complete);
    assert_eq!(fin.entries_appended, 0);
}

#[test]
fn downward_corrections_keep_percent_and_ledger_history() {
    let mut store = ProgressStore::new();
    let key = ProgressKey::new(1, 60);

    store
        .report(key, Medium::Paper, ProgressInput::Page(100), day(1), Some(200))
        .expect("report");

    let (corrected, _) = store
        .report(key, Medium::Paper, ProgressInput::Page(80), day(1), Some(200))
        .expect("correction");
    assert_eq!(corrected.status, SyncStatus::NoChange);
    assert_eq!(corrected.entries_appended, 0);
    assert_eq!(corrected.snapshot.percent_centi, 5_000);
    assert_eq!(store.get(key).expect("record").medium_state(Medium::Paper).expect("paper").raw(), 80);

    // Re-reading the corrected stretch earns credit again, but the unified
    // percent stays at its high-water mark.
    let (rr, _) = store
        .report(key, Medium::Paper, ProgressInput::Page(90), day(2), Some(200))
        .expect("re-read");
    assert_eq!(rr.status, SyncStatus::Advanced);
    assert_eq!(rr.snapshot.percent_centi, 5_000);
    assert_eq!(store.ledger().last().expect("entry").pages_centi, 1_000);
}

#[test]
fn deactivation_rules_and_input_validation() {
    let mut store = ProgressStore::new();
    let key = ProgressKey::new(1, 70);

    store
        .report(key, Medium::Paper, ProgressInput::Page(10), day(1), Some(200))
        .expect("report");

    assert!(matches!(
        store.deactivate_medium(key, Medium::Paper),
        Err(StoreError::LastActiveMedium(Medium::Paper))
    ));
    assert!(matches!(
        store.deactivate_medium(key, Medium::Audio),
        Err(StoreError::MediumNotActive(Medium::Audio))
    ));

    store
        .activate_medium(
            key,
            Medium::Audio,
            MediumConfig {
                audio_length_secs: Some(3_600),
                ..MediumConfig::default()
            },
            Some(200),
        )
        .expect("activate audio");
    let (snap, _) = store.deactivate_medium(key, Medium::Paper).expect("deactivate");
    assert_eq!(snap.media.len(), 1);
    assert!(matches!(snap.media[0], MediumState::Audio { .. }));

    // The deactivated medium's history stays in the ledger.
    assert_eq!(store.entries_for_reader(1).len(), 1);
    assert_eq!(store.entries_for_reader(1)[0].medium, Medium::Paper);

    assert!(matches!(
        store.report(key, Medium::Audio, ProgressInput::Page(5), day(2), Some(200)),
        Err(StoreError::InvalidRawValue { .. })
    ));
    assert!(matches!(
        store.set_playback_speed(key, 400),
        Err(StoreError::InvalidPlaybackSpeed(400))
    ));
    assert!(matches!(
        store.set_playback_speed(key, 25),
        Err(StoreError::InvalidPlaybackSpeed(25))
    ));
}

#[test]
fn rejected_first_report_leaves_no_record_behind() {
    let mut store = ProgressStore::new();
    let key = ProgressKey::new(2, 80);

    assert!(matches!(
        store.report(
            key,
            Medium::Paper,
            ProgressInput::AudioListened { seconds: 60 },
            day(1),
            Some(200),
        ),
        Err(StoreError::InvalidRawValue { .. })
    ));
    assert!(store.get(key).is_none());
    assert_eq!(store.latest_op_seq(), 0);
}

#[test]
fn mark_finished_requires_an_existing_record() {
    let mut store = ProgressStore::new();
    let key = ProgressKey::new(3, 90);
    assert!(matches!(
        store.mark_finished(key, day(1), Some(200)),
        Err(StoreError::MissingProgress(_))
    ));
}

#[test]
fn contexts_isolate_concurrent_read_throughs() {
    let mut store = ProgressStore::new();
    let plain = ProgressKey::new(4, 10);
    let event = ProgressKey::with_context(4, 10, 77);

    store
        .report(plain, Medium::Paper, ProgressInput::Page(150), day(1), Some(200))
        .expect("plain report");
    store
        .report(event, Medium::Paper, ProgressInput::Page(20), day(1), Some(200))
        .expect("event report");

    assert_eq!(store.get(plain).expect("plain").percent_centi, 7_500);
    assert_eq!(store.get(event).expect("event").percent_centi, 1_000);
    assert_eq!(store.records_for_reader(4).len(), 2);
}
