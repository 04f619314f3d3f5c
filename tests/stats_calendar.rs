use chrono::NaiveDate;

use readlog::{
    core::store::ProgressStore,
    progress::{MediumConfig, ProgressInput},
    stats::{self, Period},
    types::{Medium, ProgressKey},
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).expect("date")
}

/// Reader 1: a 200-page paper book finished on Mar 4, plus half an hour of a
/// 300-page audiobook on Mar 2.
fn seeded_store() -> ProgressStore {
    let mut store = ProgressStore::new();
    let paper = ProgressKey::new(1, 10);
    let audio = ProgressKey::new(1, 20);

    store
        .report(paper, Medium::Paper, ProgressInput::Page(50), day(1), Some(200))
        .expect("paper day 1");
    store
        .report(paper, Medium::Paper, ProgressInput::Page(100), day(2), Some(200))
        .expect("paper day 2");
    store.mark_finished(paper, day(4), Some(200)).expect("finish");

    store
        .activate_medium(
            audio,
            Medium::Audio,
            MediumConfig {
                audio_length_secs: Some(3_600),
                ..MediumConfig::default()
            },
            Some(300),
        )
        .expect("activate audio");
    store
        .report(
            audio,
            Medium::Audio,
            ProgressInput::AudioPosition { seconds: 1_800 },
            day(2),
            Some(300),
        )
        .expect("audio day 2");

    store
}

#[test]
fn daily_totals_split_by_medium_and_list_books() {
    let store = seeded_store();
    let days = stats::daily_totals(&store, 1, day(1), day(31));

    assert_eq!(days.len(), 3);

    assert_eq!(days[0].date, day(1));
    assert_eq!(days[0].pages_centi, 5_000);
    assert_eq!(days[0].paper_centi, 5_000);
    assert_eq!(days[0].books, vec![10]);

    assert_eq!(days[1].date, day(2));
    assert_eq!(days[1].pages_centi, 20_000);
    assert_eq!(days[1].paper_centi, 5_000);
    assert_eq!(days[1].audio_centi, 15_000);
    assert_eq!(days[1].audio_seconds, 1_800);
    assert_eq!(days[1].books, vec![10, 20]);

    assert_eq!(days[2].date, day(4));
    assert_eq!(days[2].pages_centi, 10_000);
    assert_eq!(days[2].audio_seconds, 0);
}

#[test]
fn period_summaries_roll_up_daily_totals() {
    let store = seeded_store();

    let month = stats::period_summary(&store, 1, Period::Month, day(15));
    assert_eq!(month.from, day(1));
    assert_eq!(month.to, day(31));
    assert_eq!(month.pages_centi, 35_000);
    assert_eq!(month.audio_seconds, 1_800);
    assert_eq!(month.reading_days, 3);
    assert_eq!(month.average_pages_centi, 11_667);
    assert_eq!(month.best_day, Some((day(2), 20_000)));

    let single = stats::period_summary(&store, 1, Period::Day, day(2));
    assert_eq!(single.pages_centi, 20_000);
    assert_eq!(single.reading_days, 1);

    // ISO week containing Wed Mar 6 runs Mar 4 through Mar 10.
    let week = stats::period_summary(&store, 1, Period::Week, day(6));
    assert_eq!(week.from, day(4));
    assert_eq!(week.to, day(10));
    assert_eq!(week.pages_centi, 10_000);
    assert_eq!(week.reading_days, 1);

    let year = stats::period_summary(&store, 1, Period::Year, day(15));
    assert_eq!(year.pages_centi, 35_000);

    // Readers without activity roll up to zeros.
    let quiet = stats::period_summary(&store, 99, Period::Month, day(15));
    assert_eq!(quiet.pages_centi, 0);
    assert_eq!(quiet.reading_days, 0);
    assert_eq!(quiet.average_pages_centi, 0);
    assert_eq!(quiet.best_day, None);
}

#[test]
fn calendar_yields_one_cell_per_day_with_completions() {
    let store = seeded_store();
    let cells = stats::calendar(&store, 1, 2024, 3).expect("march");

    assert_eq!(cells.len(), 31);
    assert_eq!(cells[0].date, day(1));
    assert_eq!(cells[0].pages_centi, 5_000);
    assert!(!cells[0].completed());

    assert_eq!(cells[1].pages_centi, 20_000);
    assert_eq!(cells[1].audio_minutes, 30);
    assert_eq!(cells[1].books, vec![10, 20]);

    assert_eq!(cells[3].date, day(4));
    assert_eq!(cells[3].completed_books, vec![10]);
    assert!(cells[3].completed());

    // Quiet days carry zeros, not gaps.
    assert_eq!(cells[10].pages_centi, 0);
    assert!(cells[10].books.is_empty());

    assert!(stats::calendar(&store, 1, 2024, 13).is_none());
}

#[test]
fn streaks_track_longest_runs_and_gaps() {
    let store = seeded_store();

    let s = stats::streaks(&store, 1, day(1), day(7));
    assert_eq!(s.longest_streak, 2);
    assert_eq!(s.longest_gap, 3);

    let empty = stats::streaks(&store, 99, day(1), day(7));
    assert_eq!(empty.longest_streak, 0);
    assert_eq!(empty.longest_gap, 7);

    let inverted = stats::streaks(&store, 1, day(7), day(1));
    assert_eq!(inverted.longest_streak, 0);
    assert_eq!(inverted.longest_gap, 0);
}
