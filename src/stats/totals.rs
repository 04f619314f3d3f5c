//! Daily totals and period summaries over the reading ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    convert,
    core::store::ProgressStore,
    types::{BookId, Medium, PagesCenti, ReaderId},
};
use chrono::{Datelike, Days, Months, NaiveDate, Weekday};

/// Aggregated contributions of one reader on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayTotals {
    /// The day.
    pub date: NaiveDate,
    /// Total page-equivalents, in hundredths.
    pub pages_centi: PagesCenti,
    /// Paper contribution.
    pub paper_centi: PagesCenti,
    /// Ebook contribution.
    pub ebook_centi: PagesCenti,
    /// Audio contribution, in page-equivalents.
    pub audio_centi: PagesCenti,
    /// Listened seconds backing the audio contribution.
    pub audio_seconds: u64,
    /// Distinct books touched that day, sorted ascending.
    pub books: Vec<BookId>,
}

/// Calendar period resolved around an anchor date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    /// The anchor day itself.
    Day,
    /// ISO week (Monday through Sunday) containing the anchor.
    Week,
    /// Calendar month containing the anchor.
    Month,
    /// Calendar year containing the anchor.
    Year,
}

/// Rollup of one reader's activity over a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSummary {
    /// First day of the period.
    pub from: NaiveDate,
    /// Last day of the period.
    pub to: NaiveDate,
    /// Total page-equivalents, in hundredths.
    pub pages_centi: PagesCenti,
    /// Total listened seconds.
    pub audio_seconds: u64,
    /// Count of days with any contribution.
    pub reading_days: u64,
    /// Average pages per reading day, in hundredths, round-half-up.
    pub average_pages_centi: PagesCenti,
    /// Highest single-day total within the period, when any day had one.
    pub best_day: Option<(NaiveDate, PagesCenti)>,
}

/// Sums the reader's ledger per day over `from..=to`, per medium, with the
/// distinct books touched each day. Days without contributions are omitted.
pub fn daily_totals(
    store: &ProgressStore,
    reader: ReaderId,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<DayTotals> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();

    for entry in store.entries_for_reader(reader) {
        if entry.logged_on < from || entry.logged_on > to {
            continue;
        }
        let day = days.entry(entry.logged_on).or_insert_with(|| DayTotals {
            date: entry.logged_on,
            pages_centi: 0,
            paper_centi: 0,
            ebook_centi: 0,
            audio_centi: 0,
            audio_seconds: 0,
            books: Vec::new(),
        });
        day.pages_centi += entry.pages_centi;
        match entry.medium {
            Medium::Paper => day.paper_centi += entry.pages_centi,
            Medium::Ebook => day.ebook_centi += entry.pages_centi,
            Medium::Audio => day.audio_centi += entry.pages_centi,
        }
        day.audio_seconds += entry.audio_seconds.unwrap_or(0);
        if !day.books.contains(&entry.book_id) {
            day.books.push(entry.book_id);
        }
    }

    let mut out: Vec<DayTotals> = days.into_values().collect();
    for day in &mut out {
        day.books.sort_unstable();
    }
    out
}

/// Rolls the reader's ledger into a summary of the period around `anchor`.
///
/// The pages total over any range equals the sum of [`daily_totals`] over
/// the same range.
pub fn period_summary(
    store: &ProgressStore,
    reader: ReaderId,
    period: Period,
    anchor: NaiveDate,
) -> PeriodSummary {
    let (from, to) = period_bounds(period, anchor);
    let days = daily_totals(store, reader, from, to);

    let pages_centi: PagesCenti = days.iter().map(|d| d.pages_centi).sum();
    let audio_seconds: u64 = days.iter().map(|d| d.audio_seconds).sum();
    let reading_days = days.len() as u64;
    let best_day = days
        .iter()
        .max_by_key(|d| (d.pages_centi, std::cmp::Reverse(d.date)))
        .map(|d| (d.date, d.pages_centi));

    PeriodSummary {
        from,
        to,
        pages_centi,
        audio_seconds,
        reading_days,
        average_pages_centi: convert::average_centi(pages_centi, reading_days),
        best_day,
    }
}

/// First and last day of `period` around `anchor`.
pub fn period_bounds(period: Period, anchor: NaiveDate) -> (NaiveDate, NaiveDate) {
    match period {
        Period::Day => (anchor, anchor),
        Period::Week => {
            let week = anchor.week(Weekday::Mon);
            (week.first_day(), week.last_day())
        }
        Period::Month => {
            let first = anchor.with_day(1).unwrap_or(anchor);
            let last = first
                .checked_add_months(Months::new(1))
                .and_then(|d| d.checked_sub_days(Days::new(1)))
                .unwrap_or(anchor);
            (first, last)
        }
        Period::Year => {
            let first = NaiveDate::from_ymd_opt(anchor.year(), 1, 1).unwrap_or(anchor);
            let last = NaiveDate::from_ymd_opt(anchor.year(), 12, 31).unwrap_or(anchor);
            (first, last)
        }
    }
}
