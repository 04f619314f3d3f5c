//! Monthly calendar cells and reading streak queries.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    convert,
    core::store::ProgressStore,
    types::{BookId, PagesCenti, ReaderId},
};
use chrono::{Days, Months, NaiveDate};

use super::totals::daily_totals;

/// One cell of the monthly reading calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDay {
    /// The day.
    pub date: NaiveDate,
    /// Total page-equivalents read, in hundredths.
    pub pages_centi: PagesCenti,
    /// Listened audio, in whole minutes rounded up.
    pub audio_minutes: u64,
    /// Distinct books touched, sorted ascending.
    pub books: Vec<BookId>,
    /// Books whose read-through completed on this day, sorted ascending.
    pub completed_books: Vec<BookId>,
}

impl CalendarDay {
    /// True when any book finished this day.
    pub fn completed(&self) -> bool {
        !self.completed_books.is_empty()
    }
}

/// Longest runs of reading and non-reading days within a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreakSummary {
    /// Longest consecutive run of days with any contribution.
    pub longest_streak: u64,
    /// Longest consecutive run of days with none.
    pub longest_gap: u64,
}

/// Builds one cell per day of `month` in `year` for `reader`.
///
/// Returns `None` for an invalid year/month combination. Every day of the
/// month gets a cell; quiet days carry zeros and empty book lists.
pub fn calendar(
    store: &ProgressStore,
    reader: ReaderId,
    year: i32,
    month: u32,
) -> Option<Vec<CalendarDay>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first
        .checked_add_months(Months::new(1))?
        .checked_sub_days(Days::new(1))?;

    let days = daily_totals(store, reader, first, last);
    let mut completions: Vec<(NaiveDate, BookId)> = store
        .records_for_reader(reader)
        .iter()
        .filter_map(|rec| rec.completed_on.map(|d| (d, rec.book_id)))
        .filter(|(d, _)| *d >= first && *d <= last)
        .collect();
    completions.sort_unstable();

    let mut cells = Vec::with_capacity(31);
    let mut date = first;
    while date <= last {
        let totals = days.iter().find(|d| d.date == date);
        let completed_books: Vec<BookId> = completions
            .iter()
            .filter(|(d, _)| *d == date)
            .map(|(_, b)| *b)
            .collect();
        cells.push(CalendarDay {
            date,
            pages_centi: totals.map_or(0, |d| d.pages_centi),
            audio_minutes: totals.map_or(0, |d| convert::audio_minutes(d.audio_seconds)),
            books: totals.map_or_else(Vec::new, |d| d.books.clone()),
            completed_books,
        });
        date = date.checked_add_days(Days::new(1))?;
    }
    Some(cells)
}

/// Longest streak and longest gap for `reader` over `from..=to`.
pub fn streaks(
    store: &ProgressStore,
    reader: ReaderId,
    from: NaiveDate,
    to: NaiveDate,
) -> StreakSummary {
    if from > to {
        return StreakSummary::default();
    }

    let active: BTreeSet<NaiveDate> = store
        .entries_for_reader(reader)
        .iter()
        .map(|e| e.logged_on)
        .filter(|d| *d >= from && *d <= to)
        .collect();

    let mut summary = StreakSummary::default();
    let mut streak = 0u64;
    let mut gap = 0u64;
    let mut date = from;
    loop {
        if active.contains(&date) {
            streak += 1;
            gap = 0;
        } else {
            gap += 1;
            streak = 0;
        }
        summary.longest_streak = summary.longest_streak.max(streak);
        summary.longest_gap = summary.longest_gap.max(gap);
        if date == to {
            break;
        }
        match date.checked_add_days(Days::new(1)) {
            Some(next) => date = next,
            None => break,
        }
    }
    summary
}
