//! Read-side aggregation over the reading ledger.
//!
//! Every query here is a pure function of the store: no aggregate state is
//! kept anywhere, so results are recomputable from the ledger at any time
//! and may be cached freely by callers.

/// Calendar cells and streak queries.
pub mod calendar;
/// Daily totals and period summaries.
pub mod totals;

pub use calendar::{calendar, streaks, CalendarDay, StreakSummary};
pub use totals::{daily_totals, period_summary, DayTotals, Period, PeriodSummary};
