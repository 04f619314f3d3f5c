//! Equivalence Converter: fixed-point conversion between a medium's raw
//! position and page-equivalents / percent-complete.
//!
//! All arithmetic is exact integer math with round-half-up semantics; no
//! floating point is used anywhere in the crate. Page-equivalents are carried
//! in hundredths (`PagesCenti`), percent in hundredths of a percent
//! (`PercentCenti`). Intermediate products widen to `u128` so no realistic
//! page count or duration can overflow.

use crate::types::{PagesCenti, PercentCenti, SpeedCenti, PERCENT_COMPLETE};

/// Integer division of `num / den`, rounding half up. `den` must be non-zero.
pub fn div_round_half_up(num: u128, den: u128) -> u128 {
    debug_assert!(den > 0);
    (num * 2 + den) / (den * 2)
}

/// Equivalence of a raw position `raw` within a medium whose own total is
/// `total_m`, against the book's effective total pages `effective_total`.
///
/// The fraction `raw / total_m` is clamped to `[0, 1]` and scaled onto the
/// reference edition. For a page medium with no override, `total_m` equals
/// `effective_total` and the result degenerates to `raw` pages exactly.
/// Returns `None` when either total is unknown or zero: equivalence is
/// undefined and callers must not record ledger deltas.
pub fn pages_equivalent_centi(
    raw: u64,
    total_m: Option<u64>,
    effective_total: Option<u32>,
) -> Option<PagesCenti> {
    let total_m = total_m.filter(|t| *t > 0)?;
    let effective_total = effective_total.filter(|t| *t > 0)?;
    let raw = raw.min(total_m);
    let centi = div_round_half_up(
        u128::from(effective_total) * 100 * u128::from(raw),
        u128::from(total_m),
    );
    Some(centi as PagesCenti)
}

/// Percent-complete implied by a raw position within its medium total,
/// rounded half up to hundredths and clamped to `0..=10_000`.
pub fn percent_centi(raw: u64, total_m: Option<u64>) -> Option<PercentCenti> {
    let total_m = total_m.filter(|t| *t > 0)?;
    let raw = raw.min(total_m);
    let centi = div_round_half_up(u128::from(raw) * 10_000, u128::from(total_m));
    Some((centi as PercentCenti).min(PERCENT_COMPLETE))
}

/// Raw position implied by `percent` of a medium total, rounded half up.
///
/// Used when projecting the unified percent onto other active media and when
/// deriving the representative current page.
pub fn raw_for_percent(total_m: u64, percent: PercentCenti) -> u64 {
    div_round_half_up(
        u128::from(total_m) * u128::from(percent),
        u128::from(PERCENT_COMPLETE),
    ) as u64
}

/// Position advance for `listened_secs` of wall-clock listening at `speed`.
///
/// Speed adjustment happens exactly once, here, at the point the raw input is
/// captured; equivalence conversion never applies it again.
pub fn speed_adjusted_secs(listened_secs: u64, speed: SpeedCenti) -> u64 {
    div_round_half_up(u128::from(listened_secs) * u128::from(speed), 100) as u64
}

/// Whole audio minutes for a number of seconds, rounded up.
pub fn audio_minutes(seconds: u64) -> u64 {
    seconds.div_ceil(60)
}

/// Average pages per reading day in hundredths, rounded half up.
pub fn average_centi(total_pages_centi: PagesCenti, days: u64) -> PagesCenti {
    if days == 0 {
        return 0;
    }
    div_round_half_up(u128::from(total_pages_centi), u128::from(days)) as PagesCenti
}

/// Renders a centi quantity as a two-decimal string, e.g. `5_000` -> "50.00".
pub fn format_centi(centi: u64) -> String {
    format!("{}.{:02}", centi / 100, centi % 100)
}
