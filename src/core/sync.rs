//! Synchronization algorithm: applies one medium's position change to the
//! whole progress record and derives the ledger deltas to append.
//!
//! The record's overall percent only ever advances here; a medium's own raw
//! position may regress when a reader corrects a mis-entered page, but the
//! unified percent never follows it down. `mark_finished` is the only path
//! that jumps straight to 100.00%.

use crate::{
    convert,
    progress::{MediumState, ProgressInput, ProgressRecord},
    types::{Medium, PagesCenti, ProgressState, PERCENT_COMPLETE},
};
use chrono::NaiveDate;

use super::store::StoreError;

/// Structured outcome classification of one synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Percent advanced and/or a ledger delta was appended.
    Advanced,
    /// Accepted, but nothing moved forward (e.g. a downward correction).
    NoChange,
    /// No total is resolvable: raw position recorded, no equivalence
    /// computed, no ledger entry, no projection.
    PositionOnly,
    /// The record is already complete; the call was an idempotent no-op.
    AlreadyComplete,
}

/// A ledger delta produced by synchronization, before the store stamps
/// sequence and identity onto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    /// Contributing medium.
    pub medium: Medium,
    /// Incremental page-equivalents in hundredths. Always positive.
    pub pages_centi: PagesCenti,
    /// Listened wall-clock seconds for audio contributions.
    pub audio_seconds: Option<u64>,
}

/// Outcome of applying a report or completion to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Outcome classification.
    pub status: SyncStatus,
    /// Deltas to append, in medium order. Empty unless progress was made.
    pub entries: Vec<EntryDraft>,
}

impl SyncOutcome {
    fn bare(status: SyncStatus) -> Self {
        Self {
            status,
            entries: Vec::new(),
        }
    }
}

/// Applies a raw position report for `medium` to `record`.
///
/// Implements the synchronization contract: clamp the raw value, compute
/// previous and new equivalence, advance the unified percent monotonically,
/// emit the positive delta as a ledger draft, then project the percent
/// forward onto every other active medium.
pub fn apply_report(
    record: &mut ProgressRecord,
    medium: Medium,
    input: ProgressInput,
    catalog_total: Option<u32>,
) -> Result<SyncOutcome, StoreError> {
    if record.is_complete() {
        return Ok(SyncOutcome::bare(SyncStatus::AlreadyComplete));
    }
    validate_input(medium, input)?;

    let effective_total = record.effective_total_pages(catalog_total);
    let state = record
        .medium_state(medium)
        .ok_or(StoreError::MediumNotActive(medium))?;
    let speed = record.speed_for(state);
    let total_m = state.own_total(effective_total);
    let prev_raw = state.raw();

    let new_raw = match input {
        ProgressInput::Page(page) => u64::from(page),
        ProgressInput::AudioPosition { seconds } => seconds,
        ProgressInput::AudioListened { seconds } => {
            prev_raw.saturating_add(convert::speed_adjusted_secs(seconds, speed))
        }
    };
    let new_raw = match total_m {
        Some(total) => new_raw.min(total),
        None => new_raw,
    };

    let prev_eq = convert::pages_equivalent_centi(prev_raw, total_m, effective_total);
    let new_eq = convert::pages_equivalent_centi(new_raw, total_m, effective_total);

    // The medium's own position is stored even when equivalence is undefined
    // or the value moved backwards.
    let state = record
        .medium_state_mut(medium)
        .ok_or(StoreError::MediumNotActive(medium))?;
    write_raw(state, new_raw);

    let (Some(prev_eq), Some(new_eq)) = (prev_eq, new_eq) else {
        return Ok(SyncOutcome::bare(SyncStatus::PositionOnly));
    };

    let new_percent = convert::percent_centi(new_raw, total_m).unwrap_or(0);
    let advanced = new_percent > record.percent_centi;
    record.percent_centi = record.percent_centi.max(new_percent);

    let mut entries = Vec::new();
    let delta = new_eq.saturating_sub(prev_eq);
    if delta > 0 {
        entries.push(EntryDraft {
            medium,
            pages_centi: delta,
            audio_seconds: listened_seconds(medium, input, prev_raw, new_raw, speed),
        });
    }

    if advanced {
        project_percent(record, effective_total, Some(medium));
    }

    let status = if advanced || delta > 0 {
        SyncStatus::Advanced
    } else {
        SyncStatus::NoChange
    };
    Ok(SyncOutcome { status, entries })
}

/// Force-completes `record`: fills the remaining equivalence of every medium
/// with a resolvable total as a final ledger delta, moves raw positions to
/// their totals, and transitions to `Complete`. Idempotent.
pub fn apply_finish(
    record: &mut ProgressRecord,
    occurred_on: NaiveDate,
    catalog_total: Option<u32>,
) -> SyncOutcome {
    if record.is_complete() {
        return SyncOutcome::bare(SyncStatus::AlreadyComplete);
    }

    let effective_total = record.effective_total_pages(catalog_total);
    let mut entries = Vec::new();

    for state in &mut record.media {
        let Some(total) = state.own_total(effective_total) else {
            continue;
        };
        let medium = state.medium();
        let prev_raw = state.raw();
        let prev_eq = convert::pages_equivalent_centi(prev_raw, Some(total), effective_total)
            .unwrap_or(0);
        let full_eq = convert::pages_equivalent_centi(total, Some(total), effective_total)
            .unwrap_or(0);
        let delta = full_eq.saturating_sub(prev_eq);
        if delta > 0 {
            entries.push(EntryDraft {
                medium,
                pages_centi: delta,
                audio_seconds: (medium == Medium::Audio)
                    .then(|| total.saturating_sub(prev_raw)),
            });
        }
        write_raw(state, total);
    }

    record.percent_centi = PERCENT_COMPLETE;
    record.state = ProgressState::Complete;
    record.completed_on = Some(occurred_on);

    SyncOutcome {
        status: SyncStatus::Advanced,
        entries,
    }
}

/// Projects the record's unified percent onto active media, skipping
/// `exclude`. A medium only ever moves forward here: projection writes back
/// only when the implied raw value exceeds the medium's current position.
pub fn project_percent(
    record: &mut ProgressRecord,
    effective_total: Option<u32>,
    exclude: Option<Medium>,
) {
    let percent = record.percent_centi;
    for state in &mut record.media {
        if Some(state.medium()) == exclude {
            continue;
        }
        let Some(total) = state.own_total(effective_total) else {
            continue;
        };
        let target = convert::raw_for_percent(total, percent).min(total);
        if target > state.raw() {
            write_raw(state, target);
        }
    }
}

pub(crate) fn validate_input(medium: Medium, input: ProgressInput) -> Result<(), StoreError> {
    let matches = match input {
        ProgressInput::Page(_) => medium.is_pages(),
        ProgressInput::AudioPosition { .. } | ProgressInput::AudioListened { .. } => {
            medium == Medium::Audio
        }
    };
    if matches {
        Ok(())
    } else {
        Err(StoreError::InvalidRawValue {
            reason: "input kind does not match the reported medium",
        })
    }
}

fn write_raw(state: &mut MediumState, raw: u64) {
    match state {
        MediumState::Pages { current_page, .. } => {
            *current_page = raw.min(u64::from(u32::MAX)) as u32;
        }
        MediumState::Audio { position_secs, .. } => {
            *position_secs = raw;
        }
    }
}

/// Wall-clock listened seconds backing an audio delta.
///
/// Absolute position input reports the position advance directly; wall-clock
/// input converts the (possibly clamped) advance back at the capture speed.
fn listened_seconds(
    medium: Medium,
    input: ProgressInput,
    prev_raw: u64,
    new_raw: u64,
    speed: u16,
) -> Option<u64> {
    if medium != Medium::Audio {
        return None;
    }
    let advance = new_raw.saturating_sub(prev_raw);
    match input {
        ProgressInput::AudioListened { .. } => Some(convert::div_round_half_up(
            u128::from(advance) * 100,
            u128::from(speed.max(1)),
        ) as u64),
        _ => Some(advance),
    }
}
