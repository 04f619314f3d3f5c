//! Reading ledger entries, mutation op model, and persistence wrappers.
//!
//! Ledger entries are immutable once appended: there is no update or delete
//! anywhere in the crate, and historical totals never change. Every state
//! mutation is expressed as an [`Op`] and journaled as a [`StoredOp`] so a
//! store can be rebuilt deterministically by replay.

use serde::{Deserialize, Serialize};

use crate::{
    progress::{MediumConfig, ProgressInput},
    types::{BookId, EntrySeq, Medium, OpSeq, PagesCenti, ProgressId, ProgressKey, ReaderId, SpeedCenti},
};
use chrono::NaiveDate;

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// One dated, per-medium page-equivalent delta. Append-only.
///
/// Multiple entries may exist for the same (progress, date, medium); they are
/// deltas, not snapshots, and are summed by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Monotonic entry sequence within the store.
    pub seq: EntrySeq,
    /// Progress record this delta belongs to.
    pub progress_id: ProgressId,
    /// Owning reader, denormalized for read-side queries.
    pub reader_id: ReaderId,
    /// Book, denormalized for read-side queries.
    pub book_id: BookId,
    /// Reader-local calendar date of the contribution.
    pub logged_on: NaiveDate,
    /// Format the contribution was read in.
    pub medium: Medium,
    /// Incremental page-equivalents, in hundredths.
    pub pages_centi: PagesCenti,
    /// Listened seconds backing this entry, for audio contributions.
    pub audio_seconds: Option<u64>,
}

/// Immutable mutation operation appended to the journal.
///
/// `catalog_total_pages` snapshots the catalog collaborator's answer at op
/// time so replay never consults the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// A position report on one medium.
    Report {
        /// Record key; the record is created lazily if absent.
        key: ProgressKey,
        /// Reported medium.
        medium: Medium,
        /// Raw position value.
        input: ProgressInput,
        /// Reader-local date of the report.
        occurred_on: NaiveDate,
        /// Catalog page count at op time.
        catalog_total_pages: Option<u32>,
    },
    /// Manual completion of a read-through.
    MarkFinished {
        /// Record key.
        key: ProgressKey,
        /// Reader-local completion date.
        occurred_on: NaiveDate,
        /// Catalog page count at op time.
        catalog_total_pages: Option<u32>,
    },
    /// Start tracking an additional format.
    ActivateMedium {
        /// Record key.
        key: ProgressKey,
        /// Format to activate.
        medium: Medium,
        /// Initial medium configuration.
        config: MediumConfig,
        /// Catalog page count at op time, used to project the current percent.
        catalog_total_pages: Option<u32>,
    },
    /// Stop tracking a format; its past ledger entries remain.
    DeactivateMedium {
        /// Record key.
        key: ProgressKey,
        /// Format to deactivate.
        medium: Medium,
    },
    /// Set the page-count override used when the catalog has none.
    SetCustomTotalPages {
        /// Record key.
        key: ProgressKey,
        /// New override.
        total_pages: u32,
    },
    /// Fill in the audiobook length once known.
    SetAudioLength {
        /// Record key.
        key: ProgressKey,
        /// Audiobook length in seconds.
        length_secs: u64,
    },
    /// Change the record-level playback speed.
    SetPlaybackSpeed {
        /// Record key.
        key: ProgressKey,
        /// New speed, `50..=300`.
        speed_centi: SpeedCenti,
    },
}

impl Op {
    /// Key of the record this op targets.
    pub fn key(&self) -> ProgressKey {
        match self {
            Op::Report { key, .. }
            | Op::MarkFinished { key, .. }
            | Op::ActivateMedium { key, .. }
            | Op::DeactivateMedium { key, .. }
            | Op::SetCustomTotalPages { key, .. }
            | Op::SetAudioLength { key, .. }
            | Op::SetPlaybackSpeed { key, .. } => *key,
        }
    }
}

/// Journal row metadata plus operation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Monotonic operation sequence.
    pub seq: OpSeq,
    /// Wall-clock timestamp in milliseconds.
    pub ts_ms: u64,
    /// Operation body.
    pub op: Op,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub stored: StoredOp,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(stored: StoredOp) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            stored,
        }
    }
}
