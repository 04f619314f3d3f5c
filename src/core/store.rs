//! Authoritative in-memory progress store with append-only ledger.

use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ledger::{LedgerEntry, Op, StoredOp},
    progress::{MediumConfig, MediumState, ProgressInput, ProgressRecord, ProgressSnapshot},
    types::{
        EntrySeq, MAX_SPEED_CENTI, MIN_SPEED_CENTI, Medium, OpSeq, ProgressId, ProgressKey,
        ReaderId, SpeedCenti,
    },
};
use chrono::NaiveDate;

use super::{
    indices::{EntryIndex, VecIndex},
    sync::{self, SyncOutcome, SyncStatus},
};

/// Errors surfaced by store operations.
///
/// Validation errors never partially mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The targeted record does not exist.
    #[error("no progress record for {0:?}")]
    MissingProgress(ProgressKey),
    /// The targeted format is not in the record's active set.
    #[error("medium {0:?} is not active; activate it first")]
    MediumNotActive(Medium),
    /// The format is already active for this record.
    #[error("medium {0:?} is already active")]
    MediumAlreadyActive(Medium),
    /// Deactivating would leave the record with no active format.
    #[error("cannot deactivate {0:?}: it is the last active medium")]
    LastActiveMedium(Medium),
    /// Malformed or mismatched raw input, rejected before any mutation.
    #[error("invalid raw value: {reason}")]
    InvalidRawValue {
        /// Why the input was rejected.
        reason: &'static str,
    },
    /// Playback speed outside the accepted `0.50x..=3.00x` range.
    #[error("playback speed {0} centi is outside 50..=300")]
    InvalidPlaybackSpeed(SpeedCenti),
}

/// Result of a report or completion, handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    /// Record state after the operation.
    pub snapshot: ProgressSnapshot,
    /// Structured outcome classification.
    pub status: SyncStatus,
    /// Ledger entries appended by this operation.
    pub entries_appended: usize,
}

/// Serializable full-store state for snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshotV1 {
    /// Next progress id to assign.
    pub next_progress_id: ProgressId,
    /// Next op sequence to assign.
    pub next_op_seq: OpSeq,
    /// All progress records, in id order.
    pub records: Vec<ProgressRecord>,
    /// The full ledger, in append order.
    pub ledger: Vec<LedgerEntry>,
}

/// Authoritative store: progress records, their medium states, and the
/// append-only reading ledger, plus lookup indices.
#[derive(Debug, Default)]
pub struct ProgressStore {
    records: HashMap<ProgressId, ProgressRecord>,
    by_key: HashMap<ProgressKey, ProgressId>,
    by_reader: VecIndex<ReaderId>,
    ledger: Vec<LedgerEntry>,
    entries_by_reader: EntryIndex<ReaderId>,
    pending_ops: Vec<StoredOp>,
    next_progress_id: ProgressId,
    next_op_seq: OpSeq,
}

impl ProgressStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            next_progress_id: 1,
            next_op_seq: 1,
            ..Self::default()
        }
    }

    /// Rebuilds a store from a snapshot, restoring all indices.
    pub fn from_snapshot(snapshot: StoreSnapshotV1) -> Self {
        let mut store = Self {
            next_progress_id: snapshot.next_progress_id,
            next_op_seq: snapshot.next_op_seq,
            ..Self::default()
        };
        for rec in snapshot.records {
            store.index_record(&rec);
            store.records.insert(rec.id, rec);
        }
        for entry in snapshot.ledger {
            store
                .entries_by_reader
                .entry(entry.reader_id)
                .or_default()
                .push(store.ledger.len());
            store.ledger.push(entry);
        }
        store
    }

    /// Exports the full store state.
    pub fn export_snapshot(&self) -> StoreSnapshotV1 {
        let mut records: Vec<ProgressRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        StoreSnapshotV1 {
            next_progress_id: self.next_progress_id,
            next_op_seq: self.next_op_seq,
            records,
            ledger: self.ledger.clone(),
        }
    }

    /// Reports a raw position change for `medium`, creating the record
    /// lazily on first report with `medium` as its first active format.
    pub fn report(
        &mut self,
        key: ProgressKey,
        medium: Medium,
        input: ProgressInput,
        occurred_on: NaiveDate,
        catalog_total: Option<u32>,
    ) -> Result<(SyncResult, StoredOp), StoreError> {
        let result = self.apply_report(key, medium, input, occurred_on, catalog_total)?;
        let seq = self.take_next_op_seq();
        let stored = self.finish_op(
            seq,
            Op::Report {
                key,
                medium,
                input,
                occurred_on,
                catalog_total_pages: catalog_total,
            },
        );
        Ok((result, stored))
    }

    /// Force-completes the read-through, filling remaining equivalence as
    /// final ledger deltas. Idempotent once complete.
    pub fn mark_finished(
        &mut self,
        key: ProgressKey,
        occurred_on: NaiveDate,
        catalog_total: Option<u32>,
    ) -> Result<(SyncResult, StoredOp), StoreError> {
        let result = self.apply_finish(key, occurred_on, catalog_total)?;
        let seq = self.take_next_op_seq();
        let stored = self.finish_op(
            seq,
            Op::MarkFinished {
                key,
                occurred_on,
                catalog_total_pages: catalog_total,
            },
        );
        Ok((result, stored))
    }

    /// Activates an additional format; the current percent is projected onto
    /// it so the new medium starts at-or-ahead of the unified position.
    ///
    /// Creates the record when `key` is unknown, making this the way to start
    /// tracking a book before any position exists.
    pub fn activate_medium(
        &mut self,
        key: ProgressKey,
        medium: Medium,
        config: MediumConfig,
        catalog_total: Option<u32>,
    ) -> Result<(ProgressSnapshot, StoredOp), StoreError> {
        let snapshot = self.apply_activate(key, medium, config, catalog_total)?;
        let seq = self.take_next_op_seq();
        let stored = self.finish_op(
            seq,
            Op::ActivateMedium {
                key,
                medium,
                config,
                catalog_total_pages: catalog_total,
            },
        );
        Ok((snapshot, stored))
    }

    /// Deactivates a format. Its past ledger entries remain immutable; only
    /// its future equivalence contribution stops.
    pub fn deactivate_medium(
        &mut self,
        key: ProgressKey,
        medium: Medium,
    ) -> Result<(ProgressSnapshot, StoredOp), StoreError> {
        let snapshot = self.apply_deactivate(key, medium)?;
        let seq = self.take_next_op_seq();
        let stored = self.finish_op(seq, Op::DeactivateMedium { key, medium });
        Ok((snapshot, stored))
    }

    /// Sets the page-count override used when the catalog knows no total.
    ///
    /// Past days are not backfilled; the next report computes its delta
    /// against the now-known total.
    pub fn set_custom_total_pages(
        &mut self,
        key: ProgressKey,
        total_pages: u32,
    ) -> Result<(ProgressSnapshot, StoredOp), StoreError> {
        if total_pages == 0 {
            return Err(StoreError::InvalidRawValue {
                reason: "custom total pages must be positive",
            });
        }
        let record = self.record_mut(key)?;
        apply_custom_total(record, total_pages);
        let snapshot = record.snapshot(None);
        let seq = self.take_next_op_seq();
        let stored = self.finish_op(seq, Op::SetCustomTotalPages { key, total_pages });
        Ok((snapshot, stored))
    }

    /// Fills in the audiobook length once the catalog learns it.
    pub fn set_audio_length(
        &mut self,
        key: ProgressKey,
        length_secs: u64,
    ) -> Result<(ProgressSnapshot, StoredOp), StoreError> {
        if length_secs == 0 {
            return Err(StoreError::InvalidRawValue {
                reason: "audio length must be positive",
            });
        }
        let record = self.record_mut(key)?;
        apply_audio_length(record, length_secs)?;
        let snapshot = record.snapshot(None);
        let seq = self.take_next_op_seq();
        let stored = self.finish_op(seq, Op::SetAudioLength { key, length_secs });
        Ok((snapshot, stored))
    }

    /// Changes the record-level playback speed. Applied to future wall-clock
    /// listening input only; past entries are never revisited.
    pub fn set_playback_speed(
        &mut self,
        key: ProgressKey,
        speed_centi: SpeedCenti,
    ) -> Result<(ProgressSnapshot, StoredOp), StoreError> {
        if !(MIN_SPEED_CENTI..=MAX_SPEED_CENTI).contains(&speed_centi) {
            return Err(StoreError::InvalidPlaybackSpeed(speed_centi));
        }
        let record = self.record_mut(key)?;
        record.playback_speed_centi = speed_centi;
        let snapshot = record.snapshot(None);
        let seq = self.take_next_op_seq();
        let stored = self.finish_op(seq, Op::SetPlaybackSpeed { key, speed_centi });
        Ok((snapshot, stored))
    }

    /// Re-applies a journaled op during replay. The op's own sequence
    /// advances the counter; record ids and ledger sequences regenerate
    /// deterministically in replay order.
    pub fn apply_replayed_op(&mut self, stored: StoredOp) -> Result<(), StoreError> {
        let seq = stored.seq;
        match stored.op {
            Op::Report {
                key,
                medium,
                input,
                occurred_on,
                catalog_total_pages,
            } => {
                self.apply_report(key, medium, input, occurred_on, catalog_total_pages)?;
            }
            Op::MarkFinished {
                key,
                occurred_on,
                catalog_total_pages,
            } => {
                self.apply_finish(key, occurred_on, catalog_total_pages)?;
            }
            Op::ActivateMedium {
                key,
                medium,
                config,
                catalog_total_pages,
            } => {
                self.apply_activate(key, medium, config, catalog_total_pages)?;
            }
            Op::DeactivateMedium { key, medium } => {
                self.apply_deactivate(key, medium)?;
            }
            Op::SetCustomTotalPages { key, total_pages } => {
                apply_custom_total(self.record_mut(key)?, total_pages);
            }
            Op::SetAudioLength { key, length_secs } => {
                let record = self.record_mut(key)?;
                apply_audio_length(record, length_secs)?;
            }
            Op::SetPlaybackSpeed { key, speed_centi } => {
                self.record_mut(key)?.playback_speed_centi = speed_centi;
            }
        }
        self.pending_ops.clear();
        self.bump_next_seq_from(seq);
        Ok(())
    }

    /// Record for `key`, if it exists.
    pub fn get(&self, key: ProgressKey) -> Option<&ProgressRecord> {
        self.by_key.get(&key).and_then(|id| self.records.get(id))
    }

    /// Read-model snapshot for `key`, if the record exists.
    pub fn snapshot(
        &self,
        key: ProgressKey,
        catalog_total: Option<u32>,
    ) -> Option<ProgressSnapshot> {
        self.get(key).map(|r| r.snapshot(catalog_total))
    }

    /// All records belonging to `reader`, in creation order.
    pub fn records_for_reader(&self, reader: ReaderId) -> Vec<&ProgressRecord> {
        self.by_reader
            .get(&reader)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// The full ledger in append order.
    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    /// Ledger entries for `reader`, in append order.
    pub fn entries_for_reader(&self, reader: ReaderId) -> Vec<&LedgerEntry> {
        self.entries_by_reader
            .get(&reader)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|idx| self.ledger.get(*idx))
            .collect()
    }

    /// Takes the ops accumulated since the last drain, for persistence.
    pub fn drain_pending_ops(&mut self) -> Vec<StoredOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// Highest op sequence assigned so far.
    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    fn apply_report(
        &mut self,
        key: ProgressKey,
        medium: Medium,
        input: ProgressInput,
        occurred_on: NaiveDate,
        catalog_total: Option<u32>,
    ) -> Result<SyncResult, StoreError> {
        sync::validate_input(medium, input)?;
        if !self.by_key.contains_key(&key) {
            self.create_record(key, medium, MediumConfig::default());
        }
        let id = *self
            .by_key
            .get(&key)
            .ok_or(StoreError::MissingProgress(key))?;
        let record = self
            .records
            .get_mut(&id)
            .ok_or(StoreError::MissingProgress(key))?;

        let outcome = sync::apply_report(record, medium, input, catalog_total)?;
        let snapshot = record.snapshot(catalog_total);
        let appended = self.append_outcome(id, key, occurred_on, &outcome);

        Ok(SyncResult {
            snapshot,
            status: outcome.status,
            entries_appended: appended,
        })
    }

    fn apply_finish(
        &mut self,
        key: ProgressKey,
        occurred_on: NaiveDate,
        catalog_total: Option<u32>,
    ) -> Result<SyncResult, StoreError> {
        let id = *self
            .by_key
            .get(&key)
            .ok_or(StoreError::MissingProgress(key))?;
        let record = self
            .records
            .get_mut(&id)
            .ok_or(StoreError::MissingProgress(key))?;

        let outcome = sync::apply_finish(record, occurred_on, catalog_total);
        let snapshot = record.snapshot(catalog_total);
        let appended = self.append_outcome(id, key, occurred_on, &outcome);

        Ok(SyncResult {
            snapshot,
            status: outcome.status,
            entries_appended: appended,
        })
    }

    fn apply_activate(
        &mut self,
        key: ProgressKey,
        medium: Medium,
        config: MediumConfig,
        catalog_total: Option<u32>,
    ) -> Result<ProgressSnapshot, StoreError> {
        if let Some(speed) = config.playback_speed_centi {
            if !(MIN_SPEED_CENTI..=MAX_SPEED_CENTI).contains(&speed) {
                return Err(StoreError::InvalidPlaybackSpeed(speed));
            }
        }
        if !self.by_key.contains_key(&key) {
            self.create_record(key, medium, config);
            let record = self.get(key).ok_or(StoreError::MissingProgress(key))?;
            return Ok(record.snapshot(catalog_total));
        }

        let record = self.record_mut(key)?;
        if record.medium_state(medium).is_some() {
            return Err(StoreError::MediumAlreadyActive(medium));
        }
        record.media.push(config.into_state(medium));

        // A freshly activated format starts at the unified position, never
        // behind it.
        let effective_total = record.effective_total_pages(catalog_total);
        sync::project_percent(record, effective_total, None);
        Ok(record.snapshot(catalog_total))
    }

    fn apply_deactivate(
        &mut self,
        key: ProgressKey,
        medium: Medium,
    ) -> Result<ProgressSnapshot, StoreError> {
        let record = self.record_mut(key)?;
        let pos = record
            .media
            .iter()
            .position(|m| m.medium() == medium)
            .ok_or(StoreError::MediumNotActive(medium))?;
        if record.media.len() == 1 {
            return Err(StoreError::LastActiveMedium(medium));
        }
        record.media.remove(pos);
        Ok(record.snapshot(None))
    }

    fn create_record(&mut self, key: ProgressKey, medium: Medium, config: MediumConfig) {
        let id = self.next_progress_id;
        self.next_progress_id += 1;
        let record = ProgressRecord::new(id, key, medium, config);
        self.index_record(&record);
        self.records.insert(id, record);
    }

    fn append_outcome(
        &mut self,
        id: ProgressId,
        key: ProgressKey,
        occurred_on: NaiveDate,
        outcome: &SyncOutcome,
    ) -> usize {
        for draft in &outcome.entries {
            let seq = self.ledger.len() as EntrySeq + 1;
            let entry = LedgerEntry {
                seq,
                progress_id: id,
                reader_id: key.reader_id,
                book_id: key.book_id,
                logged_on: occurred_on,
                medium: draft.medium,
                pages_centi: draft.pages_centi,
                audio_seconds: draft.audio_seconds,
            };
            self.entries_by_reader
                .entry(key.reader_id)
                .or_default()
                .push(self.ledger.len());
            self.ledger.push(entry);
        }
        outcome.entries.len()
    }

    fn record_mut(&mut self, key: ProgressKey) -> Result<&mut ProgressRecord, StoreError> {
        let id = *self
            .by_key
            .get(&key)
            .ok_or(StoreError::MissingProgress(key))?;
        self.records
            .get_mut(&id)
            .ok_or(StoreError::MissingProgress(key))
    }

    fn index_record(&mut self, record: &ProgressRecord) {
        self.by_key.insert(record.key(), record.id);
        self.by_reader
            .entry(record.reader_id)
            .or_default()
            .push(record.id);
    }

    fn finish_op(&mut self, seq: OpSeq, op: Op) -> StoredOp {
        let stored = StoredOp {
            seq,
            ts_ms: now_ms(),
            op,
        };
        self.pending_ops.push(stored.clone());
        stored
    }

    fn take_next_op_seq(&mut self) -> OpSeq {
        let seq = self.next_op_seq;
        self.next_op_seq += 1;
        seq
    }

    fn bump_next_seq_from(&mut self, seq: OpSeq) {
        self.next_op_seq = self.next_op_seq.max(seq.saturating_add(1));
    }
}

/// Positions recorded before the total was known may exceed it; a
/// late-arriving total clamps them.
fn apply_custom_total(record: &mut ProgressRecord, total_pages: u32) {
    record.custom_total_pages = Some(total_pages);
    for state in &mut record.media {
        if let MediumState::Pages {
            current_page,
            total_pages_override,
            ..
        } = state
        {
            let total = total_pages_override.unwrap_or(total_pages);
            *current_page = (*current_page).min(total);
        }
    }
}

fn apply_audio_length(record: &mut ProgressRecord, length_secs: u64) -> Result<(), StoreError> {
    match record.medium_state_mut(Medium::Audio) {
        Some(MediumState::Audio {
            position_secs,
            length_secs: length,
            ..
        }) => {
            *length = Some(length_secs);
            *position_secs = (*position_secs).min(length_secs);
            Ok(())
        }
        _ => Err(StoreError::MediumNotActive(Medium::Audio)),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
