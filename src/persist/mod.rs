/// SQLite journal sink.
pub mod sqlite;

use thiserror::Error;

use crate::{core::store::StoreSnapshotV1, ledger::StoredOp, types::OpSeq};

/// Persistence-layer errors.
#[derive(Debug, Error)]
pub enum PersistError {
    /// SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Payload (de)serialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Store rejected a replayed op.
    #[error("store error during replay: {0}")]
    Store(#[from] crate::core::store::StoreError),
    /// Anything else.
    #[error("{0}")]
    Message(String),
}

/// Convenience alias for persistence results.
pub type PersistResult<T> = Result<T, PersistError>;

/// Durable sink for the append-only op journal.
///
/// Appends must be atomic per batch: one synchronization's record, medium
/// state, and ledger changes commit together or not at all on replay.
pub trait LedgerSink: Send {
    /// Appends `ops` durably; returns the highest sequence persisted.
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq>;
    /// Flushes buffered writes to stable storage.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
    /// Persists a full-store snapshot covering ops up to `last_seq`.
    fn write_snapshot(&mut self, _snapshot: &StoreSnapshotV1, _last_seq: OpSeq) -> PersistResult<()> {
        Ok(())
    }
    /// Deletes journal rows made redundant by a snapshot.
    fn compact_through(&mut self, _seq: OpSeq) -> PersistResult<usize> {
        Ok(0)
    }
}
