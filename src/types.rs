//! Shared primitive IDs, format codes, and fixed-point unit aliases.

use serde::{Deserialize, Serialize};

/// Reader (account) identifier.
pub type ReaderId = u64;
/// Book identifier in the external catalog.
pub type BookId = u64;
/// Disambiguates concurrent read-throughs of the same book (e.g. an event).
pub type ContextId = u64;
/// Monotonic progress record identifier.
pub type ProgressId = u64;
/// Monotonic mutation operation sequence number.
pub type OpSeq = u64;
/// Monotonic ledger entry sequence number.
pub type EntrySeq = u64;

/// Hundredths of a page-equivalent (`15_000` = 150.00 pages).
pub type PagesCenti = u64;
/// Hundredths of a percent, `0..=10_000`.
pub type PercentCenti = u32;
/// Playback speed times 100, valid range `50..=300`.
pub type SpeedCenti = u16;

/// Fully complete percent value (100.00%).
pub const PERCENT_COMPLETE: PercentCenti = 10_000;
/// Default audio playback speed (1.00x).
pub const DEFAULT_SPEED_CENTI: SpeedCenti = 100;
/// Lowest accepted playback speed (0.50x).
pub const MIN_SPEED_CENTI: SpeedCenti = 50;
/// Highest accepted playback speed (3.00x).
pub const MAX_SPEED_CENTI: SpeedCenti = 300;

/// Tracked reading format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Medium {
    /// Physical paper edition.
    Paper,
    /// Electronic text edition.
    Ebook,
    /// Audiobook edition.
    Audio,
}

impl Medium {
    /// True for the page-counted formats.
    pub fn is_pages(self) -> bool {
        matches!(self, Medium::Paper | Medium::Ebook)
    }
}

/// Lifecycle state of one read-through.
///
/// The unstarted state is the absence of a record; `Complete` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressState {
    /// 0 <= percent < 100, updates accepted.
    InProgress,
    /// Percent forced to 100; further reports are no-ops.
    Complete,
}

/// Natural key of a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgressKey {
    /// Owning reader.
    pub reader_id: ReaderId,
    /// Book being read.
    pub book_id: BookId,
    /// Optional read-through context; re-reads use a fresh context.
    pub context_id: Option<ContextId>,
}

impl ProgressKey {
    /// Key for a plain (non-event) read-through.
    pub fn new(reader_id: ReaderId, book_id: BookId) -> Self {
        Self {
            reader_id,
            book_id,
            context_id: None,
        }
    }

    /// Key bound to an explicit read-through context.
    pub fn with_context(reader_id: ReaderId, book_id: BookId, context_id: ContextId) -> Self {
        Self {
            reader_id,
            book_id,
            context_id: Some(context_id),
        }
    }
}
