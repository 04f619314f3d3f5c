//! Runtime event stream payloads.
//!
//! Collaborators (statistics, gamification, leaderboards) subscribe to these
//! explicitly; the engine itself awards nothing.

use crate::types::{BookId, OpSeq, PercentCenti, ProgressId, ReaderId};
use chrono::NaiveDate;

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A record's unified percent moved forward.
    Advanced {
        /// Record that advanced.
        progress_id: ProgressId,
        /// Owning reader.
        reader_id: ReaderId,
        /// Book being read.
        book_id: BookId,
        /// New unified percent, in hundredths.
        percent_centi: PercentCenti,
    },
    /// A read-through reached completion.
    Completed {
        /// Completed record.
        progress_id: ProgressId,
        /// Owning reader.
        reader_id: ReaderId,
        /// Finished book.
        book_id: BookId,
        /// Reader-local completion date.
        completed_on: NaiveDate,
    },
    /// Persistence has reached at least this op sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        op_seq: OpSeq,
    },
}
