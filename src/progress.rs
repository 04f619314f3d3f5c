//! Progress record aggregate, per-format medium states, and report inputs.

use serde::{Deserialize, Serialize};

use crate::{
    convert,
    types::{
        BookId, ContextId, Medium, PercentCenti, ProgressId, ProgressKey, ProgressState, ReaderId,
        SpeedCenti, DEFAULT_SPEED_CENTI, PERCENT_COMPLETE,
    },
};
use chrono::NaiveDate;

/// Raw value accepted by a progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressInput {
    /// New current page for a PAPER/EBOOK medium.
    Page(u32),
    /// New absolute audiobook position. Never speed-adjusted.
    AudioPosition {
        /// Position from the start of the audiobook.
        seconds: u64,
    },
    /// Wall-clock listening time to add to the audio position.
    ///
    /// Adjusted by the effective playback speed once, at capture.
    AudioListened {
        /// Raw listened duration before speed adjustment.
        seconds: u64,
    },
}

/// Per-format position record, unique per (progress record, medium).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediumState {
    /// Page-counted format (paper or ebook).
    Pages {
        /// Which page-counted format this is.
        medium: Medium,
        /// Current page, clamped to the medium total when one is known.
        current_page: u32,
        /// Edition-specific page count when it differs from the reference.
        total_pages_override: Option<u32>,
    },
    /// Audiobook format.
    Audio {
        /// Playback position in seconds.
        position_secs: u64,
        /// Total audiobook length, when known.
        length_secs: Option<u64>,
        /// Per-medium speed; falls back to the record's speed when `None`.
        playback_speed_centi: Option<SpeedCenti>,
    },
}

impl MediumState {
    /// Format code of this state.
    pub fn medium(&self) -> Medium {
        match self {
            MediumState::Pages { medium, .. } => *medium,
            MediumState::Audio { .. } => Medium::Audio,
        }
    }

    /// Raw position in the medium's own unit (pages or seconds).
    pub fn raw(&self) -> u64 {
        match self {
            MediumState::Pages { current_page, .. } => u64::from(*current_page),
            MediumState::Audio { position_secs, .. } => *position_secs,
        }
    }

    /// The medium's own total in its own unit, when resolvable.
    ///
    /// Page media fall back to the book's effective total pages.
    pub fn own_total(&self, effective_total: Option<u32>) -> Option<u64> {
        match self {
            MediumState::Pages {
                total_pages_override,
                ..
            } => total_pages_override.or(effective_total).map(u64::from),
            MediumState::Audio { length_secs, .. } => *length_secs,
        }
    }
}

/// Configuration supplied when activating a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediumConfig {
    /// Page count of this specific edition (page media only).
    pub total_pages_override: Option<u32>,
    /// Audiobook length in seconds (audio only).
    pub audio_length_secs: Option<u64>,
    /// Per-medium playback speed (audio only).
    pub playback_speed_centi: Option<SpeedCenti>,
}

impl MediumConfig {
    /// Builds the initial [`MediumState`] for `medium`.
    pub fn into_state(self, medium: Medium) -> MediumState {
        if medium.is_pages() {
            MediumState::Pages {
                medium,
                current_page: 0,
                total_pages_override: self.total_pages_override,
            }
        } else {
            MediumState::Audio {
                position_secs: 0,
                length_secs: self.audio_length_secs,
                playback_speed_centi: self.playback_speed_centi,
            }
        }
    }
}

/// Aggregate root for one read-through of one book by one reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Stable record identifier.
    pub id: ProgressId,
    /// Owning reader.
    pub reader_id: ReaderId,
    /// Book being read.
    pub book_id: BookId,
    /// Optional read-through context.
    pub context_id: Option<ContextId>,
    /// Overall completion in hundredths of a percent, monotonically
    /// non-decreasing until `mark_finished` forces `10_000`.
    pub percent_centi: PercentCenti,
    /// Lifecycle state.
    pub state: ProgressState,
    /// Override used when the catalog does not know the page count.
    pub custom_total_pages: Option<u32>,
    /// Record-level audio playback speed.
    pub playback_speed_centi: SpeedCenti,
    /// Active formats, in activation order. Never empty.
    pub media: Vec<MediumState>,
    /// Date the read-through was finished, once `Complete`.
    pub completed_on: Option<NaiveDate>,
}

impl ProgressRecord {
    /// Creates a fresh record with `medium` as the first active format.
    pub fn new(id: ProgressId, key: ProgressKey, medium: Medium, config: MediumConfig) -> Self {
        Self {
            id,
            reader_id: key.reader_id,
            book_id: key.book_id,
            context_id: key.context_id,
            percent_centi: 0,
            state: ProgressState::InProgress,
            custom_total_pages: None,
            playback_speed_centi: DEFAULT_SPEED_CENTI,
            media: vec![config.into_state(medium)],
            completed_on: None,
        }
    }

    /// Natural key of this record.
    pub fn key(&self) -> ProgressKey {
        ProgressKey {
            reader_id: self.reader_id,
            book_id: self.book_id,
            context_id: self.context_id,
        }
    }

    /// Effective total pages: custom override wins over the catalog's answer.
    pub fn effective_total_pages(&self, catalog_total: Option<u32>) -> Option<u32> {
        self.custom_total_pages.or(catalog_total)
    }

    /// Speed used for a given audio state, falling back to the record's.
    pub fn speed_for(&self, state: &MediumState) -> SpeedCenti {
        match state {
            MediumState::Audio {
                playback_speed_centi: Some(speed),
                ..
            } => *speed,
            _ => self.playback_speed_centi,
        }
    }

    /// Shared view of the state for `medium`, if active.
    pub fn medium_state(&self, medium: Medium) -> Option<&MediumState> {
        self.media.iter().find(|m| m.medium() == medium)
    }

    /// Mutable view of the state for `medium`, if active.
    pub fn medium_state_mut(&mut self, medium: Medium) -> Option<&mut MediumState> {
        self.media.iter_mut().find(|m| m.medium() == medium)
    }

    /// Active format codes in activation order.
    pub fn active_media(&self) -> Vec<Medium> {
        self.media.iter().map(|m| m.medium()).collect()
    }

    /// True once `mark_finished` has run.
    pub fn is_complete(&self) -> bool {
        self.state == ProgressState::Complete
    }

    /// Read-model snapshot handed to callers.
    pub fn snapshot(&self, catalog_total: Option<u32>) -> ProgressSnapshot {
        let effective = self.effective_total_pages(catalog_total);
        let current_page = effective.map(|total| {
            let page = convert::raw_for_percent(u64::from(total), self.percent_centi);
            page.min(u64::from(total)) as u32
        });
        ProgressSnapshot {
            progress_id: self.id,
            key: self.key(),
            percent_centi: self.percent_centi,
            state: self.state,
            current_page,
            media: self.media.clone(),
            completed_on: self.completed_on,
        }
    }
}

/// Immutable view of a progress record returned from engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Stable record identifier.
    pub progress_id: ProgressId,
    /// Natural key.
    pub key: ProgressKey,
    /// Overall completion in hundredths of a percent.
    pub percent_centi: PercentCenti,
    /// Lifecycle state.
    pub state: ProgressState,
    /// Representative page in the reference edition, when the total is known.
    pub current_page: Option<u32>,
    /// Active medium states at snapshot time.
    pub media: Vec<MediumState>,
    /// Completion date, once finished.
    pub completed_on: Option<NaiveDate>,
}

impl ProgressSnapshot {
    /// Percent formatted with two decimals, e.g. "50.00".
    pub fn percent_display(&self) -> String {
        convert::format_centi(u64::from(self.percent_centi))
    }

    /// True when the read-through has reached 100.00%.
    pub fn is_complete(&self) -> bool {
        self.percent_centi == PERCENT_COMPLETE && self.state == ProgressState::Complete
    }
}
