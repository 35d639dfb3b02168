use serde::{Deserialize, Serialize};

use crate::position::Position;

/// How a trial was resolved. Applied to a [`TrialRecord`] at most once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// Response inside the limit. Times are seconds.
    Hit {
        response_time_since_start: f64,
        latency: f64,
        was_fixating: bool,
    },
    /// Nothing arrived in time; the trial stays negative.
    TimedOut,
}

/// Recorded outcome of one stimulus presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// 1-based presentation index.
    pub index: usize,
    pub position: Position,
    pub responded: bool,
    pub response_time_since_start: f64,
    pub latency_since_onset: f64,
    pub was_fixating: bool,
    #[serde(skip)]
    classified: bool,
}

impl TrialRecord {
    /// Fresh record for a stimulus that was just shown.
    pub fn pending(index: usize, position: Position) -> Self {
        Self {
            index,
            position,
            responded: false,
            response_time_since_start: 0.0,
            latency_since_onset: 0.0,
            was_fixating: false,
            classified: false,
        }
    }

    /// Record read back from a finished log; its classification is final.
    pub fn finalized(
        index: usize,
        position: Position,
        responded: bool,
        response_time_since_start: f64,
        latency_since_onset: f64,
        was_fixating: bool,
    ) -> Self {
        Self {
            index,
            position,
            responded,
            response_time_since_start,
            latency_since_onset,
            was_fixating,
            classified: true,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.classified
    }

    /// Applies `outcome` unless the trial was already classified.
    /// Returns whether this call was the one that resolved it.
    pub fn classify(&mut self, outcome: Classification) -> bool {
        if self.classified {
            return false;
        }
        self.classified = true;
        if let Classification::Hit {
            response_time_since_start,
            latency,
            was_fixating,
        } = outcome
        {
            self.responded = true;
            self.response_time_since_start = response_time_since_start;
            self.latency_since_onset = latency;
            self.was_fixating = was_fixating;
        }
        true
    }
}

/// A response that cannot be credited to a timely detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FalsePositiveRecord {
    pub time_since_start: f64,
    pub time_since_last_onset: f64,
}
