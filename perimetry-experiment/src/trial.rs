use std::time::Duration;

use perimetry_core::{Position, StimulusHandle};

/// The presentation currently on screen.
#[derive(Debug, Clone)]
pub(crate) struct ActiveTrial {
    /// 1-based, matches the log record.
    pub index: usize,
    pub position: Position,
    /// Timer reading when the stimulus was shown.
    pub onset: Duration,
    /// `None` when no display is attached.
    pub handle: Option<StimulusHandle>,
}
