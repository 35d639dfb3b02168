//! Capabilities the scheduler consumes but does not implement.
//!
//! All calls are synchronous from the scheduler's point of view. A host whose
//! renderer or tracker is asynchronous must block until the command has taken
//! effect before returning.

use std::path::Path;

use crate::position::Position;

/// Opaque token for a visible stimulus marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StimulusHandle(pub u64);

/// Places and removes the visual marker.
pub trait DisplaySink: Send {
    /// Shows a marker at `position` with the given opacity in `[0, 1]`.
    fn show(&mut self, position: Position, opacity: f32) -> StimulusHandle;
    fn hide(&mut self, handle: StimulusHandle);
}

/// Eye-tracking view of the subject.
pub trait GazeOracle: Send + Sync {
    fn is_fixating_active_stimulus(&self) -> bool;
    /// Ends the underlying tracking stream.
    fn stop(&self);
}

/// Receives the run output location once results are on disk.
pub trait PostProcessor: Send {
    /// Fire-and-forget; must not block the scheduler.
    fn notify_run_complete(&self, output: &Path);
}
