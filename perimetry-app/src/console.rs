//! Terminal stand-ins for the display and the eye tracker.

use std::sync::atomic::{AtomicBool, Ordering};

use perimetry_core::{DisplaySink, GazeOracle, Position, StimulusHandle};
use tracing::info;

/// Reports stimulus placement on the log instead of drawing it.
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    next_handle: u64,
    visible: Option<StimulusHandle>,
}

impl DisplaySink for ConsoleDisplay {
    fn show(&mut self, position: Position, opacity: f32) -> StimulusHandle {
        self.next_handle += 1;
        let handle = StimulusHandle(self.next_handle);
        self.visible = Some(handle);
        info!(%position, opacity, handle = handle.0, "stimulus shown");
        handle
    }

    fn hide(&mut self, handle: StimulusHandle) {
        if self.visible == Some(handle) {
            self.visible = None;
        }
        info!(handle = handle.0, "stimulus hidden");
    }
}

/// Fixation state toggled from the keyboard.
#[derive(Debug)]
pub struct ManualGaze {
    fixating: AtomicBool,
    stopped: AtomicBool,
}

impl ManualGaze {
    pub fn new() -> Self {
        Self {
            fixating: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn set_fixating(&self, fixating: bool) {
        self.fixating.store(fixating, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

impl Default for ManualGaze {
    fn default() -> Self {
        Self::new()
    }
}

impl GazeOracle for ManualGaze {
    fn is_fixating_active_stimulus(&self) -> bool {
        !self.is_stopped() && self.fixating.load(Ordering::Relaxed)
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::Relaxed) {
            info!("gaze tracking stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_distinct() {
        let mut display = ConsoleDisplay::default();
        let a = display.show(Position::new(0.0, 0.0, 1.0), 1.0);
        display.hide(a);
        let b = display.show(Position::new(1.0, 0.0, 1.0), 0.8);
        assert_ne!(a, b);
        assert_eq!(display.visible, Some(b));
    }

    #[test]
    fn stopped_gaze_never_fixates() {
        let gaze = ManualGaze::new();
        gaze.set_fixating(true);
        assert!(gaze.is_fixating_active_stimulus());
        gaze.stop();
        assert!(gaze.is_stopped());
        assert!(!gaze.is_fixating_active_stimulus());
    }
}
