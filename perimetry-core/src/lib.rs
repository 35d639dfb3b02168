pub mod collaborator;
pub mod error;
pub mod phase;
pub mod plan;
pub mod position;
pub mod trial;

pub use collaborator::{DisplaySink, GazeOracle, PostProcessor, StimulusHandle};
pub use error::{Collaborator, PerimetryError, Result};
pub use phase::SchedulerState;
pub use plan::StimulusPlan;
pub use position::Position;
pub use trial::{Classification, FalsePositiveRecord, TrialRecord};
