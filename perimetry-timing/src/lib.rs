pub mod timer;

pub use timer::{HighPrecisionTimer, MonotonicTimer, Timer};
