pub mod config;
pub mod log;
pub mod run_dir;
pub mod state;
pub mod threshold;
mod trial;
pub use config::ExperimentConfig;
pub use log::{LogSinks, RunInfo, RunSummary, TrialLog};
pub use run_dir::RunDirectory;
pub use state::{
    RunOutcome, RunReport, ShutdownHandle, StimulusScheduler, SuspensionPoint, TriggerHandle,
    TriggerOutcome,
};
pub use threshold::{StaircaseParams, ThresholdEntry, ThresholdTable};
