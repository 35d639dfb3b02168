use std::path::Path;
use std::process::{Command, Stdio};

use perimetry_core::PostProcessor;
use tracing::{info, warn};

/// Starts an external program with the run's output directory as its only
/// argument. The child is not waited on.
#[derive(Debug, Clone)]
pub struct CommandHandoff {
    program: String,
}

impl CommandHandoff {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl PostProcessor for CommandHandoff {
    fn notify_run_complete(&self, output: &Path) {
        let spawned = Command::new(&self.program)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => info!(
                program = %self.program,
                pid = child.id(),
                output = %output.display(),
                "post-processing started"
            ),
            Err(e) => warn!(program = %self.program, error = %e, "post-processing failed to start"),
        }
    }
}
