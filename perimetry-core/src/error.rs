//! Error taxonomy shared by every perimetry crate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::position::Position;

/// External capability the scheduler can run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Display,
    Gaze,
    PostProcessor,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collaborator::Display => "display sink",
            Collaborator::Gaze => "gaze oracle",
            Collaborator::PostProcessor => "post-processor",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PerimetryError {
    /// Plan file is unreadable or does not match the expected layout.
    /// `line` is 1-based; 0 means the file as a whole.
    #[error("malformed stimulus plan (line {line}): {reason}")]
    MalformedPlan { line: usize, reason: String },

    /// A position was looked up that the plan never declared.
    #[error("no threshold recorded for position {0}")]
    UnknownPosition(Position),

    /// A trial index outside the trials created so far.
    #[error("no trial with index {0}")]
    UnknownTrial(usize),

    #[error("cannot open output destination {path}: {source}")]
    SinkUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Never fatal: rendered into the degraded-mode warning.
    #[error("{0} not attached, running degraded")]
    MissingCollaborator(Collaborator),

    /// A results-sink line that does not match the written layout.
    #[error("malformed results line {line:?}: {reason}")]
    MalformedResults { line: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PerimetryError {
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        PerimetryError::MalformedPlan {
            line,
            reason: reason.into(),
        }
    }

    /// Fatal errors abort a run before any trial state is touched.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PerimetryError::MissingCollaborator(_))
    }
}

pub type Result<T, E = PerimetryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_collaborator_is_not_fatal() {
        assert!(!PerimetryError::MissingCollaborator(Collaborator::Gaze).is_fatal());
        assert!(PerimetryError::malformed(3, "bad").is_fatal());
    }

    #[test]
    fn messages_name_the_problem() {
        let err = PerimetryError::malformed(4, "expected three coordinates");
        assert_eq!(
            err.to_string(),
            "malformed stimulus plan (line 4): expected three coordinates"
        );
        let err = PerimetryError::MissingCollaborator(Collaborator::Display);
        assert_eq!(err.to_string(), "display sink not attached, running degraded");
    }
}
