//! Stimulus plan loading.
//!
//! The plan is a line-oriented text file:
//!
//! ```text
//! 3            total stimulus count
//! 2.0          response time limit, seconds
//! <0,0,0>      one position per line, angle brackets optional
//! 1,1,1
//! <0,0,0>
//! ```
//!
//! Blank lines are ignored. Exactly `count` position lines must be present;
//! a surplus is tolerated and dropped with a warning.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{PerimetryError, Result};
use crate::position::Position;

/// Immutable sequence of stimulus positions for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusPlan {
    response_time_limit: Duration,
    positions: Vec<Position>,
}

impl StimulusPlan {
    pub fn new(response_time_limit: Duration, positions: Vec<Position>) -> Result<Self> {
        if positions.is_empty() {
            return Err(PerimetryError::malformed(0, "plan declares no stimuli"));
        }
        if response_time_limit.is_zero() {
            return Err(PerimetryError::malformed(
                0,
                "response time limit must be positive",
            ));
        }
        Ok(Self {
            response_time_limit,
            positions,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PerimetryError::malformed(0, format!("cannot read {}: {e}", path.display()))
        })?;
        let plan = Self::parse(&text)?;
        debug!(
            path = %path.display(),
            stimuli = plan.total_stimuli(),
            "stimulus plan loaded"
        );
        Ok(plan)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let (count_line, raw) = lines
            .next()
            .ok_or_else(|| PerimetryError::malformed(1, "missing stimulus count"))?;
        let count = raw
            .parse::<usize>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                PerimetryError::malformed(
                    count_line,
                    format!("stimulus count {raw:?} is not a positive integer"),
                )
            })?;

        let (limit_line, raw) = lines.next().ok_or_else(|| {
            PerimetryError::malformed(count_line + 1, "missing response time limit")
        })?;
        let limit = raw
            .parse::<f64>()
            .ok()
            .filter(|s| *s > 0.0)
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .ok_or_else(|| {
                PerimetryError::malformed(
                    limit_line,
                    format!("response time limit {raw:?} is not a positive number"),
                )
            })?;

        let mut positions = Vec::new();
        let mut surplus = 0usize;
        for (line, raw) in lines {
            let position = raw
                .parse::<Position>()
                .map_err(|e| PerimetryError::malformed(line, e.to_string()))?;
            if positions.len() < count {
                positions.push(position);
            } else {
                surplus += 1;
            }
        }

        if positions.len() < count {
            return Err(PerimetryError::malformed(
                0,
                format!(
                    "plan declares {count} stimuli but only {} position lines are present",
                    positions.len()
                ),
            ));
        }
        if surplus > 0 {
            warn!(surplus, count, "ignoring position lines beyond declared count");
        }

        Self::new(limit, positions)
    }

    pub fn total_stimuli(&self) -> usize {
        self.positions.len()
    }

    pub fn response_time_limit(&self) -> Duration {
        self.response_time_limit
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Position for the 0-based presentation slot.
    pub fn position(&self, slot: usize) -> Option<Position> {
        self.positions.get(slot).copied()
    }

    /// Distinct positions in order of first appearance.
    pub fn unique_positions(&self) -> Vec<Position> {
        let mut seen = std::collections::HashSet::new();
        self.positions
            .iter()
            .copied()
            .filter(|p| seen.insert(*p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_positions() {
        let plan = StimulusPlan::parse("3\n2.5\n<0,0,0>\n1,1,1\n<0,0,0>\n").unwrap();
        assert_eq!(plan.total_stimuli(), 3);
        assert_eq!(plan.response_time_limit(), Duration::from_millis(2500));
        assert_eq!(plan.position(1), Some(Position::new(1.0, 1.0, 1.0)));
        assert_eq!(plan.position(3), None);
        assert_eq!(plan.unique_positions().len(), 2);
    }

    #[test]
    fn huge_declared_count_is_malformed() {
        let err = StimulusPlan::parse(&format!("{}\n1.0\n0,0,0\n", usize::MAX)).unwrap_err();
        assert!(matches!(err, PerimetryError::MalformedPlan { line: 0, .. }), "{err}");
    }

    #[test]
    fn short_plan_is_malformed_not_out_of_range() {
        let err = StimulusPlan::parse("3\n1.0\n<0.5,0.5,0>\n").unwrap_err();
        match err {
            PerimetryError::MalformedPlan { reason, .. } => {
                assert!(reason.contains("declares 3"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn surplus_positions_are_dropped() {
        let plan = StimulusPlan::parse("1\n1.0\n0,0,0\n1,1,1\n").unwrap();
        assert_eq!(plan.positions(), &[Position::new(0.0, 0.0, 0.0)]);
    }

    #[test]
    fn bad_lines_report_their_line_number() {
        let err = StimulusPlan::parse("2\n1.0\n0,0,0\n\n0,zero,0\n").unwrap_err();
        assert!(matches!(err, PerimetryError::MalformedPlan { line: 5, .. }));

        let err = StimulusPlan::parse("two\n1.0\n").unwrap_err();
        assert!(matches!(err, PerimetryError::MalformedPlan { line: 1, .. }));

        let err = StimulusPlan::parse("1\n-1\n0,0,0\n").unwrap_err();
        assert!(matches!(err, PerimetryError::MalformedPlan { line: 2, .. }));
    }

    #[test]
    fn zero_count_and_empty_input_are_rejected() {
        assert!(StimulusPlan::parse("0\n1.0\n").is_err());
        assert!(StimulusPlan::parse("").is_err());
        assert!(StimulusPlan::parse("2\n").is_err());
    }
}
