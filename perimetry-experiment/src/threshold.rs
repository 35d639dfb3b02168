//! Per-position 1-up/1-down staircase on stimulus opacity.

use std::collections::HashMap;

use perimetry_core::{PerimetryError, Position, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaircaseParams {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEntry {
    pub position: Position,
    pub threshold: f32,
}

/// One opacity value per distinct plan position, always inside `[min, max]`.
///
/// Entries start at `max`, the most visible setting.
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    params: StaircaseParams,
    values: HashMap<Position, f32>,
    order: Vec<Position>,
}

impl ThresholdTable {
    pub fn new(params: StaircaseParams, positions: &[Position]) -> Self {
        let mut values = HashMap::with_capacity(positions.len());
        let mut order = Vec::new();
        for &p in positions {
            if values.insert(p, params.max).is_none() {
                order.push(p);
            }
        }
        Self {
            params,
            values,
            order,
        }
    }

    pub fn get(&self, position: &Position) -> Result<f32> {
        self.values
            .get(position)
            .copied()
            .ok_or(PerimetryError::UnknownPosition(*position))
    }

    /// Steps the threshold down after a fixated presentation (harder next
    /// time), up otherwise. Returns the new value.
    pub fn adjust(&mut self, position: &Position, saw_fixation: bool) -> Result<f32> {
        let StaircaseParams { min, max, step } = self.params;
        let value = self
            .values
            .get_mut(position)
            .ok_or(PerimetryError::UnknownPosition(*position))?;
        *value = if saw_fixation {
            (*value - step).max(min)
        } else {
            (*value + step).min(max)
        };
        Ok(*value)
    }

    pub fn params(&self) -> StaircaseParams {
        self.params
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Snapshot in order of first appearance in the plan.
    pub fn entries(&self) -> Vec<ThresholdEntry> {
        self.order
            .iter()
            .map(|p| ThresholdEntry {
                position: *p,
                threshold: self.values[p],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PARAMS: StaircaseParams = StaircaseParams {
        min: 0.4,
        max: 1.0,
        step: 0.2,
    };

    fn origin() -> Position {
        Position::new(0.0, 0.0, 0.0)
    }

    #[test]
    fn starts_at_ceiling_with_one_entry_per_position() {
        let far = Position::new(1.0, 1.0, 1.0);
        let table = ThresholdTable::new(PARAMS, &[origin(), far, origin()]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&origin()).unwrap(), 1.0);
        assert_eq!(
            table.entries().iter().map(|e| e.position).collect::<Vec<_>>(),
            vec![origin(), far]
        );
    }

    #[test]
    fn fixation_steps_down_to_the_floor() {
        let mut table = ThresholdTable::new(PARAMS, &[origin()]);
        let first = table.adjust(&origin(), true).unwrap();
        assert!((first - 0.8).abs() < 1e-6);
        table.adjust(&origin(), true).unwrap();
        table.adjust(&origin(), true).unwrap();
        assert_eq!(table.adjust(&origin(), true).unwrap(), 0.4);
    }

    #[test]
    fn missed_fixation_steps_up_to_the_ceiling() {
        let mut table = ThresholdTable::new(PARAMS, &[origin()]);
        assert_eq!(table.adjust(&origin(), false).unwrap(), 1.0);
        table.adjust(&origin(), true).unwrap();
        table.adjust(&origin(), true).unwrap();
        let raised = table.adjust(&origin(), false).unwrap();
        assert!((raised - 0.8).abs() < 1e-6);
    }

    #[test]
    fn unknown_position_is_an_error() {
        let mut table = ThresholdTable::new(PARAMS, &[origin()]);
        let stray = Position::new(9.0, 9.0, 9.0);
        assert!(matches!(
            table.get(&stray),
            Err(PerimetryError::UnknownPosition(p)) if p == stray
        ));
        assert!(table.adjust(&stray, true).is_err());
    }

    proptest! {
        #[test]
        fn thresholds_never_leave_bounds(steps in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut table = ThresholdTable::new(PARAMS, &[origin()]);
            for fixated in steps {
                let before = table.get(&origin()).unwrap();
                let after = table.adjust(&origin(), fixated).unwrap();
                prop_assert!((PARAMS.min..=PARAMS.max).contains(&after));
                if fixated {
                    prop_assert!(after < before || after == PARAMS.min);
                } else {
                    prop_assert!(after > before || after == PARAMS.max);
                }
            }
        }
    }
}
