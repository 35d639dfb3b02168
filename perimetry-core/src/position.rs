use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canvas-local stimulus coordinate.
///
/// Positions come from a closed list in the plan file and are never computed,
/// so equality and hashing compare the exact bit patterns of the three
/// components. Two positions that differ only by rounding are different keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    fn bits(&self) -> [u32; 3] {
        [self.x.to_bits(), self.y.to_bits(), self.z.to_bits()]
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Position {}

impl Hash for Position {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionParseError {
    #[error("expected 3 comma-separated coordinates, found {0}")]
    Arity(usize),
    #[error("coordinate {0:?} is not a number")]
    NotANumber(String),
}

impl FromStr for Position {
    type Err = PositionParseError;

    /// Accepts `x,y,z`, `<x,y,z>` and the `(x, y, z)` form written by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim().trim_matches(|c| matches!(c, '<' | '>' | '(' | ')'));
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(PositionParseError::Arity(parts.len()));
        }
        let mut coords = [0.0f32; 3];
        for (slot, part) in coords.iter_mut().zip(&parts) {
            *slot = part
                .parse::<f32>()
                .map_err(|_| PositionParseError::NotANumber(part.to_string()))?;
        }
        Ok(Position::new(coords[0], coords[1], coords[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_bracketed_and_bare_forms() {
        let bare: Position = "1.5,-2,0.25".parse().unwrap();
        let angled: Position = "<1.5,-2,0.25>".parse().unwrap();
        let display: Position = "(1.5, -2, 0.25)".parse().unwrap();
        assert_eq!(bare, Position::new(1.5, -2.0, 0.25));
        assert_eq!(bare, angled);
        assert_eq!(bare, display);
    }

    #[test]
    fn rejects_wrong_arity_and_garbage() {
        assert_eq!(
            "1,2".parse::<Position>().unwrap_err(),
            PositionParseError::Arity(2)
        );
        assert!(matches!(
            "1,two,3".parse::<Position>(),
            Err(PositionParseError::NotANumber(_))
        ));
    }

    #[test]
    fn display_round_trips_exactly() {
        let p = Position::new(0.1, -3.75, 12.0);
        let back: Position = p.to_string().parse().unwrap();
        assert_eq!(p, back);
        assert_eq!(Position::new(0.0, 1.0, 2.5).to_string(), "(0, 1, 2.5)");
    }

    #[test]
    fn equal_positions_share_a_map_entry() {
        let mut map = HashMap::new();
        map.insert(Position::new(0.3, 0.2, 0.0), 1);
        *map.entry("0.3,0.2,0".parse::<Position>().unwrap()).or_insert(0) += 1;
        assert_eq!(map.len(), 1);
        assert_eq!(map[&Position::new(0.3, 0.2, 0.0)], 2);
    }
}
