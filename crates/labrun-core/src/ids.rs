//! Newtype wrapper for run identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier for a Run, assigned by the store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(i64);

impl RunId {
    /// Create a new RunId from its numeric value.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the numeric value.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RunId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for RunId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        let id = RunId::new(42);
        assert_eq!(format!("{}", id), "42");
    }

    #[test]
    fn test_id_ordering() {
        assert!(RunId::new(1) < RunId::new(2));
    }

    #[test]
    fn test_id_parse() {
        assert_eq!("7".parse::<RunId>().unwrap(), RunId::new(7));
        assert!("abc".parse::<RunId>().is_err());
    }
}
