//! Core domain types

use std::fmt;

/// Position of a station in the hub's registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationIndex(pub usize);

impl StationIndex {
    /// Create a new station index
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw index
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StationIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "station #{}", self.0)
    }
}
