use std::fmt;
use std::str::FromStr;

use crate::errors::CoordinatorError;

/// Minimum number of replica acknowledgements required before a write is
/// reported successful to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConsistencyLevel {
    Any,
    One,
    Quorum,
    All,
}

impl ConsistencyLevel {
    /// Number of acknowledgements required out of `num_owners` replicas.
    pub fn required(self, num_owners: usize) -> usize {
        match self {
            ConsistencyLevel::Any | ConsistencyLevel::One => 1,
            ConsistencyLevel::Quorum => num_owners / 2 + 1,
            ConsistencyLevel::All => num_owners,
        }
    }
}

impl Default for ConsistencyLevel {
    fn default() -> Self {
        ConsistencyLevel::One
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsistencyLevel::Any => "any",
            ConsistencyLevel::One => "one",
            ConsistencyLevel::Quorum => "quorum",
            ConsistencyLevel::All => "all",
        };
        f.write_str(s)
    }
}

impl FromStr for ConsistencyLevel {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(ConsistencyLevel::Any),
            "one" => Ok(ConsistencyLevel::One),
            "quorum" => Ok(ConsistencyLevel::Quorum),
            "all" => Ok(ConsistencyLevel::All),
            _ => Err(CoordinatorError::InvalidConsistencyLevel(s.to_string())),
        }
    }
}
