//! Population counts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of running instances of one agent type
///
/// `Unknown` means no count was ever fetched successfully. It is distinct
/// from `Known { count: 0, .. }`, which means the backend reported zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PopulationCount {
    #[default]
    Unknown,
    Known {
        count: u64,
        as_of: DateTime<Utc>,
    },
}

impl PopulationCount {
    pub fn known(count: u64) -> Self {
        Self::Known {
            count,
            as_of: Utc::now(),
        }
    }

    /// The last reported count, `None` when unknown
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Unknown => None,
            Self::Known { count, .. } => Some(*count),
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known { .. })
    }

    pub fn as_of(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Unknown => None,
            Self::Known { as_of, .. } => Some(*as_of),
        }
    }
}

impl fmt::Display for PopulationCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Known { count, .. } => write!(f, "{}", count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_is_not_zero() {
        let unknown = PopulationCount::default();
        let zero = PopulationCount::known(0);
        assert_eq!(unknown.count(), None);
        assert_eq!(zero.count(), Some(0));
        assert_ne!(unknown, zero);
        assert_eq!(unknown.to_string(), "unknown");
        assert_eq!(zero.to_string(), "0");
    }
}
