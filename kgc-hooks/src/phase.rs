//! Lifecycle phases
//!
//! Ten phases in the fixed order they execute within a transaction. Hooks
//! subscribe to phases; the pipeline never reorders them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hook lifecycle phase, in execution order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    PreIngestion,
    OnChange,
    PreValidation,
    PostValidation,
    PreTransaction,
    PostCommit,
    PostTransaction,
    OnError,
    PreQuery,
    PostQuery,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 10] = [
        Phase::PreIngestion,
        Phase::OnChange,
        Phase::PreValidation,
        Phase::PostValidation,
        Phase::PreTransaction,
        Phase::PostCommit,
        Phase::PostTransaction,
        Phase::OnError,
        Phase::PreQuery,
        Phase::PostQuery,
    ];

    /// PRE_* phases may veto by setting `should_rollback`
    pub fn can_veto(self) -> bool {
        matches!(
            self,
            Phase::PreIngestion | Phase::PreValidation | Phase::PreTransaction | Phase::PreQuery
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::PreIngestion => "PRE_INGESTION",
            Phase::OnChange => "ON_CHANGE",
            Phase::PreValidation => "PRE_VALIDATION",
            Phase::PostValidation => "POST_VALIDATION",
            Phase::PreTransaction => "PRE_TRANSACTION",
            Phase::PostCommit => "POST_COMMIT",
            Phase::PostTransaction => "POST_TRANSACTION",
            Phase::OnError => "ON_ERROR",
            Phase::PreQuery => "PRE_QUERY",
            Phase::PostQuery => "POST_QUERY",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown phase: {}", s))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_execution_order() {
        let mut sorted = Phase::ALL;
        sorted.sort();
        assert_eq!(sorted, Phase::ALL);
        assert!(Phase::PreTransaction < Phase::PostCommit);
        assert!(Phase::PostCommit < Phase::PostTransaction);
    }

    #[test]
    fn test_round_trip() {
        for phase in Phase::ALL {
            assert_eq!(Phase::from_str(phase.as_str()).unwrap(), phase);
        }
        assert!(Phase::from_str("MID_FLIGHT").is_err());
    }

    #[test]
    fn test_veto_phases() {
        assert!(Phase::PreTransaction.can_veto());
        assert!(!Phase::PostCommit.can_veto());
    }

    #[test]
    fn test_serde_wire_names() {
        let json = serde_json::to_string(&Phase::PreTransaction).unwrap();
        assert_eq!(json, "\"PRE_TRANSACTION\"");
    }
}
