//! Data-quality issues found while folding upstream movements.
//!
//! An issue is never fatal: the offending movement stays in the list,
//! contributes zero to the running balance, and the issue is handed to the
//! caller so it can be reported.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

/// A movement the reconciler could not interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityIssue {
    /// `movement_type` is not INCOME, EXPENSE or ADJUSTMENT.
    UnknownMovementType { movement_id: String, raw: String },

    /// The amount cannot be right for the movement type (non-positive
    /// income/expense, zero adjustment).
    MalformedAmount {
        movement_id: String,
        movement_type: String,
        amount: Money,
    },

    /// Adding the movement would overflow the running balance.
    BalanceOverflow { movement_id: String, amount: Money },
}

impl DataQualityIssue {
    /// Identifier of the movement the issue was found on.
    pub fn movement_id(&self) -> &str {
        match self {
            DataQualityIssue::UnknownMovementType { movement_id, .. }
            | DataQualityIssue::MalformedAmount { movement_id, .. }
            | DataQualityIssue::BalanceOverflow { movement_id, .. } => movement_id,
        }
    }

    /// Stable machine-readable code for telemetry.
    pub fn code(&self) -> &'static str {
        match self {
            DataQualityIssue::UnknownMovementType { .. } => "unknown_movement_type",
            DataQualityIssue::MalformedAmount { .. } => "malformed_amount",
            DataQualityIssue::BalanceOverflow { .. } => "balance_overflow",
        }
    }
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityIssue::UnknownMovementType { movement_id, raw } => {
                write!(f, "movement {movement_id} has unknown type '{raw}'")
            }
            DataQualityIssue::MalformedAmount {
                movement_id,
                movement_type,
                amount,
            } => write!(
                f,
                "movement {movement_id} ({movement_type}) has malformed amount {amount}"
            ),
            DataQualityIssue::BalanceOverflow {
                movement_id,
                amount,
            } => write!(f, "movement {movement_id} amount {amount} overflows the balance"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_accessors() {
        let issue = DataQualityIssue::UnknownMovementType {
            movement_id: "m-3".to_string(),
            raw: "UNKNOWN".to_string(),
        };
        assert_eq!(issue.movement_id(), "m-3");
        assert_eq!(issue.code(), "unknown_movement_type");
        assert_eq!(issue.to_string(), "movement m-3 has unknown type 'UNKNOWN'");
    }

    #[test]
    fn test_issue_serializes_with_kind_tag() {
        let issue = DataQualityIssue::MalformedAmount {
            movement_id: "m-4".to_string(),
            movement_type: "EXPENSE".to_string(),
            amount: Money::from_minor(-500),
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["kind"], "malformed_amount");
        assert_eq!(json["amount"], -500);
    }
}
