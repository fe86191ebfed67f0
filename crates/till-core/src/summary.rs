//! Per-type totals for a register's movement list.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::reconcile::contribution;
use crate::types::{CashMovement, MovementType};

/// Totals shown next to the movement list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementSummary {
    pub income_total: Money,
    pub expense_total: Money,
    /// Signed sum of adjustments.
    pub adjustment_total: Money,
    /// `income_total - expense_total + adjustment_total`.
    pub net_change: Money,
    pub income_count: usize,
    pub expense_count: usize,
    pub adjustment_count: usize,
    /// Movements left out of the totals for data-quality reasons.
    pub flagged_count: usize,
}

/// Summarizes a movement list. Order does not matter.
pub fn summarize(movements: &[CashMovement]) -> MovementSummary {
    let mut summary = MovementSummary::default();

    for movement in movements {
        let Ok(delta) = contribution(movement) else {
            summary.flagged_count += 1;
            continue;
        };
        let (total, count) = match movement.movement_type {
            MovementType::Income => (&mut summary.income_total, &mut summary.income_count),
            MovementType::Expense => (&mut summary.expense_total, &mut summary.expense_count),
            MovementType::Adjustment => {
                (&mut summary.adjustment_total, &mut summary.adjustment_count)
            }
            MovementType::Unknown(_) => {
                summary.flagged_count += 1;
                continue;
            }
        };

        // A movement that would overflow either total is flagged instead.
        match (
            total.checked_add(movement.amount),
            summary.net_change.checked_add(delta),
        ) {
            (Some(new_total), Some(net_change)) => {
                *total = new_total;
                *count += 1;
                summary.net_change = net_change;
            }
            _ => summary.flagged_count += 1,
        }
    }

    summary
}
