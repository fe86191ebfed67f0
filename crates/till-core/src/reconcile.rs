//! # Balance Reconciliation
//!
//! Folds a register's movement history into per-movement running balances
//! and an authoritative current balance.
//!
//! ## The Fold
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  initial_balance = 450000                                               │
//! │                                                                         │
//! │  arrival order:  (t=2, EXPENSE 900)   (t=1, INCOME 20000)              │
//! │        │                                                                │
//! │        ▼  stable sort by created_at                                     │
//! │  (t=1, INCOME 20000) ──► 450000 + 20000 = 470000                       │
//! │  (t=2, EXPENSE 900)  ──► 470000 -   900 = 469100                       │
//! │                                                                         │
//! │  current_balance = 469100 (last running balance)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## When To Trust Upstream
//! The backend's `current_balance` is known to come back absent or zeroed
//! for registers with activity. [`resolve`] keeps a non-zero upstream value
//! and recomputes otherwise. This is a compatibility shim for that field,
//! not a general policy: once every movement arrives enriched with its
//! `running_balance`, the shim only ever takes the upstream branch.

use serde::Serialize;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::quality::DataQualityIssue;
use crate::types::{BalanceSource, CashMovement, CashRegister, MovementType};
use crate::validation::validate_register_id;

// =============================================================================
// Contribution
// =============================================================================

/// Signed effect of one movement on the register balance.
///
/// | type       | contribution |
/// |------------|--------------|
/// | INCOME     | `+amount`    |
/// | EXPENSE    | `-amount`    |
/// | ADJUSTMENT | `amount` (pre-signed) |
///
/// Unknown types and impossible amounts return the issue instead; callers
/// treat that as a zero contribution.
pub fn contribution(movement: &CashMovement) -> Result<Money, DataQualityIssue> {
    let malformed = || DataQualityIssue::MalformedAmount {
        movement_id: movement.id.clone(),
        movement_type: movement.movement_type.to_string(),
        amount: movement.amount,
    };

    match &movement.movement_type {
        MovementType::Income if movement.amount.is_positive() => Ok(movement.amount),
        MovementType::Expense if movement.amount.is_positive() => Ok(-movement.amount),
        MovementType::Adjustment if !movement.amount.is_zero() => Ok(movement.amount),
        MovementType::Unknown(raw) => Err(DataQualityIssue::UnknownMovementType {
            movement_id: movement.id.clone(),
            raw: raw.clone(),
        }),
        _ => Err(malformed()),
    }
}

/// Sorts movements oldest first. The sort is stable, so movements sharing a
/// timestamp keep their arrival order.
pub fn sort_chronologically(movements: &mut [CashMovement]) {
    movements.sort_by_key(|m| m.created_at);
}

/// Balance after adding one movement to `balance`.
///
/// A movement that cannot be interpreted, or whose contribution would
/// overflow the balance, leaves the balance unchanged and yields its issue.
fn step(balance: Money, movement: &CashMovement) -> (Money, Option<DataQualityIssue>) {
    match contribution(movement) {
        Ok(delta) => match balance.checked_add(delta) {
            Some(next) => (next, None),
            None => (balance, Some(overflow(movement))),
        },
        Err(issue) => (balance, Some(issue)),
    }
}

fn overflow(movement: &CashMovement) -> DataQualityIssue {
    DataQualityIssue::BalanceOverflow {
        movement_id: movement.id.clone(),
        amount: movement.amount,
    }
}

/// Writes the running balance of every movement of an already sorted slice
/// and returns the final balance.
///
/// With `keep_upstream`, a running balance the source already supplied is
/// kept and the chain continues from it, so gaps are filled relative to the
/// nearest upstream value.
fn fold_balances(
    initial_balance: Money,
    movements: &mut [CashMovement],
    keep_upstream: bool,
) -> (Money, Vec<DataQualityIssue>) {
    let mut issues = Vec::new();
    let mut balance = initial_balance;

    for movement in movements.iter_mut() {
        match movement.running_balance {
            Some(upstream) if keep_upstream => {
                if let Err(issue) = contribution(movement) {
                    issues.push(issue);
                }
                balance = upstream;
            }
            _ => {
                let (next, issue) = step(balance, movement);
                issues.extend(issue);
                balance = next;
                movement.running_balance = Some(balance);
            }
        }
    }

    (balance, issues)
}

// =============================================================================
// Full Reconciliation
// =============================================================================

/// Output of [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Movements sorted oldest first, each with `running_balance` set.
    pub movements: Vec<CashMovement>,
    pub current_balance: Money,
    pub issues: Vec<DataQualityIssue>,
}

/// Recomputes every running balance from `initial_balance`.
///
/// Pure and deterministic: the same movements (in any arrival order, given
/// distinct timestamps) always produce the same result. Upstream running
/// balances are overwritten.
pub fn reconcile(initial_balance: Money, mut movements: Vec<CashMovement>) -> Reconciliation {
    sort_chronologically(&mut movements);
    let (current_balance, issues) = fold_balances(initial_balance, &mut movements, false);

    Reconciliation {
        current_balance,
        movements,
        issues,
    }
}

/// Decides whether the upstream `current_balance` must be recomputed.
///
/// - absent: always recompute
/// - zero: trusted only for a brand-new register (no movements, zero float)
/// - anything else: trusted
pub fn needs_reconciliation(upstream: Option<Money>, initial_balance: Money, movement_count: usize) -> bool {
    match upstream {
        None => true,
        Some(balance) if balance.is_zero() => !(movement_count == 0 && initial_balance.is_zero()),
        Some(_) => false,
    }
}

// =============================================================================
// Resolved Register
// =============================================================================

/// A register together with its ordered movement history, with every
/// balance filled in.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct ResolvedRegister {
    /// The register; `current_balance` is always `Some` after resolution.
    pub register: CashRegister,
    /// Movements oldest first; every `running_balance` is `Some`.
    pub movements: Vec<CashMovement>,
    pub balance_source: BalanceSource,
    /// Issues found during the last full resolution.
    pub issues: Vec<DataQualityIssue>,
}

/// Combines a fetched register and its movements into a consistent view.
///
/// When [`needs_reconciliation`] says so, the fold result replaces the
/// register balance and every movement's running balance. Otherwise the
/// upstream balance is kept, upstream running balances are kept, and a
/// missing running balance continues from the movement before it.
pub fn resolve(mut register: CashRegister, mut movements: Vec<CashMovement>) -> ResolvedRegister {
    sort_chronologically(&mut movements);

    let recompute = needs_reconciliation(
        register.current_balance,
        register.initial_balance,
        movements.len(),
    );

    let (balance_source, issues) = match (register.current_balance, recompute) {
        (Some(_), false) => {
            let (_, issues) = fold_balances(register.initial_balance, &mut movements, true);
            (BalanceSource::Upstream, issues)
        }
        _ => {
            let (current, issues) = fold_balances(register.initial_balance, &mut movements, false);
            register.current_balance = Some(current);
            (BalanceSource::Reconciled, issues)
        }
    };

    ResolvedRegister {
        register,
        movements,
        balance_source,
        issues,
    }
}

impl ResolvedRegister {
    /// The register's current balance.
    pub fn current_balance(&self) -> Money {
        self.register
            .current_balance
            .unwrap_or(self.register.initial_balance)
    }

    /// Adds one new movement without re-fetching the history.
    ///
    /// The movement is inserted after every movement with the same or an
    /// earlier `created_at`. Its running balance continues from the movement
    /// before it, and every later running balance, as well as the register
    /// balance, moves by its contribution. For a reconciled register this is
    /// exactly what a full [`reconcile`] would produce. For an upstream
    /// balance it keeps append and late insertion consistent: both shift
    /// the upstream value by the same delta. A running balance supplied by
    /// the source is kept when the movement lands at the end.
    ///
    /// Returns the data-quality issue for the new movement, if any.
    pub fn apply(&mut self, mut movement: CashMovement) -> CoreResult<Option<DataQualityIssue>> {
        validate_register_id(&movement.register_id)?;
        if movement.register_id != self.register.id {
            return Err(CoreError::RegisterMismatch {
                movement_id: movement.id,
                expected: self.register.id.clone(),
                actual: movement.register_id,
            });
        }
        if !self.register.is_open() {
            return Err(CoreError::RegisterClosed(self.register.id.clone()));
        }

        let at = self
            .movements
            .partition_point(|m| m.created_at <= movement.created_at);
        let appended = at == self.movements.len();
        let current = self.current_balance();

        let base = if appended {
            current
        } else if at == 0 {
            self.register.initial_balance
        } else {
            self.movements[at - 1]
                .running_balance
                .unwrap_or(self.register.initial_balance)
        };

        let (mut delta, mut issue) = match contribution(&movement) {
            Ok(delta) => (delta, None),
            Err(issue) => (Money::zero(), Some(issue)),
        };
        if issue.is_none() && !self.can_shift(at, base, current, delta) {
            issue = Some(overflow(&movement));
            delta = Money::zero();
        }

        let shifted = |balance: Money| balance.checked_add(delta).unwrap_or(balance);

        let running = match movement.running_balance {
            Some(upstream) if appended => upstream,
            _ => shifted(base),
        };
        movement.running_balance = Some(running);

        for later in &mut self.movements[at..] {
            later.running_balance = later.running_balance.map(shifted);
        }
        self.movements.insert(at, movement);

        self.register.current_balance = Some(if appended { running } else { shifted(current) });
        if let Some(ref issue) = issue {
            self.issues.push(issue.clone());
        }

        Ok(issue)
    }

    /// Whether every balance touched by inserting at `at` can absorb `delta`.
    fn can_shift(&self, at: usize, base: Money, current: Money, delta: Money) -> bool {
        base.checked_add(delta).is_some()
            && current.checked_add(delta).is_some()
            && self.movements[at..]
                .iter()
                .filter_map(|m| m.running_balance)
                .all(|balance| balance.checked_add(delta).is_some())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
