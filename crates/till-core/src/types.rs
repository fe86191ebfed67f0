//! # Domain Types
//!
//! Core domain types used throughout Till.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌───────────────────┐          ┌───────────────────────┐              │
//! │  │   CashRegister    │ 1      * │     CashMovement      │              │
//! │  │  ───────────────  │◄─────────│  ───────────────────  │              │
//! │  │  id               │          │  id                   │              │
//! │  │  initial_balance  │          │  movement_type        │              │
//! │  │  current_balance? │          │  amount (magnitude)   │              │
//! │  │  status           │          │  created_at (order)   │              │
//! │  └───────────────────┘          │  running_balance?     │              │
//! │                                 └───────────────────────┘              │
//! │                                                                         │
//! │  Caller inputs: NewMovement, OpenRegister, CloseRegister               │
//! │  Source query:  MovementFilters (opaque key/value pairs)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Passthrough Fields
//! Enriched movements carry user attribution and linked sale/purchase
//! metadata. Reconciliation never reads them; they live in `extra` and are
//! re-serialized unchanged for the display layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Movement Type
// =============================================================================

/// The kind of a cash movement.
///
/// Wire values are `INCOME`, `EXPENSE` and `ADJUSTMENT`. Anything else is
/// kept verbatim in [`MovementType::Unknown`] so the row survives into the
/// movement list and can be reported instead of silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MovementType {
    /// Cash entering the drawer. Contributes `+amount`.
    Income,
    /// Cash leaving the drawer. Contributes `-amount`.
    Expense,
    /// Manual correction. The amount is pre-signed and added as-is.
    Adjustment,
    /// A value the upstream sent that this client does not recognize.
    Unknown(String),
}

impl MovementType {
    /// The wire values this client understands.
    pub const KNOWN: [&'static str; 3] = ["INCOME", "EXPENSE", "ADJUSTMENT"];

    /// Parses a wire value, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INCOME" => MovementType::Income,
            "EXPENSE" => MovementType::Expense,
            "ADJUSTMENT" => MovementType::Adjustment,
            _ => MovementType::Unknown(raw.to_string()),
        }
    }

    /// Returns the wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            MovementType::Income => "INCOME",
            MovementType::Expense => "EXPENSE",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Unknown(raw) => raw,
        }
    }

    /// Returns true for the three recognized kinds.
    pub fn is_known(&self) -> bool {
        !matches!(self, MovementType::Unknown(_))
    }
}

impl From<String> for MovementType {
    fn from(raw: String) -> Self {
        MovementType::parse(&raw)
    }
}

impl From<MovementType> for String {
    fn from(kind: MovementType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Register Status
// =============================================================================

/// Lifecycle status of a register session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RegisterStatus {
    /// Accepting movements.
    #[default]
    Open,
    /// Archived; no further movements.
    Closed,
}

impl RegisterStatus {
    /// Parses a wire value, case-insensitively. Unrecognized values are `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" | "opened" | "active" => Some(RegisterStatus::Open),
            "closed" | "archived" => Some(RegisterStatus::Closed),
            _ => None,
        }
    }
}

// =============================================================================
// Balance Source
// =============================================================================

/// Where a register's `current_balance` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSource {
    /// The upstream value was present, non-zero and kept.
    Upstream,
    /// The balance was folded locally from the movement history.
    Reconciled,
}

// =============================================================================
// Cash Register
// =============================================================================

/// A cash drawer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashRegister {
    /// Opaque identifier.
    pub id: String,

    /// Balance declared when the register was opened. Immutable.
    pub initial_balance: Money,

    /// Balance after all movements. `None` when the upstream omitted it.
    pub current_balance: Option<Money>,

    pub status: RegisterStatus,

    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,

    /// User who opened the drawer, if the upstream reports it.
    pub opened_by: Option<String>,

    pub notes: Option<String>,

    /// Passthrough fields not interpreted by this crate.
    #[serde(flatten)]
    #[ts(skip)]
    pub extra: Map<String, Value>,
}

impl CashRegister {
    /// Returns true while the register accepts movements.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == RegisterStatus::Open
    }
}

// =============================================================================
// Cash Movement
// =============================================================================

/// A single cash event against a register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashMovement {
    /// Opaque identifier, unique within the register.
    pub id: String,

    pub register_id: String,

    #[ts(type = "\"INCOME\" | \"EXPENSE\" | \"ADJUSTMENT\" | string")]
    pub movement_type: MovementType,

    /// Magnitude for income/expense; pre-signed delta for adjustments.
    pub amount: Money,

    pub concept: String,

    pub notes: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// Register balance immediately after this movement.
    pub running_balance: Option<Money>,

    /// Passthrough enrichment (user attribution, linked sale/purchase).
    #[serde(flatten)]
    #[ts(skip)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Caller Inputs
// =============================================================================

/// A movement the caller wants to register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewMovement {
    #[ts(type = "\"INCOME\" | \"EXPENSE\" | \"ADJUSTMENT\"")]
    pub movement_type: MovementType,
    pub amount: Money,
    pub concept: String,
    pub notes: Option<String>,
}

impl NewMovement {
    pub fn new(movement_type: MovementType, amount: Money, concept: impl Into<String>) -> Self {
        NewMovement {
            movement_type,
            amount,
            concept: concept.into(),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Request to open a new register session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OpenRegister {
    pub initial_balance: Money,
    pub notes: Option<String>,
}

/// Request to close the active register session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CloseRegister {
    /// Physically counted cash, when the cashier performed a count.
    pub counted_balance: Option<Money>,
    pub notes: Option<String>,
}

// =============================================================================
// Movement Filters
// =============================================================================

/// Opaque query filters forwarded to the movement source unmodified.
///
/// Order is preserved so the same filters always produce the same query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementFilters {
    pairs: Vec<(String, String)>,
}

impl MovementFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an arbitrary key/value pair.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    /// Only movements created at or after `from`.
    pub fn from_date(self, from: DateTime<Utc>) -> Self {
        self.with("from", from.to_rfc3339())
    }

    /// Only movements created at or before `to`.
    pub fn to_date(self, to: DateTime<Utc>) -> Self {
        self.with("to", to.to_rfc3339())
    }

    /// Only movements of one kind.
    pub fn movement_type(self, kind: &MovementType) -> Self {
        self.with("movement_type", kind.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
