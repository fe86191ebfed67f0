//! # Validation Module
//!
//! Pre-submission checks for caller-supplied register input.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Front end form                                               │
//! │  └── Immediate user feedback (out of scope here)                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Runs synchronously, before any network call                       │
//! │  └── A failure here never reaches the backend                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: ERP backend                                                  │
//! │  └── Authoritative checks (4xx rejections)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use till_core::money::Money;
//! use till_core::types::{MovementType, NewMovement};
//! use till_core::validation::validate_new_movement;
//!
//! let ok = NewMovement::new(MovementType::Income, Money::from_major(100), "Sale #1");
//! assert!(validate_new_movement(&ok).is_ok());
//!
//! let empty = NewMovement::new(MovementType::Income, Money::from_major(100), "  ");
//! assert!(validate_new_movement(&empty).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{CloseRegister, MovementType, NewMovement, OpenRegister};
use crate::{MAX_CONCEPT_LEN, MAX_NOTES_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a movement concept.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most `MAX_CONCEPT_LEN` characters
pub fn validate_concept(concept: &str) -> ValidationResult<()> {
    let concept = concept.trim();

    if concept.is_empty() {
        return Err(ValidationError::Required {
            field: "concept".to_string(),
        });
    }

    if concept.chars().count() > MAX_CONCEPT_LEN {
        return Err(ValidationError::TooLong {
            field: "concept".to_string(),
            max: MAX_CONCEPT_LEN,
        });
    }

    Ok(())
}

/// Validates optional free-text notes.
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<()> {
    match notes {
        Some(n) if n.chars().count() > MAX_NOTES_LEN => Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_NOTES_LEN,
        }),
        _ => Ok(()),
    }
}

/// Validates the amount for a given movement type.
///
/// ## Rules
/// - INCOME / EXPENSE: strictly positive magnitude
/// - ADJUSTMENT: pre-signed, any non-zero value
/// - Unknown types are rejected outright
pub fn validate_movement_amount(kind: &MovementType, amount: Money) -> ValidationResult<()> {
    match kind {
        MovementType::Income | MovementType::Expense => {
            if !amount.is_positive() {
                return Err(ValidationError::MustBePositive {
                    field: "amount".to_string(),
                });
            }
        }
        MovementType::Adjustment => {
            if amount.is_zero() {
                return Err(ValidationError::MustNotBeZero {
                    field: "amount".to_string(),
                });
            }
        }
        MovementType::Unknown(_) => {
            return Err(ValidationError::NotAllowed {
                field: "movement_type".to_string(),
                allowed: MovementType::KNOWN.iter().map(|s| s.to_string()).collect(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Request Validators
// =============================================================================

/// Validates a movement before submission.
pub fn validate_new_movement(movement: &NewMovement) -> ValidationResult<()> {
    validate_movement_amount(&movement.movement_type, movement.amount)?;
    validate_concept(&movement.concept)?;
    validate_notes(movement.notes.as_deref())?;
    Ok(())
}

/// Validates a register opening request.
///
/// A drawer may open empty, but never with a negative float.
pub fn validate_open_register(req: &OpenRegister) -> ValidationResult<()> {
    if req.initial_balance.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "initial_balance".to_string(),
        });
    }
    validate_notes(req.notes.as_deref())
}

/// Validates a register closing request.
pub fn validate_close_register(req: &CloseRegister) -> ValidationResult<()> {
    if matches!(req.counted_balance, Some(b) if b.is_negative()) {
        return Err(ValidationError::MustNotBeNegative {
            field: "counted_balance".to_string(),
        });
    }
    validate_notes(req.notes.as_deref())
}

/// Validates an opaque register identifier.
pub fn validate_register_id(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "register_id".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
