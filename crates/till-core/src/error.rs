//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core errors (this file)                                          │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Caller input rejected before any remote call   │
//! │                                                                         │
//! │  till-client errors (separate crate)                                   │
//! │  └── ClientError      - Transport, decode, cache lifecycle failures    │
//! │                                                                         │
//! │  NOT an error: DataQualityIssue (reconcile.rs) is reported, never      │
//! │  propagated. Bad upstream rows must not abort a reconciliation.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Cash register domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A decimal amount could not be converted to [`crate::Money`].
    #[error("Invalid amount '{raw}': {reason}")]
    InvalidAmount { raw: String, reason: String },

    /// A movement was applied to a register it does not belong to.
    ///
    /// ## When This Occurs
    /// - A late submission response arrives after the cache switched registers
    /// - A caller passes a movement fetched for another drawer
    #[error("Movement {movement_id} belongs to register {actual}, not {expected}")]
    RegisterMismatch {
        movement_id: String,
        expected: String,
        actual: String,
    },

    /// The register is closed and no longer accepts movements.
    #[error("Register {0} is closed")]
    RegisterClosed(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised synchronously before a submission reaches the network.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustNotBeZero { field: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::RegisterMismatch {
            movement_id: "m-9".to_string(),
            expected: "reg-1".to_string(),
            actual: "reg-2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Movement m-9 belongs to register reg-2, not reg-1"
        );

        let err = CoreError::InvalidAmount {
            raw: "1.005".to_string(),
            reason: "more than two fractional digits".to_string(),
        };
        assert!(err.to_string().contains("1.005"));
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "concept".to_string(),
        };
        assert_eq!(err.to_string(), "concept is required");

        let err = ValidationError::MustBePositive {
            field: "amount".to_string(),
        };
        assert_eq!(err.to_string(), "amount must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "concept".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
