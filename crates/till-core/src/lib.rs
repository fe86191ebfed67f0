//! # till-core: Pure Cash Register Logic for Till
//!
//! This crate holds the cash register rules of the Till ERP client as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till Architecture                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    ERP Front End                                │   │
//! │  │    Register panel ──► Movement list ──► New movement form      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ RegisterView (TS bindings)             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              till-client (RegisterCache, REST, retry)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ till-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ reconcile │  │ validation│  │   │
//! │  │   │ Register  │  │   Money   │  │   fold    │  │   rules   │  │   │
//! │  │   │ Movement  │  │  parsing  │  │  resolve  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO LOGGING • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (CashRegister, CashMovement, requests)
//! - [`money`] - Integer money with exact decimal parsing
//! - [`reconcile`] - Running-balance fold and upstream balance resolution
//! - [`quality`] - Data-quality issues reported during the fold
//! - [`summary`] - Per-type movement totals
//! - [`validation`] - Pre-submission checks
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use till_core::money::Money;
//! use till_core::reconcile::reconcile;
//!
//! // No movements: the register sits at its opening float.
//! let result = reconcile(Money::from_major(350_000), Vec::new());
//! assert_eq!(result.current_balance, Money::from_major(350_000));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod quality;
pub mod reconcile;
pub mod summary;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use quality::DataQualityIssue;
pub use reconcile::{reconcile, resolve, Reconciliation, ResolvedRegister};
pub use summary::{summarize, MovementSummary};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a movement concept.
pub const MAX_CONCEPT_LEN: usize = 255;

/// Maximum length of free-text notes on movements and registers.
pub const MAX_NOTES_LEN: usize = 1000;
