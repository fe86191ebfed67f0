//! # till-client: Register Client for Till
//!
//! Loads the active cash register from the ERP backend, reconciles its
//! balances through `till-core`, and keeps the result cached for the front
//! end.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         till-client Components                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                       RegisterCache                             │   │
//! │  │                                                                 │   │
//! │  │  init / refresh / register_movement / open / close / reset     │   │
//! │  │  EMPTY ──► LOADING ──► LOADED   (ERROR on failed fetch)        │   │
//! │  │  last request wins (generation counter)                        │   │
//! │  └──────────────┬──────────────────────────────────┬──────────────┘   │
//! │                 │ retry (Idempotent / NonIdempotent)│ issues           │
//! │  ┌──────────────▼───────────────┐   ┌───────────────▼─────────────┐   │
//! │  │      MovementSource          │   │     DataQualitySink         │   │
//! │  │                              │   │                             │   │
//! │  │  HttpMovementSource (REST)   │   │  TracingSink (default)      │   │
//! │  │  wire DTOs normalized once   │   │  NoOpSink, CollectingSink   │   │
//! │  └──────────────────────────────┘   └─────────────────────────────┘   │
//! │                                                                         │
//! │  ClientConfig: defaults ──► client.toml ──► TILL_* env overrides       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`cache`] - `RegisterCache` state machine
//! - [`config`] - Client configuration (API, retry, cache)
//! - [`error`] - Client error types
//! - [`http`] - REST implementation of [`MovementSource`]
//! - [`quality`] - Data-quality sinks
//! - [`retry`] - Linear backoff retry wrapper
//! - [`source`] - The `MovementSource` trait
//!
//! ## Usage
//!
//! ```rust,ignore
//! use till_client::{ClientConfig, RegisterCache};
//! use till_core::{Money, MovementType, NewMovement};
//!
//! let config = ClientConfig::load_or_default(None);
//! let cache = RegisterCache::from_config(&config)?;
//!
//! if let Some(view) = cache.init().await? {
//!     println!("Balance: {}", view.current_balance());
//! }
//!
//! cache
//!     .register_movement(NewMovement::new(
//!         MovementType::Expense,
//!         Money::from_major(25),
//!         "Cleaning supplies",
//!     ))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod quality;
pub mod retry;
pub mod source;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{CacheState, RefreshOutcome, RegisterCache, RegisterView};
pub use config::{ApiSettings, CacheSettings, ClientConfig, RetrySettings};
pub use error::{ClientError, ClientResult};
pub use http::HttpMovementSource;
pub use quality::{CollectingSink, DataQualitySink, NoOpSink, TracingSink};
pub use retry::{retry, Idempotent, LinearBackoff, NonIdempotent, RetryPolicy};
pub use source::MovementSource;
