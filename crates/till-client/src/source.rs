//! The remote side of the register cache.
//!
//! [`MovementSource`] is the seam between the cache and the ERP backend.
//! [`crate::http::HttpMovementSource`] talks REST; tests plug in scripted
//! sources.

use async_trait::async_trait;
use till_core::{
    CashMovement, CashRegister, CloseRegister, MovementFilters, NewMovement, OpenRegister,
};

use crate::error::ClientResult;

/// Backend operations for cash registers.
///
/// Implementations perform a single attempt per call; retrying is the
/// caller's concern.
#[async_trait]
pub trait MovementSource: Send + Sync {
    /// The currently open register, or `None` when no register is open.
    async fn fetch_active_register(&self) -> ClientResult<Option<CashRegister>>;

    /// Movements of one register, in whatever order the backend returns.
    async fn fetch_movements(
        &self,
        register_id: &str,
        filters: &MovementFilters,
    ) -> ClientResult<Vec<CashMovement>>;

    /// Records a movement and returns it as persisted.
    async fn submit_movement(
        &self,
        register_id: &str,
        movement: &NewMovement,
    ) -> ClientResult<CashMovement>;

    /// Opens a new register session.
    async fn open_register(&self, request: &OpenRegister) -> ClientResult<CashRegister>;

    /// Closes a register session and returns its final state.
    async fn close_register(
        &self,
        register_id: &str,
        request: &CloseRegister,
    ) -> ClientResult<CashRegister>;
}
