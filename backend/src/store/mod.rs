//! Persistence for locations, the stock ledger and transfer records
//!
//! Two implementations share one contract:
//! - [`PgInventoryStore`]: PostgreSQL, one transaction per transition
//! - [`MemoryInventoryStore`]: process-local, one critical section per transition
//!
//! A [`Transition`] bundles the conditional state change of a transfer with
//! the ledger deltas it causes. Stores commit both together or neither.

pub mod memory;
pub mod postgres;

pub use memory::MemoryInventoryStore;
pub use postgres::PgInventoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    LedgerEntry, Location, MovementReason, Pagination, StockDelta, StockMovement, Transfer,
    TransferAction, TransferEvent, TransferFilter, TransferLine, TransferLineInput, TransferState,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::tenant::TenantScope;

/// A state change of one transfer together with its ledger effect
#[derive(Debug, Clone)]
pub struct Transition {
    pub transfer_id: Uuid,
    pub action: TransferAction,
    /// State the caller observed; the update only applies if it still holds
    pub from: TransferState,
    pub to: TransferState,
    /// `updated_at` the caller observed; a mismatch means the lines changed
    pub observed_at: DateTime<Utc>,
    pub reason: MovementReason,
    pub deltas: Vec<StockDelta>,
    /// Lines carrying received quantities and discrepancies (receive only)
    pub received_lines: Vec<TransferLine>,
    pub notes: Option<String>,
}

impl Transition {
    /// Build a transition, rejecting actions the state machine does not allow
    pub fn new(transfer: &Transfer, action: TransferAction, reason: MovementReason) -> AppResult<Self> {
        let to = transfer
            .state
            .next(action)
            .ok_or_else(|| invalid_state(transfer, action))?;
        Ok(Self {
            transfer_id: transfer.id,
            action,
            from: transfer.state,
            to,
            observed_at: transfer.updated_at,
            reason,
            deltas: Vec::new(),
            received_lines: Vec::new(),
            notes: None,
        })
    }

    pub fn with_deltas(mut self, deltas: Vec<StockDelta>) -> Self {
        self.deltas = deltas;
        self
    }

    pub fn with_received_lines(mut self, lines: Vec<TransferLine>) -> Self {
        self.received_lines = lines;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}

/// Error for an action the transfer's current state does not permit
pub fn invalid_state(transfer: &Transfer, action: TransferAction) -> AppError {
    AppError::InvalidState {
        code: transfer.code.clone(),
        current: transfer.state,
        attempted: action,
    }
}

/// Storage contract for the inventory engine
///
/// Every method is scoped by the caller's tenant; rows of other tenants are
/// invisible and reported as missing.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Connectivity check for the health endpoint
    async fn ping(&self) -> AppResult<()>;

    // Locations

    async fn create_location(&self, scope: &TenantScope, name: &str) -> AppResult<Location>;

    async fn get_location(&self, scope: &TenantScope, location_id: Uuid) -> AppResult<Option<Location>>;

    async fn list_locations(&self, scope: &TenantScope) -> AppResult<Vec<Location>>;

    // Transfer records

    /// Next per-tenant, per-year sequence number for transfer codes
    async fn next_transfer_sequence(&self, scope: &TenantScope, year: i32) -> AppResult<i64>;

    /// Persist a new draft together with its creation event
    async fn insert_transfer(&self, scope: &TenantScope, transfer: &Transfer) -> AppResult<()>;

    async fn get_transfer(&self, scope: &TenantScope, transfer_id: Uuid) -> AppResult<Option<Transfer>>;

    async fn get_transfer_by_code(&self, scope: &TenantScope, code: &str) -> AppResult<Option<Transfer>>;

    /// Page of transfers, newest first, plus the total count
    async fn list_transfers(
        &self,
        scope: &TenantScope,
        filter: &TransferFilter,
        pagination: Pagination,
    ) -> AppResult<(Vec<Transfer>, u64)>;

    /// Replace lines and/or notes while the transfer is still a draft
    async fn update_draft(
        &self,
        scope: &TenantScope,
        transfer_id: Uuid,
        lines: Option<Vec<TransferLineInput>>,
        notes: Option<String>,
    ) -> AppResult<Transfer>;

    /// Apply a transition and its deltas atomically.
    ///
    /// Fails with `InvalidState` when the transfer is no longer in
    /// `transition.from`, with `Conflict` when it is but was edited since it
    /// was read, and with `InsufficientStock` when a debit cannot be covered.
    /// In every case nothing is written.
    async fn apply_transition(&self, scope: &TenantScope, transition: Transition) -> AppResult<Transfer>;

    async fn transfer_events(&self, scope: &TenantScope, transfer_id: Uuid) -> AppResult<Vec<TransferEvent>>;

    // Stock ledger

    /// Apply a batch of deltas all-or-nothing and return the touched entries
    async fn apply_deltas(
        &self,
        scope: &TenantScope,
        deltas: &[StockDelta],
        reason: MovementReason,
        reference_id: Uuid,
    ) -> AppResult<Vec<LedgerEntry>>;

    async fn get_balance(
        &self,
        scope: &TenantScope,
        location_id: Uuid,
        product_id: Uuid,
    ) -> AppResult<Option<LedgerEntry>>;

    async fn list_balances(&self, scope: &TenantScope, location_id: Uuid) -> AppResult<Vec<LedgerEntry>>;

    async fn list_movements(
        &self,
        scope: &TenantScope,
        location_id: Uuid,
        product_id: Option<Uuid>,
    ) -> AppResult<Vec<StockMovement>>;
}
