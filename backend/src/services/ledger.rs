//! Stock ledger service
//!
//! The single mutation primitive shared by every stock consumer: transfers
//! go through [`crate::store::Transition`], adjustments and other callers
//! through [`StockLedger::apply_delta`] and [`StockLedger::adjust`].

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use shared::{
    validate_adjustment_lines, validate_quantity, LedgerEntry, MovementReason, StockAdjustment, StockAdjustmentInput,
    StockDelta, StockMovement,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::store::InventoryStore;
use crate::tenant::TenantScope;

use super::LocationService;

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn InventoryStore>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Apply one signed delta. A debit below zero fails and leaves the entry unchanged.
    pub async fn apply_delta(
        &self,
        scope: &TenantScope,
        location_id: Uuid,
        product_id: Uuid,
        delta: Decimal,
        reason: MovementReason,
        reference_id: Uuid,
    ) -> AppResult<LedgerEntry> {
        validate_quantity(delta, "delta")?;
        let change = StockDelta {
            location_id,
            product_id,
            delta,
            line_id: None,
        };
        let entries = self
            .store
            .apply_deltas(scope, &[change], reason, reference_id)
            .await?;

        match entries.into_iter().next() {
            Some(entry) => Ok(entry),
            // Zero delta: nothing written, report the current balance
            None => self.balance(scope, location_id, product_id).await,
        }
    }

    /// Quantity on hand; an entry that never existed reads as zero
    pub async fn balance(
        &self,
        scope: &TenantScope,
        location_id: Uuid,
        product_id: Uuid,
    ) -> AppResult<LedgerEntry> {
        let entry = self.store.get_balance(scope, location_id, product_id).await?;
        Ok(entry.unwrap_or_else(|| LedgerEntry {
            tenant_id: scope.tenant_id(),
            location_id,
            product_id,
            quantity_on_hand: Decimal::ZERO,
            updated_at: Utc::now(),
        }))
    }

    pub async fn balances(&self, scope: &TenantScope, location_id: Uuid) -> AppResult<Vec<LedgerEntry>> {
        self.store.list_balances(scope, location_id).await
    }

    /// Movements at a location, newest first
    pub async fn movements(
        &self,
        scope: &TenantScope,
        location_id: Uuid,
        product_id: Option<Uuid>,
    ) -> AppResult<Vec<StockMovement>> {
        self.store.list_movements(scope, location_id, product_id).await
    }

    /// Apply a batch of corrections at one location, all-or-nothing
    pub async fn adjust(&self, scope: &TenantScope, input: StockAdjustmentInput) -> AppResult<StockAdjustment> {
        input.validate()?;
        validate_adjustment_lines(&input.lines)?;
        LocationService::new(self.store.clone())
            .require_active(scope, input.location_id, "location_id")
            .await?;

        let adjustment_id = Uuid::new_v4();
        let deltas: Vec<StockDelta> = input
            .lines
            .iter()
            .map(|line| StockDelta {
                location_id: input.location_id,
                product_id: line.product_id,
                delta: line.delta,
                line_id: None,
            })
            .collect();

        let result = self
            .store
            .apply_deltas(scope, &deltas, MovementReason::Adjustment, adjustment_id)
            .await;
        if let Err(AppError::InsufficientStock { shortfalls }) = &result {
            tracing::warn!(
                tenant_id = %scope.tenant_id(),
                location_id = %input.location_id,
                shortfalls = shortfalls.len(),
                "Adjustment rejected for insufficient stock"
            );
        }
        let entries = result?;

        tracing::info!(
            tenant_id = %scope.tenant_id(),
            adjustment_id = %adjustment_id,
            location_id = %input.location_id,
            lines = entries.len(),
            reason = input.reason.as_deref().unwrap_or(""),
            "Stock adjustment applied"
        );

        Ok(StockAdjustment {
            id: adjustment_id,
            location_id: input.location_id,
            entries,
            applied_by: scope.user_id(),
            applied_at: Utc::now(),
        })
    }
}
