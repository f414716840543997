//! Transfer service: drafting, dispatch, receipt and cancellation

use std::sync::Arc;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    apply_receipt_counts, generate_transfer_code, validate_transfer_code, validate_transfer_draft,
    validate_transfer_lines, CreateTransferInput, MovementReason, PaginatedResponse, Pagination,
    ReceiptSummary, ReceiveTransferInput, StockDelta, Transfer, TransferAction, TransferEvent,
    TransferFilter, TransferLine, TransferState, UpdateTransferInput, ValidationError,
};
use uuid::Uuid;
use validator::Validate;

use crate::config::TransferConfig;
use crate::error::{AppError, AppResult};
use crate::store::{InventoryStore, Transition};
use crate::tenant::TenantScope;

use super::LocationService;

/// A received transfer together with its reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer: Transfer,
    pub summary: ReceiptSummary,
}

/// Transfer service driving the transfer state machine
#[derive(Clone)]
pub struct TransferService {
    store: Arc<dyn InventoryStore>,
    code_prefix: String,
}

impl TransferService {
    pub fn new(store: Arc<dyn InventoryStore>, config: &TransferConfig) -> Self {
        Self {
            store,
            code_prefix: config.code_prefix.clone(),
        }
    }

    /// Create a draft. No stock moves until dispatch.
    pub async fn create(&self, scope: &TenantScope, input: CreateTransferInput) -> AppResult<Transfer> {
        input.validate()?;
        validate_transfer_draft(
            input.origin_location_id,
            input.destination_location_id,
            &input.lines,
        )?;

        let locations = LocationService::new(self.store.clone());
        locations
            .require_active(scope, input.origin_location_id, "origin_location_id")
            .await?;
        locations
            .require_active(scope, input.destination_location_id, "destination_location_id")
            .await?;

        let now = Utc::now();
        let sequence = self.store.next_transfer_sequence(scope, now.year()).await?;
        let transfer = Transfer {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id(),
            code: generate_transfer_code(&self.code_prefix, now.year(), sequence),
            origin_location_id: input.origin_location_id,
            destination_location_id: input.destination_location_id,
            state: TransferState::Draft,
            notes: input.notes,
            lines: input.lines.iter().map(TransferLine::from_input).collect(),
            created_by: scope.user_id(),
            created_at: now,
            dispatched_by: None,
            dispatched_at: None,
            received_by: None,
            received_at: None,
            cancelled_by: None,
            cancelled_at: None,
            updated_at: now,
        };

        self.store.insert_transfer(scope, &transfer).await?;

        tracing::info!(
            tenant_id = %scope.tenant_id(),
            transfer_id = %transfer.id,
            code = %transfer.code,
            lines = transfer.lines.len(),
            "Transfer drafted"
        );

        // Read back so timestamps carry the store's precision
        self.get(scope, transfer.id).await
    }

    /// Replace lines and/or notes of a draft
    pub async fn update_draft(
        &self,
        scope: &TenantScope,
        transfer_id: Uuid,
        input: UpdateTransferInput,
    ) -> AppResult<Transfer> {
        input.validate()?;
        if let Some(lines) = &input.lines {
            validate_transfer_lines(lines)?;
        }

        let transfer = self
            .store
            .update_draft(scope, transfer_id, input.lines, input.notes)
            .await?;

        tracing::debug!(
            tenant_id = %scope.tenant_id(),
            transfer_id = %transfer.id,
            lines = transfer.lines.len(),
            "Draft updated"
        );
        Ok(transfer)
    }

    /// Debit the origin for every line and move the transfer to `dispatched`
    pub async fn dispatch(&self, scope: &TenantScope, transfer_id: Uuid) -> AppResult<Transfer> {
        let transfer = self.get(scope, transfer_id).await?;
        let transition = Transition::new(&transfer, TransferAction::Dispatch, MovementReason::TransferDispatch)?;
        if transfer.lines.is_empty() {
            return Err(ValidationError::NoLines.into());
        }

        let deltas = transfer
            .lines
            .iter()
            .map(|line| {
                StockDelta::debit(transfer.origin_location_id, line.product_id, line.quantity_dispatched)
                    .for_line(line.id)
            })
            .collect();

        let result = self
            .store
            .apply_transition(scope, transition.with_deltas(deltas))
            .await;
        if let Err(AppError::InsufficientStock { shortfalls }) = &result {
            tracing::warn!(
                tenant_id = %scope.tenant_id(),
                transfer_id = %transfer.id,
                code = %transfer.code,
                shortfalls = shortfalls.len(),
                "Dispatch rejected for insufficient stock"
            );
        }
        let dispatched = result?;

        log_transition(scope, &dispatched, transfer.state);
        Ok(dispatched)
    }

    /// Credit the destination with the counted quantities and reconcile.
    ///
    /// Lines missing from `input.lines` are received in full. Shortages and
    /// overages are recorded, never rejected.
    pub async fn receive(
        &self,
        scope: &TenantScope,
        transfer_id: Uuid,
        input: ReceiveTransferInput,
    ) -> AppResult<TransferReceipt> {
        input.validate()?;
        let transfer = self.get(scope, transfer_id).await?;
        let transition = Transition::new(&transfer, TransferAction::Receive, MovementReason::TransferReceipt)?;

        let received = apply_receipt_counts(&transfer.lines, &input.lines)?;
        let deltas = received
            .iter()
            .filter_map(|line| {
                let quantity = line.quantity_received?;
                (!quantity.is_zero()).then(|| {
                    StockDelta::credit(transfer.destination_location_id, line.product_id, quantity)
                        .for_line(line.id)
                })
            })
            .collect();

        let updated = self
            .store
            .apply_transition(
                scope,
                transition
                    .with_deltas(deltas)
                    .with_received_lines(received)
                    .with_notes(input.notes),
            )
            .await?;

        let summary = ReceiptSummary::from_lines(&updated.lines);
        if !summary.is_clean() {
            tracing::warn!(
                tenant_id = %scope.tenant_id(),
                transfer_id = %updated.id,
                code = %updated.code,
                discrepancies = summary.discrepancies.len(),
                shortage = %summary.shortage_total(),
                overage = %summary.overage_total(),
                "Transfer received with discrepancies"
            );
        }

        log_transition(scope, &updated, transfer.state);
        Ok(TransferReceipt {
            transfer: updated,
            summary,
        })
    }

    /// Cancel a draft, or reverse a dispatch by re-crediting the origin
    pub async fn cancel(
        &self,
        scope: &TenantScope,
        transfer_id: Uuid,
        notes: Option<String>,
    ) -> AppResult<Transfer> {
        let transfer = self.get(scope, transfer_id).await?;
        let transition = Transition::new(&transfer, TransferAction::Cancel, MovementReason::TransferCancellation)?;

        let deltas = if transfer.state.is_in_transit() {
            transfer
                .lines
                .iter()
                .map(|line| {
                    StockDelta::credit(transfer.origin_location_id, line.product_id, line.quantity_dispatched)
                        .for_line(line.id)
                })
                .collect()
        } else {
            Vec::new()
        };

        let cancelled = self
            .store
            .apply_transition(scope, transition.with_deltas(deltas).with_notes(notes))
            .await?;

        log_transition(scope, &cancelled, transfer.state);
        Ok(cancelled)
    }

    pub async fn get(&self, scope: &TenantScope, transfer_id: Uuid) -> AppResult<Transfer> {
        self.store
            .get_transfer(scope, transfer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))
    }

    pub async fn get_by_code(&self, scope: &TenantScope, code: &str) -> AppResult<Transfer> {
        validate_transfer_code(code).map_err(|msg| AppError::Validation {
            field: "code".to_string(),
            message: msg.to_string(),
            message_es: "El código de transferencia debe tener el formato PREFIJO-AAAA-NNNNN".to_string(),
        })?;

        self.store
            .get_transfer_by_code(scope, code)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))
    }

    pub async fn list(
        &self,
        scope: &TenantScope,
        filter: TransferFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Transfer>> {
        let (transfers, total) = self.store.list_transfers(scope, &filter, pagination).await?;
        Ok(PaginatedResponse::new(transfers, pagination, total))
    }

    /// State history, oldest first
    pub async fn history(&self, scope: &TenantScope, transfer_id: Uuid) -> AppResult<Vec<TransferEvent>> {
        self.store.transfer_events(scope, transfer_id).await
    }
}

fn log_transition(scope: &TenantScope, transfer: &Transfer, from: TransferState) {
    tracing::info!(
        tenant_id = %scope.tenant_id(),
        transfer_id = %transfer.id,
        code = %transfer.code,
        from = from.as_str(),
        to = transfer.state.as_str(),
        actor_id = %scope.user_id(),
        "Transfer transition committed"
    );
}
