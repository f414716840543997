//! In-memory inventory store
//!
//! Every operation runs inside one mutex critical section, which gives each
//! transition the same all-or-nothing behaviour as a database transaction.
//! Used by the `memory` storage backend and by the test suite.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    find_shortfalls, net_deltas, LedgerEntry, Location, MovementReason, Pagination,
    ReceiptSummary, StockDelta, StockKey, StockMovement, Transfer, TransferAction, TransferEvent,
    TransferFilter, TransferLine, TransferLineInput, TransferState, ValidationError,
};
use uuid::Uuid;

use super::{invalid_state, InventoryStore, Transition};
use crate::error::{AppError, AppResult};
use crate::tenant::TenantScope;

#[derive(Default)]
struct MemoryState {
    locations: HashMap<Uuid, Location>,
    transfers: HashMap<Uuid, Transfer>,
    events: Vec<TransferEvent>,
    stock: HashMap<(Uuid, StockKey), LedgerEntry>,
    movements: Vec<StockMovement>,
    sequences: HashMap<(Uuid, i32), i64>,
}

impl MemoryState {
    fn transfer(&self, scope: &TenantScope, transfer_id: Uuid) -> Option<&Transfer> {
        self.transfers
            .get(&transfer_id)
            .filter(|t| t.tenant_id == scope.tenant_id())
    }

    fn quantity(&self, tenant_id: Uuid, key: &StockKey) -> Decimal {
        self.stock
            .get(&(tenant_id, *key))
            .map_or(Decimal::ZERO, |e| e.quantity_on_hand)
    }

    fn apply_deltas(
        &mut self,
        scope: &TenantScope,
        deltas: &[StockDelta],
        reason: MovementReason,
        reference_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<LedgerEntry>> {
        let tenant_id = scope.tenant_id();

        let shortfalls = find_shortfalls(deltas, |key| self.quantity(tenant_id, key))?;
        if !shortfalls.is_empty() {
            return Err(AppError::InsufficientStock { shortfalls });
        }

        // Resolve every new balance before the first write
        let mut updates = Vec::new();
        for (key, change) in net_deltas(deltas)? {
            if change.is_zero() {
                continue;
            }
            let balance = self
                .quantity(tenant_id, &key)
                .checked_add(change)
                .ok_or(ValidationError::StockOutOfRange {
                    location_id: key.location_id,
                    product_id: key.product_id,
                })?;
            updates.push((key, change, balance));
        }

        let mut touched = Vec::with_capacity(updates.len());
        for (key, change, balance) in updates {
            let entry = LedgerEntry {
                tenant_id,
                location_id: key.location_id,
                product_id: key.product_id,
                quantity_on_hand: balance,
                updated_at: now,
            };
            self.stock.insert((tenant_id, key), entry.clone());
            self.movements.push(StockMovement {
                id: Uuid::new_v4(),
                tenant_id,
                location_id: key.location_id,
                product_id: key.product_id,
                delta: change,
                balance_after: balance,
                reason,
                reference_id,
                actor_id: scope.user_id(),
                created_at: now,
            });
            touched.push(entry);
        }
        Ok(touched)
    }
}

/// Process-local store
#[derive(Default)]
pub struct MemoryInventoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("Inventory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> AppResult<()> {
        self.lock().map(|_| ())
    }

    async fn create_location(&self, scope: &TenantScope, name: &str) -> AppResult<Location> {
        let mut state = self.lock()?;
        let duplicate = state
            .locations
            .values()
            .any(|l| l.tenant_id == scope.tenant_id() && l.name.eq_ignore_ascii_case(name));
        if duplicate {
            return Err(AppError::DuplicateEntry("location name".to_string()));
        }

        let location = Location {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id(),
            name: name.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        state.locations.insert(location.id, location.clone());
        Ok(location)
    }

    async fn get_location(&self, scope: &TenantScope, location_id: Uuid) -> AppResult<Option<Location>> {
        let state = self.lock()?;
        Ok(state
            .locations
            .get(&location_id)
            .filter(|l| l.tenant_id == scope.tenant_id())
            .cloned())
    }

    async fn list_locations(&self, scope: &TenantScope) -> AppResult<Vec<Location>> {
        let state = self.lock()?;
        let mut locations: Vec<Location> = state
            .locations
            .values()
            .filter(|l| l.tenant_id == scope.tenant_id())
            .cloned()
            .collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    async fn next_transfer_sequence(&self, scope: &TenantScope, year: i32) -> AppResult<i64> {
        let mut state = self.lock()?;
        let seq = state.sequences.entry((scope.tenant_id(), year)).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn insert_transfer(&self, scope: &TenantScope, transfer: &Transfer) -> AppResult<()> {
        let mut state = self.lock()?;
        let code_taken = state
            .transfers
            .values()
            .any(|t| t.tenant_id == scope.tenant_id() && t.code == transfer.code);
        if code_taken {
            return Err(AppError::DuplicateEntry("transfer code".to_string()));
        }

        let mut record = transfer.clone();
        record.tenant_id = scope.tenant_id();
        state.events.push(TransferEvent {
            id: Uuid::new_v4(),
            transfer_id: record.id,
            from_state: None,
            to_state: TransferState::Draft,
            actor_id: scope.user_id(),
            discrepancies: Vec::new(),
            notes: None,
            created_at: record.created_at,
        });
        state.transfers.insert(record.id, record);
        Ok(())
    }

    async fn get_transfer(&self, scope: &TenantScope, transfer_id: Uuid) -> AppResult<Option<Transfer>> {
        Ok(self.lock()?.transfer(scope, transfer_id).cloned())
    }

    async fn get_transfer_by_code(&self, scope: &TenantScope, code: &str) -> AppResult<Option<Transfer>> {
        let state = self.lock()?;
        Ok(state
            .transfers
            .values()
            .find(|t| t.tenant_id == scope.tenant_id() && t.code == code)
            .cloned())
    }

    async fn list_transfers(
        &self,
        scope: &TenantScope,
        filter: &TransferFilter,
        pagination: Pagination,
    ) -> AppResult<(Vec<Transfer>, u64)> {
        let state = self.lock()?;
        let mut matching: Vec<&Transfer> = state
            .transfers
            .values()
            .filter(|t| t.tenant_id == scope.tenant_id() && filter.matches(t))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.code.cmp(&a.code)));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn update_draft(
        &self,
        scope: &TenantScope,
        transfer_id: Uuid,
        lines: Option<Vec<TransferLineInput>>,
        notes: Option<String>,
    ) -> AppResult<Transfer> {
        let mut state = self.lock()?;
        let current = state
            .transfer(scope, transfer_id)
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;
        if current.state.next(TransferAction::Edit).is_none() {
            return Err(invalid_state(current, TransferAction::Edit));
        }

        let transfer = state
            .transfers
            .get_mut(&transfer_id)
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;
        if let Some(lines) = lines {
            transfer.lines = lines.iter().map(TransferLine::from_input).collect();
        }
        if notes.is_some() {
            transfer.notes = notes;
        }
        transfer.updated_at = Utc::now();
        Ok(transfer.clone())
    }

    async fn apply_transition(&self, scope: &TenantScope, transition: Transition) -> AppResult<Transfer> {
        let mut state = self.lock()?;
        let now = Utc::now();

        let current = state
            .transfer(scope, transition.transfer_id)
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;
        if current.state != transition.from {
            return Err(invalid_state(current, transition.action));
        }
        if current.updated_at != transition.observed_at {
            return Err(AppError::Conflict(current.code.clone()));
        }

        state.apply_deltas(
            scope,
            &transition.deltas,
            transition.reason,
            transition.transfer_id,
            now,
        )?;

        let transfer = state
            .transfers
            .get_mut(&transition.transfer_id)
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;
        transfer.state = transition.to;
        transfer.updated_at = now;
        match transition.to {
            TransferState::Dispatched => {
                transfer.dispatched_by = Some(scope.user_id());
                transfer.dispatched_at = Some(now);
            }
            TransferState::Received => {
                transfer.received_by = Some(scope.user_id());
                transfer.received_at = Some(now);
            }
            TransferState::Cancelled => {
                transfer.cancelled_by = Some(scope.user_id());
                transfer.cancelled_at = Some(now);
            }
            TransferState::Draft => {}
        }
        for line in transfer.lines.iter_mut() {
            if let Some(received) = transition.received_lines.iter().find(|r| r.id == line.id) {
                line.quantity_received = received.quantity_received;
                line.discrepancy = received.discrepancy;
            }
        }
        let updated = transfer.clone();

        let discrepancies = if transition.to == TransferState::Received {
            ReceiptSummary::from_lines(&updated.lines).discrepancies
        } else {
            Vec::new()
        };
        state.events.push(TransferEvent {
            id: Uuid::new_v4(),
            transfer_id: updated.id,
            from_state: Some(transition.from),
            to_state: transition.to,
            actor_id: scope.user_id(),
            discrepancies,
            notes: transition.notes,
            created_at: now,
        });

        Ok(updated)
    }

    async fn transfer_events(&self, scope: &TenantScope, transfer_id: Uuid) -> AppResult<Vec<TransferEvent>> {
        let state = self.lock()?;
        if state.transfer(scope, transfer_id).is_none() {
            return Err(AppError::NotFound("Transfer".to_string()));
        }
        Ok(state
            .events
            .iter()
            .filter(|e| e.transfer_id == transfer_id)
            .cloned()
            .collect())
    }

    async fn apply_deltas(
        &self,
        scope: &TenantScope,
        deltas: &[StockDelta],
        reason: MovementReason,
        reference_id: Uuid,
    ) -> AppResult<Vec<LedgerEntry>> {
        self.lock()?
            .apply_deltas(scope, deltas, reason, reference_id, Utc::now())
    }

    async fn get_balance(
        &self,
        scope: &TenantScope,
        location_id: Uuid,
        product_id: Uuid,
    ) -> AppResult<Option<LedgerEntry>> {
        let key = StockKey {
            location_id,
            product_id,
        };
        Ok(self.lock()?.stock.get(&(scope.tenant_id(), key)).cloned())
    }

    async fn list_balances(&self, scope: &TenantScope, location_id: Uuid) -> AppResult<Vec<LedgerEntry>> {
        let state = self.lock()?;
        let mut entries: Vec<LedgerEntry> = state
            .stock
            .iter()
            .filter(|((tenant_id, key), _)| *tenant_id == scope.tenant_id() && key.location_id == location_id)
            .map(|(_, entry)| entry.clone())
            .collect();
        entries.sort_by_key(|e| e.product_id);
        Ok(entries)
    }

    async fn list_movements(
        &self,
        scope: &TenantScope,
        location_id: Uuid,
        product_id: Option<Uuid>,
    ) -> AppResult<Vec<StockMovement>> {
        let state = self.lock()?;
        let mut movements: Vec<StockMovement> = state
            .movements
            .iter()
            .filter(|m| {
                m.tenant_id == scope.tenant_id()
                    && m.location_id == location_id
                    && product_id.map_or(true, |p| m.product_id == p)
            })
            .cloned()
            .collect();
        movements.reverse();
        Ok(movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> TenantScope {
        TenantScope::bind(Uuid::new_v4(), Uuid::new_v4()).unwrap()
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_ledger_untouched() {
        let store = MemoryInventoryStore::new();
        let scope = scope();
        let loc = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store
            .apply_deltas(
                &scope,
                &[
                    StockDelta::credit(loc, a, Decimal::from(10)),
                    StockDelta::credit(loc, b, Decimal::from(1)),
                ],
                MovementReason::Adjustment,
                Uuid::new_v4(),
            )
            .await
            .unwrap();

        let result = store
            .apply_deltas(
                &scope,
                &[
                    StockDelta::debit(loc, a, Decimal::from(4)),
                    StockDelta::debit(loc, b, Decimal::from(2)),
                ],
                MovementReason::Adjustment,
                Uuid::new_v4(),
            )
            .await;

        assert!(matches!(result, Err(AppError::InsufficientStock { ref shortfalls }) if shortfalls.len() == 1));
        let a_balance = store.get_balance(&scope, loc, a).await.unwrap().unwrap();
        assert_eq!(a_balance.quantity_on_hand, Decimal::from(10));
        assert_eq!(store.list_movements(&scope, loc, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tenants_do_not_share_stock() {
        let store = MemoryInventoryStore::new();
        let (ours, theirs) = (scope(), scope());
        let loc = Uuid::new_v4();
        let product = Uuid::new_v4();
        store
            .apply_deltas(
                &ours,
                &[StockDelta::credit(loc, product, Decimal::from(5))],
                MovementReason::Adjustment,
                Uuid::new_v4(),
            )
            .await
            .unwrap();

        assert!(store.get_balance(&theirs, loc, product).await.unwrap().is_none());
        assert!(store.list_balances(&theirs, loc).await.unwrap().is_empty());
        assert!(store.list_movements(&theirs, loc, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sequences_are_per_tenant_and_year() {
        let store = MemoryInventoryStore::new();
        let (ours, theirs) = (scope(), scope());

        assert_eq!(store.next_transfer_sequence(&ours, 2026).await.unwrap(), 1);
        assert_eq!(store.next_transfer_sequence(&ours, 2026).await.unwrap(), 2);
        assert_eq!(store.next_transfer_sequence(&ours, 2027).await.unwrap(), 1);
        assert_eq!(store.next_transfer_sequence(&theirs, 2026).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_location_name_rejected() {
        let store = MemoryInventoryStore::new();
        let scope = scope();
        store.create_location(&scope, "Sucursal Centro").await.unwrap();

        let result = store.create_location(&scope, "sucursal centro").await;

        assert!(matches!(result, Err(AppError::DuplicateEntry(_))));
    }
}
