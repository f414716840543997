//! HTTP handlers for stock ledger endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use shared::{LedgerEntry, StockAdjustment, StockAdjustmentInput, StockMovement};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::StockLedger;
use crate::tenant::TenantScope;
use crate::AppState;

/// Balances of every product at a location
pub async fn list_location_stock(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Path(location_id): Path<Uuid>,
) -> AppResult<Json<Vec<LedgerEntry>>> {
    check_permission(&user, "stock", "read")?;
    let ledger = StockLedger::new(state.store.clone());
    let entries = ledger.balances(&scope, location_id).await?;
    Ok(Json(entries))
}

/// Movement history of one product at a location
pub async fn list_product_movements(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Path((location_id, product_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Vec<StockMovement>>> {
    check_permission(&user, "stock", "read")?;
    let ledger = StockLedger::new(state.store.clone());
    let movements = ledger.movements(&scope, location_id, Some(product_id)).await?;
    Ok(Json(movements))
}

/// Apply a bulk adjustment
pub async fn create_adjustment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Json(input): Json<StockAdjustmentInput>,
) -> AppResult<Json<StockAdjustment>> {
    check_permission(&user, "stock", "adjust")?;
    let ledger = StockLedger::new(state.store.clone());
    let adjustment = ledger.adjust(&scope, input).await?;
    Ok(Json(adjustment))
}
