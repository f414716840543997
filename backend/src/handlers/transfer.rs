//! HTTP handlers for stock transfer endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use shared::{
    CreateTransferInput, PaginatedResponse, Pagination, ReceiveTransferInput, Transfer,
    TransferEvent, TransferFilter, TransferState, UpdateTransferInput,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::{TransferReceipt, TransferService};
use crate::tenant::TenantScope;
use crate::AppState;

fn service(state: &AppState) -> TransferService {
    TransferService::new(state.store.clone(), &state.config.transfers)
}

/// Query parameters for listing transfers
#[derive(Debug, Deserialize)]
pub struct ListTransfersQuery {
    pub state: Option<TransferState>,
    /// Matches origin or destination
    pub location_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Optional body for cancellation
#[derive(Debug, Default, Deserialize)]
pub struct CancelTransferInput {
    pub notes: Option<String>,
}

/// List transfers of the tenant
pub async fn list_transfers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Query(query): Query<ListTransfersQuery>,
) -> AppResult<Json<PaginatedResponse<Transfer>>> {
    check_permission(&user, "transfers", "read")?;
    let filter = TransferFilter {
        state: query.state,
        location_id: query.location_id,
    };
    let defaults = Pagination::default();
    let pagination = Pagination {
        page: query.page.unwrap_or(defaults.page),
        per_page: query.per_page.unwrap_or(defaults.per_page),
    };
    let transfers = service(&state).list(&scope, filter, pagination).await?;
    Ok(Json(transfers))
}

/// Create a draft transfer
pub async fn create_transfer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Json(input): Json<CreateTransferInput>,
) -> AppResult<Json<Transfer>> {
    check_permission(&user, "transfers", "create")?;
    let transfer = service(&state).create(&scope, input).await?;
    Ok(Json(transfer))
}

/// Get a transfer by ID
pub async fn get_transfer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<Transfer>> {
    check_permission(&user, "transfers", "read")?;
    let transfer = service(&state).get(&scope, transfer_id).await?;
    Ok(Json(transfer))
}

/// Get a transfer by its human-readable code
pub async fn get_transfer_by_code(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Path(code): Path<String>,
) -> AppResult<Json<Transfer>> {
    check_permission(&user, "transfers", "read")?;
    let transfer = service(&state).get_by_code(&scope, &code).await?;
    Ok(Json(transfer))
}

/// Edit a draft's lines or notes
pub async fn update_transfer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Path(transfer_id): Path<Uuid>,
    Json(input): Json<UpdateTransferInput>,
) -> AppResult<Json<Transfer>> {
    check_permission(&user, "transfers", "create")?;
    let transfer = service(&state).update_draft(&scope, transfer_id, input).await?;
    Ok(Json(transfer))
}

/// State history of a transfer
pub async fn get_transfer_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<Vec<TransferEvent>>> {
    check_permission(&user, "transfers", "read")?;
    let events = service(&state).history(&scope, transfer_id).await?;
    Ok(Json(events))
}

pub async fn dispatch_transfer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<Transfer>> {
    check_permission(&user, "transfers", "dispatch")?;
    let transfer = service(&state).dispatch(&scope, transfer_id).await?;
    Ok(Json(transfer))
}

/// Receive a dispatched transfer. `{}` receives every line in full.
pub async fn receive_transfer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Path(transfer_id): Path<Uuid>,
    Json(input): Json<ReceiveTransferInput>,
) -> AppResult<Json<TransferReceipt>> {
    check_permission(&user, "transfers", "receive")?;
    let receipt = service(&state).receive(&scope, transfer_id, input).await?;
    Ok(Json(receipt))
}

pub async fn cancel_transfer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Path(transfer_id): Path<Uuid>,
    input: Option<Json<CancelTransferInput>>,
) -> AppResult<Json<Transfer>> {
    check_permission(&user, "transfers", "cancel")?;
    let input = input.map(|Json(i)| i).unwrap_or_default();
    let transfer = service(&state).cancel(&scope, transfer_id, input.notes).await?;
    Ok(Json(transfer))
}
