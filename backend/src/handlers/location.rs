//! HTTP handlers for location endpoints

use axum::{extract::State, Json};
use shared::{CreateLocationInput, Location};

use crate::error::AppResult;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::LocationService;
use crate::tenant::TenantScope;
use crate::AppState;

pub async fn list_locations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
) -> AppResult<Json<Vec<Location>>> {
    check_permission(&user, "locations", "read")?;
    let locations = LocationService::new(state.store.clone()).list(&scope).await?;
    Ok(Json(locations))
}

pub async fn create_location(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    scope: TenantScope,
    Json(input): Json<CreateLocationInput>,
) -> AppResult<Json<Location>> {
    check_permission(&user, "locations", "manage")?;
    let location = LocationService::new(state.store.clone()).create(&scope, input).await?;
    Ok(Json(location))
}
