//! Location service

use std::sync::Arc;

use shared::{CreateLocationInput, Location};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::store::InventoryStore;
use crate::tenant::TenantScope;

#[derive(Clone)]
pub struct LocationService {
    store: Arc<dyn InventoryStore>,
}

impl LocationService {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, scope: &TenantScope, input: CreateLocationInput) -> AppResult<Location> {
        input.validate()?;
        let name = input.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation {
                field: "name".to_string(),
                message: "Location name cannot be blank".to_string(),
                message_es: "El nombre de la ubicación no puede estar vacío".to_string(),
            });
        }

        let location = self.store.create_location(scope, name).await?;
        tracing::info!(
            tenant_id = %scope.tenant_id(),
            location_id = %location.id,
            name = %location.name,
            "Location created"
        );
        Ok(location)
    }

    pub async fn list(&self, scope: &TenantScope) -> AppResult<Vec<Location>> {
        self.store.list_locations(scope).await
    }

    pub async fn get(&self, scope: &TenantScope, location_id: Uuid) -> AppResult<Location> {
        self.store
            .get_location(scope, location_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Location".to_string()))
    }

    /// Location must exist in the tenant and accept stock; `field` names the request field
    pub async fn require_active(
        &self,
        scope: &TenantScope,
        location_id: Uuid,
        field: &str,
    ) -> AppResult<Location> {
        let location = self.get(scope, location_id).await?;
        if !location.is_active {
            return Err(AppError::Validation {
                field: field.to_string(),
                message: format!("Location {} is inactive", location.name),
                message_es: format!("La ubicación {} está inactiva", location.name),
            });
        }
        Ok(location)
    }
}
