//! Location models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A branch, warehouse or store holding stock
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a location
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateLocationInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
}
