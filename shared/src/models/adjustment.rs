//! Bulk stock adjustment models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::LedgerEntry;

/// One signed correction in an adjustment batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdjustmentLineInput {
    pub product_id: Uuid,
    /// Positive adds stock, negative removes it
    pub delta: Decimal,
}

/// A batch of corrections at one location, applied all-or-nothing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StockAdjustmentInput {
    pub location_id: Uuid,
    #[validate(length(min = 1, max = 1000))]
    pub lines: Vec<AdjustmentLineInput>,
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
}

/// Result of an applied adjustment batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustment {
    /// Reference id stamped on every movement of the batch
    pub id: Uuid,
    pub location_id: Uuid,
    pub entries: Vec<LedgerEntry>,
    pub applied_by: Uuid,
    pub applied_at: DateTime<Utc>,
}
