//! Stock ledger models
//!
//! The ledger holds one quantity-on-hand per (tenant, location, product).
//! Every mutation is expressed as a signed [`StockDelta`]; a batch of deltas
//! is either applied in full or not at all.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::ValidationError;

/// Decimal places a quantity may carry
pub const QUANTITY_SCALE: u32 = 4;

/// Quantities, deltas and balances stay strictly below this magnitude
pub const QUANTITY_LIMIT: i64 = 100_000_000_000_000;

/// Quantity on hand for one product at one location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub tenant_id: Uuid,
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub quantity_on_hand: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Why a ledger entry moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    TransferDispatch,
    TransferReceipt,
    TransferCancellation,
    Adjustment,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::TransferDispatch => "transfer_dispatch",
            MovementReason::TransferReceipt => "transfer_receipt",
            MovementReason::TransferCancellation => "transfer_cancellation",
            MovementReason::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transfer_dispatch" => Some(MovementReason::TransferDispatch),
            "transfer_receipt" => Some(MovementReason::TransferReceipt),
            "transfer_cancellation" => Some(MovementReason::TransferCancellation),
            "adjustment" => Some(MovementReason::Adjustment),
            _ => None,
        }
    }
}

/// Audit row written for every applied delta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub delta: Decimal,
    pub balance_after: Decimal,
    pub reason: MovementReason,
    /// Transfer or adjustment that caused the movement
    pub reference_id: Uuid,
    pub actor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Ledger key within a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub location_id: Uuid,
    pub product_id: Uuid,
}

/// A signed change to one ledger entry. Negative is a debit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StockDelta {
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub delta: Decimal,
    /// Transfer line or adjustment line the delta originates from
    pub line_id: Option<Uuid>,
}

impl StockDelta {
    pub fn debit(location_id: Uuid, product_id: Uuid, quantity: Decimal) -> Self {
        Self {
            location_id,
            product_id,
            delta: -quantity,
            line_id: None,
        }
    }

    pub fn credit(location_id: Uuid, product_id: Uuid, quantity: Decimal) -> Self {
        Self {
            location_id,
            product_id,
            delta: quantity,
            line_id: None,
        }
    }

    pub fn for_line(mut self, line_id: Uuid) -> Self {
        self.line_id = Some(line_id);
        self
    }

    pub fn key(&self) -> StockKey {
        StockKey {
            location_id: self.location_id,
            product_id: self.product_id,
        }
    }
}

/// A debit that cannot be covered by the current balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub line_id: Option<Uuid>,
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub required: Decimal,
    pub available: Decimal,
}

impl std::fmt::Display for Shortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "product {} requires {} but only {} available",
            self.product_id,
            self.required.normalize(),
            self.available.normalize()
        )
    }
}

/// Sum deltas per key. The result is ordered by key, which is also the
/// order rows must be locked in.
pub fn net_deltas(deltas: &[StockDelta]) -> Result<BTreeMap<StockKey, Decimal>, ValidationError> {
    let mut net = BTreeMap::new();
    for d in deltas {
        let sum: &mut Decimal = net.entry(d.key()).or_insert(Decimal::ZERO);
        *sum = sum
            .checked_add(d.delta)
            .ok_or_else(|| out_of_range(&d.key()))?;
    }
    Ok(net)
}

/// Check a whole batch against current balances before anything is written.
///
/// `balance_of` returns the on-hand quantity for a key (zero if the entry
/// does not exist). Every key whose net change would drive it negative is
/// reported; an empty result means the batch can be applied. A balance that
/// would reach [`QUANTITY_LIMIT`] rejects the whole batch.
pub fn find_shortfalls<F>(deltas: &[StockDelta], mut balance_of: F) -> Result<Vec<Shortfall>, ValidationError>
where
    F: FnMut(&StockKey) -> Decimal,
{
    let limit = Decimal::from(QUANTITY_LIMIT);
    let mut shortfalls = Vec::new();
    for (key, change) in net_deltas(deltas)? {
        let available = balance_of(&key);
        let after = available
            .checked_add(change)
            .ok_or_else(|| out_of_range(&key))?;
        if after >= limit {
            return Err(out_of_range(&key));
        }
        if after < Decimal::ZERO {
            let line_id = deltas
                .iter()
                .find(|d| d.key() == key && d.delta < Decimal::ZERO)
                .and_then(|d| d.line_id);
            shortfalls.push(Shortfall {
                line_id,
                location_id: key.location_id,
                product_id: key.product_id,
                required: -change,
                available,
            });
        }
    }
    Ok(shortfalls)
}

fn out_of_range(key: &StockKey) -> ValidationError {
    ValidationError::StockOutOfRange {
        location_id: key.location_id,
        product_id: key.product_id,
    }
}
