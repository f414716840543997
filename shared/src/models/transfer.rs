//! Stock transfer models and the transfer state machine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::Discrepancy;

/// Lifecycle state of a transfer
///
/// `draft -> dispatched -> received`, with `cancelled` reachable from
/// `draft` or `dispatched`. `received` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Draft,
    Dispatched,
    Received,
    Cancelled,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Draft => "draft",
            TransferState::Dispatched => "dispatched",
            TransferState::Received => "received",
            TransferState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(TransferState::Draft),
            "dispatched" => Some(TransferState::Dispatched),
            "received" => Some(TransferState::Received),
            "cancelled" => Some(TransferState::Cancelled),
            _ => None,
        }
    }

    /// No transition leaves a terminal state
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Received | TransferState::Cancelled)
    }

    /// Stock has left the origin but not reached the destination
    #[inline]
    pub fn is_in_transit(&self) -> bool {
        matches!(self, TransferState::Dispatched)
    }

    /// State reached by applying `action`, or `None` if the action is not legal here
    pub fn next(&self, action: TransferAction) -> Option<TransferState> {
        match (self, action) {
            (TransferState::Draft, TransferAction::Edit) => Some(TransferState::Draft),
            (TransferState::Draft, TransferAction::Dispatch) => Some(TransferState::Dispatched),
            (TransferState::Draft, TransferAction::Cancel) => Some(TransferState::Cancelled),
            (TransferState::Dispatched, TransferAction::Receive) => Some(TransferState::Received),
            (TransferState::Dispatched, TransferAction::Cancel) => Some(TransferState::Cancelled),
            _ => None,
        }
    }

    /// Actions an operator may still take from this state
    pub fn allowed_actions(&self) -> Vec<TransferAction> {
        TransferAction::ALL
            .into_iter()
            .filter(|action| self.next(*action).is_some())
            .collect()
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations that drive the transfer state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferAction {
    Edit,
    Dispatch,
    Receive,
    Cancel,
}

impl TransferAction {
    pub const ALL: [TransferAction; 4] = [
        TransferAction::Edit,
        TransferAction::Dispatch,
        TransferAction::Receive,
        TransferAction::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferAction::Edit => "edit",
            TransferAction::Dispatch => "dispatch",
            TransferAction::Receive => "receive",
            TransferAction::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for TransferAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transfer of stock between two locations of the same tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Human-readable code, unique per tenant (e.g., "TR-2026-00042")
    pub code: String,
    pub origin_location_id: Uuid,
    pub destination_location_id: Uuid,
    pub state: TransferState,
    pub notes: Option<String>,
    pub lines: Vec<TransferLine>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub dispatched_by: Option<Uuid>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub received_by: Option<Uuid>,
    pub received_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// One product line of a transfer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferLine {
    pub id: Uuid,
    pub product_id: Uuid,
    /// Quantity leaving the origin; frozen once dispatched
    pub quantity_dispatched: Decimal,
    /// Counted quantity at the destination; set on receipt
    pub quantity_received: Option<Decimal>,
    pub discrepancy: Option<Discrepancy>,
}

impl TransferLine {
    /// New draft line; received quantity and discrepancy stay empty until receipt
    pub fn from_input(input: &TransferLineInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: input.product_id,
            quantity_dispatched: input.quantity,
            quantity_received: None,
            discrepancy: None,
        }
    }
}

/// Line requested while drafting a transfer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferLineInput {
    pub product_id: Uuid,
    pub quantity: Decimal,
}

/// Input for creating a draft transfer
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTransferInput {
    pub origin_location_id: Uuid,
    pub destination_location_id: Uuid,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub lines: Vec<TransferLineInput>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Input for editing a draft transfer; omitted fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateTransferInput {
    #[validate(length(max = 500))]
    pub lines: Option<Vec<TransferLineInput>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Counted quantity for one line at receipt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiveLineInput {
    pub line_id: Uuid,
    pub quantity_received: Decimal,
}

/// Input for receiving a transfer; lines not listed are received in full
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ReceiveTransferInput {
    #[serde(default)]
    #[validate(length(max = 500))]
    pub lines: Vec<ReceiveLineInput>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// One entry of a transfer's state history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub from_state: Option<TransferState>,
    pub to_state: TransferState,
    pub actor_id: Uuid,
    /// Discrepancies recorded by the receipt event
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discrepancies: Vec<LineDiscrepancy>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A discrepancy tied to the line it was found on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineDiscrepancy {
    pub line_id: Uuid,
    pub product_id: Uuid,
    pub discrepancy: Discrepancy,
}

/// Filters for listing transfers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferFilter {
    pub state: Option<TransferState>,
    /// Matches either origin or destination
    pub location_id: Option<Uuid>,
}

impl TransferFilter {
    pub fn matches(&self, transfer: &Transfer) -> bool {
        self.state.map_or(true, |s| transfer.state == s)
            && self.location_id.map_or(true, |loc| {
                transfer.origin_location_id == loc || transfer.destination_location_id == loc
            })
    }
}

/// Generate a transfer code
pub fn generate_transfer_code(prefix: &str, year: i32, sequence: i64) -> String {
    format!("{}-{}-{:05}", prefix, year, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert_eq!(
            TransferState::Draft.next(TransferAction::Dispatch),
            Some(TransferState::Dispatched)
        );
        assert_eq!(
            TransferState::Dispatched.next(TransferAction::Receive),
            Some(TransferState::Received)
        );
        assert_eq!(
            TransferState::Draft.next(TransferAction::Cancel),
            Some(TransferState::Cancelled)
        );
        assert_eq!(
            TransferState::Dispatched.next(TransferAction::Cancel),
            Some(TransferState::Cancelled)
        );
    }

    #[test]
    fn test_receive_requires_dispatch() {
        assert_eq!(TransferState::Draft.next(TransferAction::Receive), None);
    }

    #[test]
    fn test_dispatched_lines_are_frozen() {
        assert_eq!(TransferState::Dispatched.next(TransferAction::Edit), None);
        assert_eq!(TransferState::Dispatched.next(TransferAction::Dispatch), None);
    }

    #[test]
    fn test_terminal_states_have_no_actions() {
        for state in [TransferState::Received, TransferState::Cancelled] {
            assert!(state.is_terminal());
            assert!(state.allowed_actions().is_empty());
            for action in TransferAction::ALL {
                assert_eq!(state.next(action), None);
            }
        }
    }

    #[test]
    fn test_allowed_actions() {
        assert_eq!(
            TransferState::Draft.allowed_actions(),
            vec![TransferAction::Edit, TransferAction::Dispatch, TransferAction::Cancel]
        );
        assert_eq!(
            TransferState::Dispatched.allowed_actions(),
            vec![TransferAction::Receive, TransferAction::Cancel]
        );
    }

    #[test]
    fn test_state_string_roundtrip() {
        for state in [
            TransferState::Draft,
            TransferState::Dispatched,
            TransferState::Received,
            TransferState::Cancelled,
        ] {
            assert_eq!(TransferState::parse(state.as_str()), Some(state));
        }
        assert_eq!(TransferState::parse("in_transit"), None);
    }

    #[test]
    fn test_generate_transfer_code() {
        assert_eq!(generate_transfer_code("TR", 2026, 42), "TR-2026-00042");
    }

    #[test]
    fn test_filter_matches_either_location() {
        let origin = Uuid::new_v4();
        let destination = Uuid::new_v4();
        let now = Utc::now();
        let transfer = Transfer {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            code: "TR-2026-00001".to_string(),
            origin_location_id: origin,
            destination_location_id: destination,
            state: TransferState::Draft,
            notes: None,
            lines: vec![],
            created_by: Uuid::new_v4(),
            created_at: now,
            dispatched_by: None,
            dispatched_at: None,
            received_by: None,
            received_at: None,
            cancelled_by: None,
            cancelled_at: None,
            updated_at: now,
        };

        let by_origin = TransferFilter { state: None, location_id: Some(origin) };
        let by_destination = TransferFilter { state: None, location_id: Some(destination) };
        let by_state = TransferFilter { state: Some(TransferState::Received), location_id: None };

        assert!(by_origin.matches(&transfer));
        assert!(by_destination.matches(&transfer));
        assert!(!by_state.matches(&transfer));
    }
}
