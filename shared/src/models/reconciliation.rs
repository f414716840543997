//! Receipt reconciliation: dispatched vs. counted quantities

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{LineDiscrepancy, TransferLine};

/// Kind of mismatch found when counting a received line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Fewer units arrived than were dispatched (shrinkage in transit)
    Shortage,
    /// More units arrived than were dispatched (miscount or wrong goods)
    Overage,
}

impl DiscrepancyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscrepancyKind::Shortage => "shortage",
            DiscrepancyKind::Overage => "overage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "shortage" => Some(DiscrepancyKind::Shortage),
            "overage" => Some(DiscrepancyKind::Overage),
            _ => None,
        }
    }
}

/// Recorded mismatch for one line. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    /// Absolute difference between dispatched and received
    pub quantity: Decimal,
}

impl std::fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} of {}", self.kind.as_str(), self.quantity.normalize())
    }
}

/// Compare a dispatched quantity against the counted one
pub fn reconcile(dispatched: Decimal, received: Decimal) -> Option<Discrepancy> {
    if received < dispatched {
        Some(Discrepancy {
            kind: DiscrepancyKind::Shortage,
            quantity: dispatched.saturating_sub(received),
        })
    } else if received > dispatched {
        Some(Discrepancy {
            kind: DiscrepancyKind::Overage,
            quantity: received.saturating_sub(dispatched),
        })
    } else {
        None
    }
}

/// Outcome of a receipt, returned alongside the received transfer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReceiptSummary {
    pub total_dispatched: Decimal,
    pub total_received: Decimal,
    pub discrepancies: Vec<LineDiscrepancy>,
}

impl ReceiptSummary {
    /// Build a summary from lines that already carry their received quantities
    pub fn from_lines(lines: &[TransferLine]) -> Self {
        let mut summary = ReceiptSummary::default();
        for line in lines {
            summary.total_dispatched = summary.total_dispatched.saturating_add(line.quantity_dispatched);
            summary.total_received = summary
                .total_received
                .saturating_add(line.quantity_received.unwrap_or(Decimal::ZERO));
            if let Some(discrepancy) = line.discrepancy {
                summary.discrepancies.push(LineDiscrepancy {
                    line_id: line.id,
                    product_id: line.product_id,
                    discrepancy,
                });
            }
        }
        summary
    }

    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }

    pub fn shortage_total(&self) -> Decimal {
        self.total_of(DiscrepancyKind::Shortage)
    }

    pub fn overage_total(&self) -> Decimal {
        self.total_of(DiscrepancyKind::Overage)
    }

    fn total_of(&self, kind: DiscrepancyKind) -> Decimal {
        self.discrepancies
            .iter()
            .filter(|d| d.discrepancy.kind == kind)
            .fold(Decimal::ZERO, |total, d| total.saturating_add(d.discrepancy.quantity))
    }
}
