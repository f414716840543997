//! Validation rules for transfers, receipts and adjustments
//!
//! These checks run in the backend before anything is persisted and in the
//! browser (via WASM) before a request is sent.

use std::collections::HashSet;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    reconcile, AdjustmentLineInput, ReceiveLineInput, TransferLine, TransferLineInput,
    QUANTITY_LIMIT, QUANTITY_SCALE,
};

/// Input rejected before it reaches the ledger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Origin and destination must be different locations")]
    SameLocation,

    #[error("Line {index}: quantity must be positive")]
    NonPositiveQuantity { index: usize, product_id: Uuid },

    #[error("Line {index}: product {product_id} is listed more than once")]
    DuplicateProduct { index: usize, product_id: Uuid },

    #[error("A transfer needs at least one line before it can be dispatched")]
    NoLines,

    #[error("Received quantity for line {line_id} cannot be negative")]
    NegativeReceived { line_id: Uuid },

    #[error("Line {line_id} does not belong to this transfer")]
    UnknownLine { line_id: Uuid },

    #[error("Line {line_id} is received more than once")]
    DuplicateReceivedLine { line_id: Uuid },

    #[error("Adjustment line {index}: delta cannot be zero")]
    ZeroAdjustment { index: usize, product_id: Uuid },

    #[error("Quantity {quantity} has more than 4 decimal places")]
    TooManyDecimals { field: &'static str, quantity: Decimal },

    #[error("Quantity {quantity} is outside the supported range")]
    QuantityOutOfRange { field: &'static str, quantity: Decimal },

    #[error("Stock of product {product_id} at location {location_id} would exceed the supported range")]
    StockOutOfRange { location_id: Uuid, product_id: Uuid },
}

impl ValidationError {
    /// Request field the error refers to
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::SameLocation => "destination_location_id",
            ValidationError::NonPositiveQuantity { .. }
            | ValidationError::DuplicateProduct { .. }
            | ValidationError::NoLines
            | ValidationError::ZeroAdjustment { .. }
            | ValidationError::StockOutOfRange { .. } => "lines",
            ValidationError::TooManyDecimals { field, .. }
            | ValidationError::QuantityOutOfRange { field, .. } => *field,
            ValidationError::NegativeReceived { .. }
            | ValidationError::UnknownLine { .. }
            | ValidationError::DuplicateReceivedLine { .. } => "lines.quantity_received",
        }
    }

    /// Operator-facing message in Spanish
    pub fn message_es(&self) -> String {
        match self {
            ValidationError::SameLocation => {
                "El origen y el destino deben ser ubicaciones distintas".to_string()
            }
            ValidationError::NonPositiveQuantity { index, .. } => {
                format!("Línea {}: la cantidad debe ser mayor que cero", index)
            }
            ValidationError::DuplicateProduct { index, .. } => {
                format!("Línea {}: el producto está repetido", index)
            }
            ValidationError::NoLines => {
                "La transferencia necesita al menos una línea para ser enviada".to_string()
            }
            ValidationError::NegativeReceived { .. } => {
                "La cantidad recibida no puede ser negativa".to_string()
            }
            ValidationError::UnknownLine { .. } => {
                "La línea no pertenece a esta transferencia".to_string()
            }
            ValidationError::DuplicateReceivedLine { .. } => {
                "La línea se recibe más de una vez".to_string()
            }
            ValidationError::ZeroAdjustment { index, .. } => {
                format!("Línea {}: el ajuste no puede ser cero", index)
            }
            ValidationError::TooManyDecimals { quantity, .. } => {
                format!("La cantidad {} tiene más de 4 decimales", quantity)
            }
            ValidationError::QuantityOutOfRange { quantity, .. } => {
                format!("La cantidad {} está fuera del rango permitido", quantity)
            }
            ValidationError::StockOutOfRange { .. } => {
                "El stock resultante excede el rango permitido".to_string()
            }
        }
    }
}

// ============================================================================
// Quantity Validations
// ============================================================================

/// At most four decimal places and a magnitude below [`QUANTITY_LIMIT`]
pub fn validate_quantity(quantity: Decimal, field: &'static str) -> Result<(), ValidationError> {
    if quantity.abs() >= Decimal::from(QUANTITY_LIMIT) {
        return Err(ValidationError::QuantityOutOfRange { field, quantity });
    }
    if quantity.normalize().scale() > QUANTITY_SCALE {
        return Err(ValidationError::TooManyDecimals { field, quantity });
    }
    Ok(())
}

// ============================================================================
// Transfer Validations
// ============================================================================

/// Validate a draft's locations and lines. An empty line list is allowed.
pub fn validate_transfer_draft(
    origin_location_id: Uuid,
    destination_location_id: Uuid,
    lines: &[TransferLineInput],
) -> Result<(), ValidationError> {
    if origin_location_id == destination_location_id {
        return Err(ValidationError::SameLocation);
    }
    validate_transfer_lines(lines)
}

/// Quantities must be positive and in range, and each product may appear once
pub fn validate_transfer_lines(lines: &[TransferLineInput]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        if line.quantity <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveQuantity {
                index,
                product_id: line.product_id,
            });
        }
        validate_quantity(line.quantity, "lines")?;
        if !seen.insert(line.product_id) {
            return Err(ValidationError::DuplicateProduct {
                index,
                product_id: line.product_id,
            });
        }
    }
    Ok(())
}

/// Resolve the counted quantity of every line and reconcile it.
///
/// Lines missing from `counts` are received in full. Over-receipt is legal
/// and is recorded as an overage.
pub fn apply_receipt_counts(
    lines: &[TransferLine],
    counts: &[ReceiveLineInput],
) -> Result<Vec<TransferLine>, ValidationError> {
    let mut seen = HashSet::with_capacity(counts.len());
    for count in counts {
        if count.quantity_received < Decimal::ZERO {
            return Err(ValidationError::NegativeReceived {
                line_id: count.line_id,
            });
        }
        validate_quantity(count.quantity_received, "lines.quantity_received")?;
        if !lines.iter().any(|l| l.id == count.line_id) {
            return Err(ValidationError::UnknownLine {
                line_id: count.line_id,
            });
        }
        if !seen.insert(count.line_id) {
            return Err(ValidationError::DuplicateReceivedLine {
                line_id: count.line_id,
            });
        }
    }

    Ok(lines
        .iter()
        .map(|line| {
            let received = counts
                .iter()
                .find(|c| c.line_id == line.id)
                .map_or(line.quantity_dispatched, |c| c.quantity_received);
            TransferLine {
                quantity_received: Some(received),
                discrepancy: reconcile(line.quantity_dispatched, received),
                ..line.clone()
            }
        })
        .collect())
}

/// Validate transfer code format: PREFIX-YYYY-NNNNN
pub fn validate_transfer_code(code: &str) -> Result<(), &'static str> {
    let parts: Vec<&str> = code.split('-').collect();
    if parts.len() != 3 {
        return Err("Transfer code must have format PREFIX-YYYY-NNNNN");
    }
    if parts[0].is_empty()
        || parts[0].len() > 10
        || !parts[0].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err("Transfer code prefix must be 1-10 uppercase alphanumeric characters");
    }
    if parts[1].len() != 4 || !parts[1].chars().all(|c| c.is_ascii_digit()) {
        return Err("Transfer code year must be 4 digits");
    }
    if parts[2].len() < 5 || !parts[2].chars().all(|c| c.is_ascii_digit()) {
        return Err("Transfer code sequence must be at least 5 digits");
    }
    Ok(())
}

// ============================================================================
// Adjustment Validations
// ============================================================================

/// Deltas must be non-zero and in range, and each product may appear once
pub fn validate_adjustment_lines(lines: &[AdjustmentLineInput]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        if line.delta.is_zero() {
            return Err(ValidationError::ZeroAdjustment {
                index,
                product_id: line.product_id,
            });
        }
        validate_quantity(line.delta, "lines")?;
        if !seen.insert(line.product_id) {
            return Err(ValidationError::DuplicateProduct {
                index,
                product_id: line.product_id,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscrepancyKind;

    fn line_input(quantity: i64) -> TransferLineInput {
        TransferLineInput {
            product_id: Uuid::new_v4(),
            quantity: Decimal::from(quantity),
        }
    }

    fn dispatched_line(quantity: i64) -> TransferLine {
        TransferLine {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity_dispatched: Decimal::from(quantity),
            quantity_received: None,
            discrepancy: None,
        }
    }

    // ========================================================================
    // Draft Validation Tests
    // ========================================================================

    #[test]
    fn test_same_location_rejected() {
        let loc = Uuid::new_v4();
        assert_eq!(
            validate_transfer_draft(loc, loc, &[line_input(1)]),
            Err(ValidationError::SameLocation)
        );
    }

    #[test]
    fn test_empty_draft_allowed() {
        assert!(validate_transfer_draft(Uuid::new_v4(), Uuid::new_v4(), &[]).is_ok());
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        let lines = vec![line_input(3), line_input(0)];
        let err = validate_transfer_lines(&lines).unwrap_err();
        assert!(matches!(err, ValidationError::NonPositiveQuantity { index: 1, .. }));

        let negative = vec![line_input(-2)];
        assert!(validate_transfer_lines(&negative).is_err());
    }

    #[test]
    fn test_fractional_quantity_allowed() {
        let lines = vec![TransferLineInput {
            product_id: Uuid::new_v4(),
            quantity: Decimal::new(1250, 3),
        }];
        assert!(validate_transfer_lines(&lines).is_ok());
    }

    #[test]
    fn test_quantity_scale_and_magnitude_bounded() {
        let too_precise = TransferLineInput {
            product_id: Uuid::new_v4(),
            quantity: Decimal::new(1, 5),
        };
        let err = validate_transfer_lines(&[too_precise]).unwrap_err();
        assert!(matches!(err, ValidationError::TooManyDecimals { field: "lines", .. }));
        assert!(err.message_es().contains("4 decimales"));

        let too_large = TransferLineInput {
            product_id: Uuid::new_v4(),
            quantity: Decimal::from(QUANTITY_LIMIT),
        };
        assert!(matches!(
            validate_transfer_lines(&[too_large]),
            Err(ValidationError::QuantityOutOfRange { .. })
        ));

        // Trailing zeros do not count as precision
        assert!(validate_quantity(Decimal::new(150000, 5), "lines").is_ok());
        assert!(validate_quantity(Decimal::from(QUANTITY_LIMIT - 1), "lines").is_ok());
    }

    #[test]
    fn test_duplicate_product_rejected() {
        let first = line_input(1);
        let mut second = line_input(2);
        second.product_id = first.product_id;
        let err = validate_transfer_lines(&[first, second]).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateProduct { index: 1, .. }));
        assert_eq!(err.field(), "lines");
    }

    // ========================================================================
    // Receipt Tests
    // ========================================================================

    #[test]
    fn test_omitted_lines_received_in_full() {
        let lines = vec![dispatched_line(10), dispatched_line(4)];
        let received = apply_receipt_counts(&lines, &[]).unwrap();

        assert_eq!(received[0].quantity_received, Some(Decimal::from(10)));
        assert_eq!(received[1].quantity_received, Some(Decimal::from(4)));
        assert!(received.iter().all(|l| l.discrepancy.is_none()));
    }

    #[test]
    fn test_counts_override_and_reconcile() {
        let lines = vec![dispatched_line(10), dispatched_line(4)];
        let counts = vec![
            ReceiveLineInput { line_id: lines[0].id, quantity_received: Decimal::from(8) },
            ReceiveLineInput { line_id: lines[1].id, quantity_received: Decimal::from(6) },
        ];

        let received = apply_receipt_counts(&lines, &counts).unwrap();

        assert_eq!(received[0].quantity_received, Some(Decimal::from(8)));
        assert_eq!(received[0].discrepancy.unwrap().kind, DiscrepancyKind::Shortage);
        assert_eq!(received[1].discrepancy.unwrap().kind, DiscrepancyKind::Overage);
        assert_eq!(received[0].quantity_dispatched, Decimal::from(10));
    }

    #[test]
    fn test_zero_received_is_legal() {
        let lines = vec![dispatched_line(5)];
        let counts = vec![ReceiveLineInput { line_id: lines[0].id, quantity_received: Decimal::ZERO }];

        let received = apply_receipt_counts(&lines, &counts).unwrap();

        assert_eq!(received[0].quantity_received, Some(Decimal::ZERO));
        assert_eq!(received[0].discrepancy.unwrap().quantity, Decimal::from(5));
    }

    #[test]
    fn test_negative_received_rejected() {
        let lines = vec![dispatched_line(5)];
        let counts = vec![ReceiveLineInput { line_id: lines[0].id, quantity_received: Decimal::from(-1) }];

        assert_eq!(
            apply_receipt_counts(&lines, &counts),
            Err(ValidationError::NegativeReceived { line_id: lines[0].id })
        );
    }

    #[test]
    fn test_oversized_received_count_rejected() {
        let lines = vec![dispatched_line(1)];
        let counts = vec![ReceiveLineInput { line_id: lines[0].id, quantity_received: Decimal::MAX }];

        let err = apply_receipt_counts(&lines, &counts).unwrap_err();

        assert!(matches!(err, ValidationError::QuantityOutOfRange { .. }));
        assert_eq!(err.field(), "lines.quantity_received");
    }

    #[test]
    fn test_unknown_and_duplicate_lines_rejected() {
        let lines = vec![dispatched_line(5)];
        let stranger = Uuid::new_v4();
        let unknown = vec![ReceiveLineInput { line_id: stranger, quantity_received: Decimal::ONE }];
        assert_eq!(
            apply_receipt_counts(&lines, &unknown),
            Err(ValidationError::UnknownLine { line_id: stranger })
        );

        let twice = vec![
            ReceiveLineInput { line_id: lines[0].id, quantity_received: Decimal::ONE },
            ReceiveLineInput { line_id: lines[0].id, quantity_received: Decimal::TWO },
        ];
        assert!(matches!(
            apply_receipt_counts(&lines, &twice),
            Err(ValidationError::DuplicateReceivedLine { .. })
        ));
    }

    // ========================================================================
    // Code and Adjustment Tests
    // ========================================================================

    #[test]
    fn test_validate_transfer_code() {
        assert!(validate_transfer_code("TR-2026-00042").is_ok());
        assert!(validate_transfer_code("BR2-2026-123456").is_ok());
        assert!(validate_transfer_code("tr-2026-00042").is_err());
        assert!(validate_transfer_code("TR-26-00042").is_err());
        assert!(validate_transfer_code("TR-2026-42").is_err());
        assert!(validate_transfer_code("TR202600042").is_err());
    }

    #[test]
    fn test_adjustment_lines() {
        let product = Uuid::new_v4();
        let ok = vec![
            AdjustmentLineInput { product_id: product, delta: Decimal::from(-3) },
            AdjustmentLineInput { product_id: Uuid::new_v4(), delta: Decimal::from(7) },
        ];
        assert!(validate_adjustment_lines(&ok).is_ok());

        let zero = vec![AdjustmentLineInput { product_id: product, delta: Decimal::ZERO }];
        assert!(matches!(
            validate_adjustment_lines(&zero),
            Err(ValidationError::ZeroAdjustment { index: 0, .. })
        ));

        let huge = vec![AdjustmentLineInput { product_id: product, delta: Decimal::MIN }];
        assert!(matches!(
            validate_adjustment_lines(&huge),
            Err(ValidationError::QuantityOutOfRange { .. })
        ));
    }

    #[test]
    fn test_spanish_messages() {
        assert_eq!(
            ValidationError::SameLocation.message_es(),
            "El origen y el destino deben ser ubicaciones distintas"
        );
    }
}
