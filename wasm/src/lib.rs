//! WebAssembly module for the Stock Transfer Platform
//!
//! Provides client-side helpers for the transfer screens:
//! - Receipt reconciliation preview before submitting counts
//! - Draft line validation
//! - Actions still available for a transfer state
//!
//! Every function exchanges JSON strings with JavaScript. The `*_json`
//! helpers hold the logic and are usable from native Rust as well.

use serde::Serialize;
use shared::{
    apply_receipt_counts, validate_transfer_code, validate_transfer_draft, ReceiptSummary,
    ReceiveLineInput, TransferLine, TransferLineInput, TransferState, ValidationError,
};
use uuid::Uuid;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Result of validating a draft on the client
#[derive(Debug, Serialize)]
pub struct DraftCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_en: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_es: Option<String>,
}

impl DraftCheck {
    fn ok() -> Self {
        Self {
            valid: true,
            field: None,
            message_en: None,
            message_es: None,
        }
    }

    fn rejected(err: &ValidationError) -> Self {
        Self {
            valid: false,
            field: Some(err.field().to_string()),
            message_en: Some(err.to_string()),
            message_es: Some(err.message_es()),
        }
    }
}

/// Reconcile counted quantities against a dispatched transfer's lines.
///
/// `lines_json` is the transfer's `lines` array, `counts_json` an array of
/// `{line_id, quantity_received}`; lines without a count are received in full.
pub fn preview_receipt_json(lines_json: &str, counts_json: &str) -> Result<String, String> {
    let lines: Vec<TransferLine> =
        serde_json::from_str(lines_json).map_err(|e| format!("Invalid lines JSON: {}", e))?;
    let counts: Vec<ReceiveLineInput> =
        serde_json::from_str(counts_json).map_err(|e| format!("Invalid counts JSON: {}", e))?;

    let received = apply_receipt_counts(&lines, &counts).map_err(|e| e.to_string())?;
    let summary = ReceiptSummary::from_lines(&received);
    serde_json::to_string(&summary).map_err(|e| e.to_string())
}

/// Check a draft before it is sent to the server
pub fn validate_draft_json(origin: &str, destination: &str, lines_json: &str) -> Result<String, String> {
    let origin = Uuid::parse_str(origin).map_err(|_| "Invalid origin location id".to_string())?;
    let destination =
        Uuid::parse_str(destination).map_err(|_| "Invalid destination location id".to_string())?;
    let lines: Vec<TransferLineInput> =
        serde_json::from_str(lines_json).map_err(|e| format!("Invalid lines JSON: {}", e))?;

    let check = match validate_transfer_draft(origin, destination, &lines) {
        Ok(()) => DraftCheck::ok(),
        Err(err) => DraftCheck::rejected(&err),
    };
    serde_json::to_string(&check).map_err(|e| e.to_string())
}

/// Actions allowed from `state` as a JSON array; unknown states allow nothing
pub fn allowed_actions_json(state: &str) -> String {
    let actions: Vec<&str> = TransferState::parse(state)
        .map(|s| s.allowed_actions().iter().map(|a| a.as_str()).collect())
        .unwrap_or_default();
    serde_json::to_string(&actions).unwrap_or_else(|_| "[]".to_string())
}

#[wasm_bindgen]
pub fn preview_receipt(lines_json: &str, counts_json: &str) -> Result<String, JsValue> {
    preview_receipt_json(lines_json, counts_json).map_err(|e| JsValue::from_str(&e))
}

#[wasm_bindgen]
pub fn validate_draft(origin: &str, destination: &str, lines_json: &str) -> Result<String, JsValue> {
    validate_draft_json(origin, destination, lines_json).map_err(|e| JsValue::from_str(&e))
}

#[wasm_bindgen]
pub fn allowed_actions(state: &str) -> String {
    allowed_actions_json(state)
}

/// Whether a search box entry looks like a transfer code
#[wasm_bindgen]
pub fn is_transfer_code(code: &str) -> bool {
    validate_transfer_code(code).is_ok()
}
