//! Shared types and models for the stock transfer platform
//!
//! This crate contains the transfer state machine, reconciliation rules and
//! validation shared between the backend, the browser (via WASM) and other
//! ledger consumers.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
