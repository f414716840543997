//! Business logic services for the stock transfer platform

pub mod ledger;
pub mod location;
pub mod transfer;

pub use ledger::StockLedger;
pub use location::LocationService;
pub use transfer::{TransferReceipt, TransferService};
