//! Domain models for the stock transfer platform

mod adjustment;
mod ledger;
mod location;
mod reconciliation;
mod transfer;

pub use adjustment::*;
pub use ledger::*;
pub use location::*;
pub use reconciliation::*;
pub use transfer::*;
