//! HTTP handlers

pub mod health;
pub mod location;
pub mod stock;
pub mod transfer;

pub use health::*;
pub use location::*;
pub use stock::*;
pub use transfer::*;
