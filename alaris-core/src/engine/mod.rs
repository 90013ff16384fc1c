//! Interfaces consumed by the trading collaborators
//!
//! The pricing engine and the strategy live outside the runtime core;
//! only the traits and plain-data records they exchange with scheduled
//! tasks are defined here.

pub mod traits;

pub use traits::{Greeks, OptionQuote, PricingEngine, Strategy};
