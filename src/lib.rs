//! Curve Advisor
//!
//! Watches two-token bonding-curve agents on an autonomous-agent ledger and
//! recommends buy/sell trades that bring each curve's T2 price back to the
//! agent's own target price.

pub mod advisor;
pub mod config;
pub mod curve;
pub mod debounce;
pub mod error;
pub mod events;
pub mod ledger;
pub mod tokens;
pub mod watcher;

#[cfg(test)]
pub mod testing;

pub use advisor::{Advisor, TipHandler};
pub use config::{Config, FeedMode, TipLog};
pub use error::CurveError;
