//! Bonding-curve tip engine
//!
//! Responsible for:
//! - Comparing a curve's marginal price with the agent's fair price
//! - Inverting the price formula to size a corrective trade per token
//! - Probing the agent's real exchange function before recommending it
//! - Keeping exactly one engine per monitored agent

mod engine;
pub mod pricing;
mod registry;
mod types;

pub use engine::{CurveEngine, EngineContext, GET_EXCHANGE_RESULT, GET_TARGET_P2};
pub use registry::{CurveRegistry, GET_ORACLES};
pub use types::{
    CurveParams, CurveState, ExchangeResult, OracleRef, Tip, TipAction, TokenRole, BASE_ASSET,
};
