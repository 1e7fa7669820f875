//! Ledger collaborators
//!
//! The tip engine never talks to the network directly. It goes through
//! these traits:
//! - `StateOracle`: agent params, pending state and read-only getters
//! - `AgentDirectory`: discovery of agents defined from known templates
//! - `PriceFeedRefresher`: pulling fresh oracle data feeds
//!
//! `HttpLedgerClient` implements all three against a node's JSON-RPC API.

mod http;

pub use http::HttpLedgerClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::curve::{CurveParams, CurveState};

/// Failures reported by ledger collaborators.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Agent-side revert or bad input
    #[error("getter {getter} failed: {reason}")]
    Getter { getter: String, reason: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        LedgerError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Decode(e.to_string())
    }
}

/// Read access to agents, evaluated against pending (not yet final) state.
#[async_trait]
pub trait StateOracle: Send + Sync {
    /// Static params of the agent's definition
    async fn read_params(&self, agent: &str) -> Result<CurveParams, LedgerError>;

    /// Run a read-only getter against pending state and pending balances
    async fn execute_getter(
        &self,
        agent: &str,
        getter: &str,
        args: &[Value],
    ) -> Result<Value, LedgerError>;

    async fn pending_state_vars(&self, agent: &str) -> Result<CurveState, LedgerError>;

    /// Start receiving pending-state updates for the agent
    async fn track(&self, agent: &str) -> Result<(), LedgerError>;

    /// Raw state var of any agent, `None` if unset
    async fn read_state_var(&self, agent: &str, var: &str) -> Result<Option<Value>, LedgerError>;
}

#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Addresses of all agents defined from any of `templates`
    async fn agents_by_templates(&self, templates: &[String]) -> Result<Vec<String>, LedgerError>;

    /// Ask the node to report new agents defined from `template`
    async fn watch_template(&self, template: &str) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait PriceFeedRefresher: Send + Sync {
    /// Pull the latest value of a feed; `true` if it changed
    async fn pull(&self, oracle: &str, feed_name: &str, force: bool) -> Result<bool, LedgerError>;
}
