//! Error types for the tip engine.
//!
//! `CurveError` is returned by everything the engine, registry, watcher and
//! advisor do. Collaborator failures arrive as `LedgerError` and are chained
//! as the source.

use crate::ledger::LedgerError;

/// Errors surfaced by curve creation and tip computation.
#[derive(Debug, thiserror::Error)]
pub enum CurveError {
    /// Address is not a usable curve agent (params unreadable or invalid).
    #[error("agent {agent} is not a valid curve: {reason}")]
    AgentNotFound { agent: String, reason: String },

    /// Initial or on-demand oracle feed pull failed.
    #[error("failed to refresh feed {feed_name}@{oracle} for {agent}")]
    FeedRefresh {
        agent: String,
        oracle: String,
        feed_name: String,
        #[source]
        source: LedgerError,
    },

    /// Registering the agent for pending-state updates failed.
    #[error("failed to track pending state of {agent}")]
    StateTracking {
        agent: String,
        #[source]
        source: LedgerError,
    },

    /// Pending state vars could not be read.
    #[error("failed to read pending state of {agent}")]
    PendingState {
        agent: String,
        #[source]
        source: LedgerError,
    },

    /// A read-only getter against the agent failed or returned garbage.
    #[error("getter {getter} failed in {agent}")]
    Getter {
        agent: String,
        getter: String,
        #[source]
        source: LedgerError,
    },

    /// The agent's exchange function contradicted the pricing model.
    #[error("invariant violated in {agent}: {detail}")]
    InvariantViolation { agent: String, detail: String },

    /// Tips requested for an agent that is not monitored.
    #[error("no curve {0}")]
    NoCurve(String),

    /// Listing agents by template failed.
    #[error("agent discovery failed")]
    Discovery(#[source] LedgerError),
}

impl CurveError {
    pub fn agent_not_found(agent: &str, reason: impl std::fmt::Display) -> Self {
        CurveError::AgentNotFound {
            agent: agent.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = CurveError::agent_not_found("AGENT", "bad m");
        assert_eq!(err.to_string(), "agent AGENT is not a valid curve: bad m");

        let err = CurveError::InvariantViolation {
            agent: "AGENT".into(),
            detail: "negative price".into(),
        };
        assert_eq!(err.to_string(), "invariant violated in AGENT: negative price");
    }

    #[test]
    fn test_source_is_chained() {
        use std::error::Error;

        let err = CurveError::StateTracking {
            agent: "AGENT".into(),
            source: LedgerError::Transport("connection refused".into()),
        };
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("transport error: connection refused"));
    }
}
