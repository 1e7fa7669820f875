//! Curve Registry
//!
//! At most one `CurveEngine` per agent address. Creation runs under a
//! per-address async lock covering params fetch, initial feed refresh,
//! tracking registration and construction, so concurrent callers for the
//! same address wait for the first one and get its engine back.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::engine::{pull_feeds, CurveEngine, EngineContext};
use super::types::OracleRef;
use crate::config::FeedMode;
use crate::error::CurveError;

/// Getter listing the oracle feeds a curve depends on
pub const GET_ORACLES: &str = "get_oracles";

pub struct CurveRegistry {
    ctx: EngineContext,
    curves: DashMap<String, Arc<CurveEngine>>,
    creation_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CurveRegistry {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            curves: DashMap::new(),
            creation_locks: DashMap::new(),
        }
    }

    /// Engine for `agent`, creating and registering it on first use.
    pub async fn create(&self, agent: &str) -> Result<Arc<CurveEngine>, CurveError> {
        let lock = self.creation_locks.entry(agent.to_string()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.create_locked(agent).await
        };

        // last one out removes the lock; waiters still hold a clone
        drop(lock);
        self.creation_locks
            .remove_if(agent, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn create_locked(&self, agent: &str) -> Result<Arc<CurveEngine>, CurveError> {
        if let Some(existing) = self.get(agent) {
            return Ok(existing);
        }

        let params = self
            .ctx
            .oracle
            .read_params(agent)
            .await
            .map_err(|e| CurveError::agent_not_found(agent, e))?;
        params
            .validate()
            .map_err(|reason| CurveError::agent_not_found(agent, reason))?;

        let oracles = self.read_oracle_list(agent).await?;

        if self.ctx.feed_mode == FeedMode::Pull {
            pull_feeds(self.ctx.feeds.as_ref(), agent, &oracles, false).await?;
        }

        self.ctx
            .oracle
            .track(agent)
            .await
            .map_err(|source| CurveError::StateTracking {
                agent: agent.to_string(),
                source,
            })?;

        let engine = CurveEngine::new(agent.to_string(), params, oracles, self.ctx.clone());
        engine.start_refresh_timer();
        self.curves.insert(agent.to_string(), Arc::clone(&engine));

        info!("Monitoring curve {}", agent);
        Ok(engine)
    }

    async fn read_oracle_list(&self, agent: &str) -> Result<Vec<OracleRef>, CurveError> {
        let value = self
            .ctx
            .oracle
            .execute_getter(agent, GET_ORACLES, &[])
            .await
            .map_err(|e| CurveError::agent_not_found(agent, e))?;

        if value.is_null() {
            return Ok(Vec::new());
        }
        let oracles: Vec<OracleRef> = serde_json::from_value(value)
            .map_err(|e| CurveError::agent_not_found(agent, format!("bad oracle list: {}", e)))?;

        debug!("{} depends on {} oracle feeds", agent, oracles.len());
        Ok(oracles)
    }

    /// Never creates.
    pub fn get(&self, agent: &str) -> Option<Arc<CurveEngine>> {
        self.curves.get(agent).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of every registered engine.
    pub fn get_all(&self) -> HashMap<String, Arc<CurveEngine>> {
        self.curves
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Stop every engine's refresh timer. Engines stay registered.
    pub fn shutdown(&self) {
        for entry in self.curves.iter() {
            entry.value().stop_refresh_timer();
        }
        debug!("Stopped refresh timers of {} curves", self.curves.len());
    }
}

// ============================================
// TESTS
// ============================================
