//! In-memory ledger for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::curve::{
    CurveParams, CurveState, OracleRef, GET_EXCHANGE_RESULT, GET_ORACLES, GET_TARGET_P2,
};
use crate::ledger::{AgentDirectory, LedgerError, PriceFeedRefresher, StateOracle};

/// `(tokens1, tokens2)` in minor units to `get_exchange_result` output.
pub type ExchangeFn = Arc<dyn Fn(i64, i64) -> Result<Value, LedgerError> + Send + Sync>;

struct MockCurve {
    params: CurveParams,
    state: CurveState,
    target_p2: Option<f64>,
    oracles: Vec<OracleRef>,
    exchange: Option<ExchangeFn>,
}

#[derive(Default)]
pub struct MockLedger {
    curves: Mutex<HashMap<String, MockCurve>>,
    state_vars: Mutex<HashMap<(String, String), Value>>,
    templates: Mutex<Vec<(String, Vec<String>)>>,
    read_delay: Mutex<Option<Duration>>,
    feed_changed: AtomicBool,
    fail_feeds: AtomicBool,
    fail_track: AtomicBool,
    params_reads: AtomicUsize,
    state_var_reads: AtomicUsize,
    exchange_calls: AtomicUsize,
    tracked: Mutex<Vec<String>>,
    pulls: Mutex<Vec<(String, String, bool)>>,
    watched: Mutex<Vec<String>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_curve(
        &self,
        agent: &str,
        params: CurveParams,
        state: CurveState,
        target_p2: f64,
        oracles: Vec<OracleRef>,
    ) {
        self.curves.lock().insert(
            agent.to_string(),
            MockCurve {
                params,
                state,
                target_p2: Some(target_p2),
                oracles,
                exchange: None,
            },
        );
    }

    pub fn set_exchange(&self, agent: &str, exchange: ExchangeFn) {
        if let Some(curve) = self.curves.lock().get_mut(agent) {
            curve.exchange = Some(exchange);
        }
    }

    /// Make `get_target_p2` fail for the agent
    pub fn clear_target_price(&self, agent: &str) {
        if let Some(curve) = self.curves.lock().get_mut(agent) {
            curve.target_p2 = None;
        }
    }

    pub fn set_state_var(&self, agent: &str, var: &str, value: Value) {
        self.state_vars
            .lock()
            .insert((agent.to_string(), var.to_string()), value);
    }

    pub fn set_templates(&self, template: &str, agents: &[&str]) {
        let agents = agents.iter().map(|a| a.to_string()).collect();
        let mut templates = self.templates.lock();
        templates.retain(|(t, _)| t != template);
        templates.push((template.to_string(), agents));
    }

    pub fn set_feed_changed(&self, changed: bool) {
        self.feed_changed.store(changed, Ordering::SeqCst);
    }

    pub fn set_fail_feeds(&self, fail: bool) {
        self.fail_feeds.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_track(&self, fail: bool) {
        self.fail_track.store(fail, Ordering::SeqCst);
    }

    /// Slow down `read_params` to widen race windows
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock() = Some(delay);
    }

    pub fn params_reads(&self) -> usize {
        self.params_reads.load(Ordering::SeqCst)
    }

    pub fn state_var_reads(&self) -> usize {
        self.state_var_reads.load(Ordering::SeqCst)
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn tracked(&self) -> Vec<String> {
        self.tracked.lock().clone()
    }

    pub fn pulls(&self) -> Vec<(String, String, bool)> {
        self.pulls.lock().clone()
    }

    pub fn watched_templates(&self) -> Vec<String> {
        self.watched.lock().clone()
    }

    fn getter_error(getter: &str, reason: &str) -> LedgerError {
        LedgerError::Getter {
            getter: getter.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl StateOracle for MockLedger {
    async fn read_params(&self, agent: &str) -> Result<CurveParams, LedgerError> {
        self.params_reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.read_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.curves
            .lock()
            .get(agent)
            .map(|curve| curve.params.clone())
            .ok_or_else(|| LedgerError::NotFound(agent.to_string()))
    }

    async fn execute_getter(
        &self,
        agent: &str,
        getter: &str,
        args: &[Value],
    ) -> Result<Value, LedgerError> {
        let (target_p2, oracles, exchange) = {
            let curves = self.curves.lock();
            let curve = curves
                .get(agent)
                .ok_or_else(|| LedgerError::NotFound(agent.to_string()))?;
            (curve.target_p2, curve.oracles.clone(), curve.exchange.clone())
        };

        match getter {
            GET_TARGET_P2 => target_p2
                .map(Value::from)
                .ok_or_else(|| Self::getter_error(getter, "no target price")),
            GET_ORACLES => Ok(serde_json::to_value(oracles)?),
            GET_EXCHANGE_RESULT => {
                let amount = |i: usize| args.get(i).and_then(Value::as_i64);
                let (Some(tokens1), Some(tokens2)) = (amount(0), amount(1)) else {
                    return Err(Self::getter_error(getter, "bad args"));
                };
                self.exchange_calls.fetch_add(1, Ordering::SeqCst);
                match exchange {
                    Some(exchange) => exchange(tokens1, tokens2),
                    None => Err(Self::getter_error(getter, "no exchange configured")),
                }
            }
            _ => Err(Self::getter_error(getter, "unknown getter")),
        }
    }

    async fn pending_state_vars(&self, agent: &str) -> Result<CurveState, LedgerError> {
        self.curves
            .lock()
            .get(agent)
            .map(|curve| curve.state.clone())
            .ok_or_else(|| LedgerError::NotFound(agent.to_string()))
    }

    async fn track(&self, agent: &str) -> Result<(), LedgerError> {
        if self.fail_track.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("tracking refused".into()));
        }
        self.tracked.lock().push(agent.to_string());
        Ok(())
    }

    async fn read_state_var(&self, agent: &str, var: &str) -> Result<Option<Value>, LedgerError> {
        self.state_var_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state_vars
            .lock()
            .get(&(agent.to_string(), var.to_string()))
            .cloned())
    }
}

#[async_trait]
impl AgentDirectory for MockLedger {
    async fn agents_by_templates(&self, templates: &[String]) -> Result<Vec<String>, LedgerError> {
        let known = self.templates.lock();
        Ok(templates
            .iter()
            .filter_map(|template| known.iter().find(|(t, _)| t == template))
            .flat_map(|(_, agents)| agents.iter().cloned())
            .collect())
    }

    async fn watch_template(&self, template: &str) -> Result<(), LedgerError> {
        self.watched.lock().push(template.to_string());
        Ok(())
    }
}

#[async_trait]
impl PriceFeedRefresher for MockLedger {
    async fn pull(&self, oracle: &str, feed_name: &str, force: bool) -> Result<bool, LedgerError> {
        if self.fail_feeds.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("hub unreachable".into()));
        }
        self.pulls
            .lock()
            .push((oracle.to_string(), feed_name.to_string(), force));
        Ok(self.feed_changed.load(Ordering::SeqCst))
    }
}

/// Exact bonding-curve exchange: reserve needed to move supplies by
/// `(tokens1, tokens2)` minor units.
pub fn curve_exchange(params: CurveParams, state: CurveState) -> ExchangeFn {
    Arc::new(move |tokens1, tokens2| {
        let s1 = state.supply1 as f64 / 10f64.powi(params.decimals1 as i32);
        let s2 = state.supply2 as f64 / 10f64.powi(params.decimals2 as i32);
        let new_s1 = s1 + tokens1 as f64 / 10f64.powi(params.decimals1 as i32);
        let new_s2 = s2 + tokens2 as f64 / 10f64.powi(params.decimals2 as i32);

        let reserve = |a: f64, b: f64| state.dilution_factor * a.powf(params.m) * b.powf(params.n);
        let needed = (reserve(new_s1, new_s2) - reserve(s1, s2))
            * 10f64.powi(params.reserve_asset_decimals as i32);

        Ok(json!({ "reserve_needed": needed }))
    })
}

/// m = n = 2, 9 decimals everywhere, reserve in the base asset
pub fn sample_params() -> CurveParams {
    CurveParams {
        decimals1: 9,
        decimals2: 9,
        reserve_asset_decimals: 9,
        m: 2.0,
        n: 2.0,
        reserve_asset: None,
    }
}

/// One whole unit of each token issued; p2 = 2.0 under `sample_params`
pub fn unit_state() -> CurveState {
    CurveState {
        supply1: 1_000_000_000,
        supply2: 1_000_000_000,
        dilution_factor: 1.0,
        asset1: Some("asset1".into()),
        asset2: Some("asset2".into()),
    }
}
