//! Curve Engine - Off-Peg Detection & Tip Generation
//!
//! One engine per monitored curve agent. Given the agent's pending state and
//! its own fair-price getter, the engine decides whether the curve is off
//! peg, which token to trade, how much, and whether the agent's real
//! exchange function agrees that the trade pays.
//!
//! The closed-form inversion only picks direction and size. The price a
//! trader would actually get is measured by probing `get_exchange_result`
//! with a tenth of the corrective trade, because fees, rounding and the
//! capacitor make the agent diverge from the formula.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::pricing;
use super::types::{CurveParams, CurveState, ExchangeResult, OracleRef, Tip, TipAction, TokenRole};
use crate::config::FeedMode;
use crate::error::CurveError;
use crate::events::{EventBus, LedgerEvent};
use crate::ledger::{LedgerError, PriceFeedRefresher, StateOracle};
use crate::tokens::TokenRegistry;

/// Agent's own definition of fair T2 price
pub const GET_TARGET_P2: &str = "get_target_p2";

/// Agent's exchange function: `[tokens1, tokens2] -> { reserve_needed }`
pub const GET_EXCHANGE_RESULT: &str = "get_exchange_result";

/// Collaborators and settings shared by every engine.
#[derive(Clone)]
pub struct EngineContext {
    pub oracle: Arc<dyn StateOracle>,
    pub feeds: Arc<dyn PriceFeedRefresher>,
    pub tokens: Arc<TokenRegistry>,
    pub bus: EventBus,
    pub feed_mode: FeedMode,
    pub feed_refresh_interval: Duration,
}

/// Pull every feed in `oracles`, returning whether any of them changed.
pub(crate) async fn pull_feeds(
    feeds: &dyn PriceFeedRefresher,
    agent: &str,
    oracles: &[OracleRef],
    force: bool,
) -> Result<bool, CurveError> {
    let mut updated = false;
    for oracle in oracles {
        let changed = feeds
            .pull(&oracle.oracle, &oracle.feed_name, force)
            .await
            .map_err(|source| CurveError::FeedRefresh {
                agent: agent.to_string(),
                oracle: oracle.oracle.clone(),
                feed_name: oracle.feed_name.clone(),
                source,
            })?;
        updated |= changed;
    }
    Ok(updated)
}

pub struct CurveEngine {
    agent: String,
    params: CurveParams,
    oracles: Vec<OracleRef>,
    ctx: EngineContext,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl CurveEngine {
    pub(crate) fn new(
        agent: String,
        params: CurveParams,
        oracles: Vec<OracleRef>,
        ctx: EngineContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            agent,
            params,
            oracles,
            ctx,
            refresh_task: Mutex::new(None),
        })
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Periodically pull feeds and announce changes. The task only holds a
    /// weak reference, so it ends once the engine is gone.
    pub(crate) fn start_refresh_timer(self: &Arc<Self>) {
        if self.ctx.feed_mode != FeedMode::Pull {
            debug!("Push feed mode, no refresh timer for {}", self.agent);
            return;
        }

        let period = self.ctx.feed_refresh_interval;
        let engine: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                if let Err(e) = engine.refresh_feeds(false, false).await {
                    warn!("Periodic feed refresh failed for {}: {}", engine.agent, e);
                }
            }
        });

        if let Some(previous) = self.refresh_task.lock().replace(handle) {
            previous.abort();
        }
    }

    pub(crate) fn stop_refresh_timer(&self) {
        if let Some(handle) = self.refresh_task.lock().take() {
            handle.abort();
        }
    }

    /// Pull the curve's oracle feeds. No-op outside pull mode.
    pub async fn refresh_feeds(&self, force: bool, quiet: bool) -> Result<bool, CurveError> {
        if self.ctx.feed_mode != FeedMode::Pull {
            return Ok(false);
        }

        let updated = pull_feeds(self.ctx.feeds.as_ref(), &self.agent, &self.oracles, force).await?;
        if updated && !quiet {
            debug!("Feeds of {} updated", self.agent);
            self.ctx.bus.publish(LedgerEvent::FeedsUpdated);
        }
        Ok(updated)
    }

    /// Fair T2 price as the agent itself defines it.
    pub async fn target_price(&self) -> Result<f64, CurveError> {
        let getter_error = |source: LedgerError| CurveError::Getter {
            agent: self.agent.clone(),
            getter: GET_TARGET_P2.to_string(),
            source,
        };

        let value = self
            .ctx
            .oracle
            .execute_getter(&self.agent, GET_TARGET_P2, &[])
            .await
            .map_err(getter_error)?;

        value
            .as_f64()
            .ok_or_else(|| getter_error(LedgerError::Decode(format!("non-numeric target price {}", value))))
    }

    /// Marginal T2 price implied by the current pending supplies.
    pub async fn current_price(&self) -> Result<f64, CurveError> {
        let state = self.pending_state().await?;
        Ok(pricing::current_price(&self.params, &state))
    }

    async fn pending_state(&self) -> Result<CurveState, CurveError> {
        self.ctx
            .oracle
            .pending_state_vars(&self.agent)
            .await
            .map_err(|source| CurveError::PendingState {
                agent: self.agent.clone(),
                source,
            })
    }

    /// Tips for trades that would bring this curve back on peg.
    pub async fn get_tips(&self) -> Result<Vec<Tip>, CurveError> {
        self.refresh_feeds(false, true).await?;

        let state = self.pending_state().await?;
        let target_p2 = self.target_price().await?;
        let p2 = pricing::current_price(&self.params, &state);

        if pricing::is_on_peg(p2, target_p2) {
            debug!("{} is on peg: p2={} target={}", self.agent, p2, target_p2);
            return Ok(Vec::new());
        }
        if !state.is_issued() {
            debug!("{} not issued yet", self.agent);
            return Ok(Vec::new());
        }

        let (t1, t2) = futures::future::try_join(
            self.token_tip(TokenRole::T1, &state, target_p2),
            self.token_tip(TokenRole::T2, &state, target_p2),
        )
        .await?;

        Ok(t1.into_iter().chain(t2).collect())
    }

    async fn token_tip(
        &self,
        role: TokenRole,
        state: &CurveState,
        target_p2: f64,
    ) -> Result<Option<Tip>, CurveError> {
        debug!("Looking for {} tip in {}", role, self.agent);

        let decimals = self.params.decimals(role);
        let peg = pricing::peg_point(&self.params, state, role, target_p2);

        // how many tokens need to be bought/sold to get back on peg
        let Some(delta) = pricing::supply_delta(peg.target_supply, decimals, state.supply(role)) else {
            debug!("No usable {} target supply in {} (target_p2={})", role, self.agent, target_p2);
            return Ok(None);
        };

        let probe = pricing::probe_size(delta);
        if probe == 0 {
            debug!("{} delta {} too small to probe in {}", role, delta, self.agent);
            return Ok(None);
        }

        let exchange = match self.probe_exchange(role, probe).await {
            Ok(exchange) => exchange,
            Err(e) => {
                warn!("Exchange getter failed for {} in {}: {}", role, self.agent, e);
                return Ok(None);
            }
        };

        let current_price = pricing::probe_price(
            exchange.reserve_needed,
            self.params.reserve_asset_decimals,
            probe,
            decimals,
        );
        if current_price < 0.0 && probe < 0 {
            return Err(CurveError::InvariantViolation {
                agent: self.agent.clone(),
                detail: format!(
                    "negative current {} price {} for probe {}, reserve_needed={}",
                    role, current_price, probe, exchange.reserve_needed
                ),
            });
        }
        // a negative price on a buy happens while the capacitor is very large

        let price_difference_percentage =
            pricing::price_difference_percentage(current_price, peg.target_price);

        if !pricing::is_profitable(delta, current_price, peg.target_price) {
            info!(
                "{} trade is not profitable in {} (current {:.6}, target {:.6})",
                role, self.agent, current_price, peg.target_price
            );
            return Ok(None);
        }

        let token = match state.asset(role) {
            Some(asset) => self.ctx.tokens.symbol(asset).await,
            None => role.to_string(),
        };
        let reserve_token = self.ctx.tokens.symbol(self.params.reserve_asset()).await;

        let tip = Tip {
            aa: self.agent.clone(),
            action: TipAction::from_delta(delta),
            token_role: role,
            token,
            reserve_token,
            current_price,
            target_price: peg.target_price,
            price_difference_percentage,
            max_amount: pricing::major_units(delta.unsigned_abs() as f64, decimals),
        };

        info!(
            "Tip for {}: {} up to {:.6} {} ({} at {:.6}, target {:.6}, {:+.2}%)",
            self.agent,
            tip.action,
            tip.max_amount,
            tip.token,
            tip.reserve_token,
            tip.current_price,
            tip.target_price,
            tip.price_difference_percentage
        );

        Ok(Some(tip))
    }

    async fn probe_exchange(&self, role: TokenRole, probe: i64) -> Result<ExchangeResult, LedgerError> {
        let args = role.exchange_args(probe);
        let value = self
            .ctx
            .oracle
            .execute_getter(&self.agent, GET_EXCHANGE_RESULT, &args)
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl Drop for CurveEngine {
    fn drop(&mut self) {
        self.stop_refresh_timer();
    }
}

impl std::fmt::Debug for CurveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurveEngine")
            .field("agent", &self.agent)
            .field("oracles", &self.oracles.len())
            .finish()
    }
}

// ============================================
// TESTS
// ============================================
