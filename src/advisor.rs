//! Tip Advisor
//!
//! Entry point for consumers. Owns the started/not-started lifecycle and
//! fans tips out to subscribers:
//! - on oracle feed updates (debounced, all curves)
//! - on trade requests applied to a curve (debounced per curve)
//! - on a fixed interval (all curves)

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::curve::{CurveRegistry, Tip};
use crate::debounce::Debouncer;
use crate::error::CurveError;
use crate::events::{EventBus, LedgerEvent};
use crate::watcher::Watcher;

/// Callback receiving freshly computed tips.
pub type TipHandler = Arc<dyn Fn(Vec<Tip>) + Send + Sync>;

pub struct Advisor {
    registry: Arc<CurveRegistry>,
    watcher: Arc<Watcher>,
    bus: EventBus,
    started: OnceCell<()>,
}

impl Advisor {
    pub fn new(registry: Arc<CurveRegistry>, watcher: Arc<Watcher>, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            registry,
            watcher,
            bus,
            started: OnceCell::new(),
        })
    }

    /// Start watching the ledger. Idempotent; concurrent callers wait for
    /// the first one.
    pub async fn start(&self) -> Result<(), CurveError> {
        self.started
            .get_or_try_init(|| async {
                self.watcher.start_watching().await?;
                info!("Advisor started, {} curves monitored", self.registry.len());
                Ok::<(), CurveError>(())
            })
            .await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.started.initialized()
    }

    pub fn registry(&self) -> &Arc<CurveRegistry> {
        &self.registry
    }

    pub async fn get_tips_by_agent(&self, agent: &str) -> Result<Vec<Tip>, CurveError> {
        self.start().await?;
        let curve = self
            .registry
            .get(agent)
            .ok_or_else(|| CurveError::NoCurve(agent.to_string()))?;
        curve.get_tips().await
    }

    /// Tips of every monitored curve. A curve that cannot be assessed right
    /// now is skipped.
    pub async fn get_all_tips(&self) -> Result<Vec<Tip>, CurveError> {
        self.start().await?;

        let curves: BTreeMap<_, _> = self.registry.get_all().into_iter().collect();
        let mut all_tips = Vec::new();
        for (agent, curve) in curves {
            match curve.get_tips().await {
                Ok(tips) => all_tips.extend(tips),
                Err(e) => warn!("Skipping {} this round: {}", agent, e),
            }
        }
        Ok(all_tips)
    }

    /// Push all tips after oracle feeds settle. Fires frequently when many
    /// curves share feeds.
    pub async fn subscribe_to_oracle_updates(
        self: &Arc<Self>,
        handler: TipHandler,
        window: Duration,
    ) -> Result<JoinHandle<()>, CurveError> {
        self.start().await?;

        let mut events = self.bus.subscribe();
        let advisor = Arc::clone(self);
        let debouncer = Debouncer::new(window, move || {
            let advisor = Arc::clone(&advisor);
            let handler = Arc::clone(&handler);
            async move {
                match advisor.get_all_tips().await {
                    Ok(tips) => handler(tips),
                    Err(e) => warn!("Tip computation after feed update failed: {}", e),
                }
            }
        });

        Ok(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(LedgerEvent::FeedsUpdated) => debouncer.trigger(),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Oracle subscription lagged by {} events", skipped);
                        debouncer.trigger();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }

    /// Push a curve's tips once requests to it stop arriving for `window`.
    /// Handler is only called when there is something to act on, i.e. a
    /// request moved the price off peg and nobody corrected it in time.
    pub async fn subscribe_to_requests(
        self: &Arc<Self>,
        handler: TipHandler,
        window: Duration,
    ) -> Result<JoinHandle<()>, CurveError> {
        self.start().await?;

        let mut events = self.bus.subscribe();
        let advisor = Arc::clone(self);

        Ok(tokio::spawn(async move {
            let mut debouncers: HashMap<String, Debouncer> = HashMap::new();
            loop {
                let agent = match events.recv().await {
                    Ok(LedgerEvent::RequestApplied { agent }) => agent,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Request subscription lagged by {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if advisor.registry.get(&agent).is_none() {
                    continue;
                }

                debouncers
                    .entry(agent.clone())
                    .or_insert_with(|| {
                        debug!("Request debouncer for {}", agent);
                        let advisor = Arc::clone(&advisor);
                        let handler = Arc::clone(&handler);
                        Debouncer::new(window, move || {
                            let advisor = Arc::clone(&advisor);
                            let handler = Arc::clone(&handler);
                            let agent = agent.clone();
                            async move {
                                match advisor.get_tips_by_agent(&agent).await {
                                    Ok(tips) if !tips.is_empty() => handler(tips),
                                    Ok(_) => {}
                                    Err(e) => warn!("Tip computation for {} failed: {}", agent, e),
                                }
                            }
                        })
                    })
                    .trigger();
            }
        }))
    }

    /// Push all tips every `period`.
    pub async fn subscribe_on_interval(
        self: &Arc<Self>,
        handler: TipHandler,
        period: Duration,
    ) -> Result<JoinHandle<()>, CurveError> {
        self.start().await?;

        let advisor = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match advisor.get_all_tips().await {
                    Ok(tips) => handler(tips),
                    Err(e) => warn!("Periodic tip computation failed: {}", e),
                }
            }
        }))
    }

    /// Requests plus oracle updates.
    pub async fn subscribe(
        self: &Arc<Self>,
        handler: TipHandler,
        window: Duration,
    ) -> Result<Vec<JoinHandle<()>>, CurveError> {
        let requests = self.subscribe_to_requests(Arc::clone(&handler), window).await?;
        let oracles = self.subscribe_to_oracle_updates(handler, window).await?;
        Ok(vec![requests, oracles])
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedMode;
    use crate::curve::EngineContext;
    use crate::testing::{curve_exchange, sample_params, unit_state, MockLedger};
    use crate::tokens::TokenRegistry;
    use crate::watcher::Templates;
    use parking_lot::Mutex;

    fn advisor(ledger: &Arc<MockLedger>) -> (Arc<Advisor>, EventBus) {
        let bus = EventBus::default();
        let registry = Arc::new(CurveRegistry::new(EngineContext {
            oracle: ledger.clone(),
            feeds: ledger.clone(),
            tokens: Arc::new(TokenRegistry::new(ledger.clone(), None, "GBYTE")),
            bus: bus.clone(),
            feed_mode: FeedMode::Push,
            feed_refresh_interval: Duration::from_secs(120),
        }));
        let watcher = Arc::new(Watcher::new(
            ledger.clone(),
            ledger.clone(),
            Arc::clone(&registry),
            bus.clone(),
            Templates {
                curves: vec!["CURVE_BASE".into()],
                auxiliary: vec![],
            },
        ));
        (Advisor::new(registry, watcher, bus.clone()), bus)
    }

    fn off_peg_curve(ledger: &MockLedger, agent: &str) {
        ledger.add_curve(agent, sample_params(), unit_state(), 5.0, vec![]);
        ledger.set_exchange(agent, curve_exchange(sample_params(), unit_state()));
    }

    fn recording() -> (TipHandler, Arc<Mutex<Vec<Vec<Tip>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let handler: TipHandler = Arc::new(move |tips| sink.lock().push(tips));
        (handler, calls)
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let ledger = Arc::new(MockLedger::new());
        let (advisor, _bus) = advisor(&ledger);
        assert!(!advisor.is_initialized());

        advisor.start().await.unwrap();
        advisor.start().await.unwrap();

        assert!(advisor.is_initialized());
        assert_eq!(ledger.watched_templates().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_agent_has_no_curve() {
        let ledger = Arc::new(MockLedger::new());
        let (advisor, _bus) = advisor(&ledger);

        let err = advisor.get_tips_by_agent("NOWHERE").await.unwrap_err();
        assert!(matches!(err, CurveError::NoCurve(ref agent) if agent == "NOWHERE"));
    }

    #[tokio::test]
    async fn test_all_tips_skips_failing_curve() {
        let ledger = Arc::new(MockLedger::new());
        off_peg_curve(&ledger, "A");
        off_peg_curve(&ledger, "B");
        ledger.set_templates("CURVE_BASE", &["A", "B"]);
        let (advisor, _bus) = advisor(&ledger);

        assert_eq!(advisor.get_all_tips().await.unwrap().len(), 4);

        ledger.clear_target_price("A");
        let tips = advisor.get_all_tips().await.unwrap();
        assert_eq!(tips.len(), 2);
        assert!(tips.iter().all(|t| t.aa == "B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oracle_updates_are_debounced() {
        let ledger = Arc::new(MockLedger::new());
        off_peg_curve(&ledger, "A");
        ledger.set_templates("CURVE_BASE", &["A"]);
        let (advisor, bus) = advisor(&ledger);
        let (handler, calls) = recording();

        let task = advisor
            .subscribe_to_oracle_updates(handler, Duration::from_millis(1000))
            .await
            .unwrap();

        for _ in 0..3 {
            bus.publish(LedgerEvent::FeedsUpdated);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_trigger_only_known_off_peg_curves() {
        let ledger = Arc::new(MockLedger::new());
        off_peg_curve(&ledger, "A");
        ledger.add_curve("ONPEG", sample_params(), unit_state(), 2.0, vec![]);
        ledger.set_templates("CURVE_BASE", &["A", "ONPEG"]);
        let (advisor, bus) = advisor(&ledger);
        let (handler, calls) = recording();

        let task = advisor
            .subscribe_to_requests(handler, Duration::from_millis(500))
            .await
            .unwrap();

        for agent in ["A", "A", "ONPEG", "UNKNOWN", "A"] {
            bus.publish(LedgerEvent::RequestApplied { agent: agent.into() });
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].iter().all(|t| t.aa == "A"));
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_subscription_ticks() {
        let ledger = Arc::new(MockLedger::new());
        ledger.add_curve("ONPEG", sample_params(), unit_state(), 2.0, vec![]);
        ledger.set_templates("CURVE_BASE", &["ONPEG"]);
        let (advisor, _bus) = advisor(&ledger);
        let (handler, calls) = recording();

        let task = advisor
            .subscribe_on_interval(handler, Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(125)).await;

        // empty rounds are delivered too
        assert_eq!(calls.lock().len(), 2);
        task.abort();
    }
}
