//! Agent discovery
//!
//! Finds every agent defined from the configured templates. Curve agents get
//! an engine; auxiliary agents (governance, deposit, buffer, arb) only get
//! their pending state tracked, because curve getters read them. New
//! definitions are picked up from `DefinitionApplied` events.

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::curve::CurveRegistry;
use crate::error::CurveError;
use crate::events::{EventBus, LedgerEvent};
use crate::ledger::{AgentDirectory, StateOracle};

#[derive(Debug, Clone, Default)]
pub struct Templates {
    pub curves: Vec<String>,
    pub auxiliary: Vec<String>,
}

impl Templates {
    fn all(&self) -> impl Iterator<Item = &String> {
        self.auxiliary.iter().chain(self.curves.iter())
    }
}

pub struct Watcher {
    directory: Arc<dyn AgentDirectory>,
    oracle: Arc<dyn StateOracle>,
    registry: Arc<CurveRegistry>,
    bus: EventBus,
    templates: Templates,
    watching: Mutex<bool>,
}

impl Watcher {
    pub fn new(
        directory: Arc<dyn AgentDirectory>,
        oracle: Arc<dyn StateOracle>,
        registry: Arc<CurveRegistry>,
        bus: EventBus,
        templates: Templates,
    ) -> Self {
        Self {
            directory,
            oracle,
            registry,
            bus,
            templates,
            watching: Mutex::new(false),
        }
    }

    /// Discover existing agents and start following new definitions. Runs
    /// once; later calls return immediately.
    pub async fn start_watching(&self) -> Result<(), CurveError> {
        let mut watching = self.watching.lock().await;
        if *watching {
            return Ok(());
        }

        let curves = self
            .directory
            .agents_by_templates(&self.templates.curves)
            .await
            .map_err(CurveError::Discovery)?;
        for address in curves {
            info!("Will watch curve agent {}", address);
            if let Err(e) = self.registry.create(&address).await {
                error!("Failed to set up curve {}: {}", address, e);
            }
        }

        let auxiliary = self
            .directory
            .agents_by_templates(&self.templates.auxiliary)
            .await
            .map_err(CurveError::Discovery)?;
        for address in auxiliary {
            info!("Will watch agent {}", address);
            self.oracle
                .track(&address)
                .await
                .map_err(|source| CurveError::StateTracking {
                    agent: address.clone(),
                    source,
                })?;
        }

        // subscribe before announcing interest so no definition slips through
        let events = self.bus.subscribe();
        for template in self.templates.all() {
            self.directory
                .watch_template(template)
                .await
                .map_err(CurveError::Discovery)?;
        }
        self.spawn_definition_listener(events);

        *watching = true;
        Ok(())
    }

    fn spawn_definition_listener(&self, mut events: tokio::sync::broadcast::Receiver<LedgerEvent>) {
        let registry = Arc::clone(&self.registry);
        let oracle = Arc::clone(&self.oracle);
        let templates = self.templates.clone();

        tokio::spawn(async move {
            loop {
                let (address, template) = match events.recv().await {
                    Ok(LedgerEvent::DefinitionApplied { address, template }) => (address, template),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Definition listener lagged, {} events skipped", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                if templates.curves.contains(&template) {
                    info!("Will watch new curve agent {}", address);
                    if let Err(e) = registry.create(&address).await {
                        error!("Failed to set up new curve {}: {}", address, e);
                    }
                } else if templates.auxiliary.contains(&template) {
                    info!("Will watch new agent {}", address);
                    if let Err(e) = oracle.track(&address).await {
                        error!("Failed to track new agent {}: {}", address, e);
                    }
                }
            }
        });
    }
}
