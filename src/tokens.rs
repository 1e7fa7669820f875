//! Token symbol lookup
//!
//! Symbols live in a token-registry agent under `a2s_<asset>`. They never
//! change once registered, so hits are cached for the process lifetime.
//! Misses are not cached: a symbol may be registered later.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::curve::BASE_ASSET;
use crate::ledger::StateOracle;

pub struct TokenRegistry {
    oracle: Arc<dyn StateOracle>,
    registry_agent: Option<String>,
    symbols: DashMap<String, String>,
}

impl TokenRegistry {
    pub fn new(
        oracle: Arc<dyn StateOracle>,
        registry_agent: Option<String>,
        base_symbol: &str,
    ) -> Self {
        let symbols = DashMap::new();
        symbols.insert(BASE_ASSET.to_string(), base_symbol.to_string());

        Self {
            oracle,
            registry_agent,
            symbols,
        }
    }

    /// Symbol for `asset`, falling back to the asset id itself.
    pub async fn symbol(&self, asset: &str) -> String {
        if let Some(symbol) = self.symbols.get(asset) {
            return symbol.clone();
        }

        let Some(registry) = self.registry_agent.as_deref() else {
            return asset.to_string();
        };

        let var = format!("a2s_{}", asset);
        match self.oracle.read_state_var(registry, &var).await {
            Ok(Some(value)) => match value.as_str() {
                Some(symbol) => {
                    debug!("Resolved {} -> {}", asset, symbol);
                    self.symbols.insert(asset.to_string(), symbol.to_string());
                    symbol.to_string()
                }
                None => {
                    warn!("Non-string symbol for {}: {}", asset, value);
                    asset.to_string()
                }
            },
            Ok(None) => asset.to_string(),
            Err(e) => {
                warn!("Symbol lookup for {} failed: {}", asset, e);
                asset.to_string()
            }
        }
    }
}
