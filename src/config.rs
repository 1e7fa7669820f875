//! Configuration for the Curve Advisor
//!
//! Loaded from environment variables (with `.env` support) or a TOML file.
//! Covers the ledger connection, feed refresh policy, the agent templates to
//! watch and where emitted tips are logged.

use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::curve::Tip;

// ============================================
// FEED MODE
// ============================================

/// How oracle data feeds reach this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Light node - feeds must be pulled from a hub explicitly
    Pull,

    /// Full node - feeds arrive with the ledger, nothing to pull
    Push,
}

impl Default for FeedMode {
    fn default() -> Self {
        FeedMode::Pull
    }
}

impl std::fmt::Display for FeedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedMode::Pull => write!(f, "PULL (light)"),
            FeedMode::Push => write!(f, "PUSH (full)"),
        }
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Ledger ==========
    /// JSON-RPC endpoint of the ledger node
    pub ledger_url: String,

    pub request_timeout_secs: u64,

    // ========== Feeds ==========
    pub feed_mode: FeedMode,

    /// Background feed pull period per curve
    pub feed_refresh_interval_secs: u64,

    // ========== Tip delivery ==========
    /// Quiet window before a burst of triggers recomputes tips
    pub debounce_ms: u64,

    /// Fixed tip recomputation period in watch mode (0 = off)
    pub tip_interval_secs: u64,

    // ========== Templates ==========
    /// Curve agent templates; every agent defined from them is monitored
    pub curve_templates: Vec<String>,

    /// Non-curve templates whose agents affect curve state
    pub governance_templates: Vec<String>,
    pub deposit_template: Option<String>,
    pub buffer_template: Option<String>,
    pub arb_templates: Vec<String>,

    // ========== Symbols ==========
    /// Agent mapping asset ids to symbols (`a2s_<asset>`)
    pub token_registry_agent: Option<String>,

    pub base_asset_symbol: String,

    // ========== Tip log ==========
    pub tip_log: bool,
    pub tip_log_path: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            ledger_url: env::var("LEDGER_URL").unwrap_or(defaults.ledger_url),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),

            feed_mode: match env::var("FEED_MODE")
                .unwrap_or_else(|_| "pull".to_string())
                .to_lowercase()
                .as_str()
            {
                "push" | "full" => FeedMode::Push,
                _ => FeedMode::Pull,
            },
            feed_refresh_interval_secs: env_or(
                "FEED_REFRESH_INTERVAL_SECS",
                defaults.feed_refresh_interval_secs,
            ),

            debounce_ms: env_or("DEBOUNCE_MS", defaults.debounce_ms),
            tip_interval_secs: env_or("TIP_INTERVAL_SECS", defaults.tip_interval_secs),

            curve_templates: env_list("CURVE_TEMPLATES"),
            governance_templates: env_list("GOVERNANCE_TEMPLATES"),
            deposit_template: env_opt("DEPOSIT_TEMPLATE"),
            buffer_template: env_opt("BUFFER_TEMPLATE"),
            arb_templates: env_list("ARB_TEMPLATES"),

            token_registry_agent: env_opt("TOKEN_REGISTRY_AGENT"),
            base_asset_symbol: env::var("BASE_ASSET_SYMBOL").unwrap_or(defaults.base_asset_symbol),

            tip_log: env_or("TIP_LOG", defaults.tip_log),
            tip_log_path: env::var("TIP_LOG_PATH").unwrap_or(defaults.tip_log_path),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Templates of non-curve agents whose state curves read
    pub fn auxiliary_templates(&self) -> Vec<String> {
        self.governance_templates
            .iter()
            .chain(self.deposit_template.iter())
            .chain(self.buffer_template.iter())
            .chain(self.arb_templates.iter())
            .cloned()
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn feed_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.feed_refresh_interval_secs)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger_url.trim().is_empty() {
            return Err(eyre::eyre!("LEDGER_URL must be set"));
        }
        if self.curve_templates.is_empty() {
            return Err(eyre::eyre!(
                "CURVE_TEMPLATES is empty - nothing to monitor"
            ));
        }
        if self.feed_refresh_interval_secs == 0 {
            return Err(eyre::eyre!("FEED_REFRESH_INTERVAL_SECS must be > 0"));
        }
        if self.debounce_ms == 0 {
            return Err(eyre::eyre!("DEBOUNCE_MS must be > 0"));
        }
        Ok(())
    }

    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              CURVE ADVISOR - CONFIGURATION                 ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Ledger:            {:^40} ║", self.ledger_url);
        println!("║ Feed Mode:         {:^40} ║", self.feed_mode);
        println!("║ Feed Refresh:      {:>38}s ║", self.feed_refresh_interval_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ TEMPLATES                                                  ║");
        println!("║ • Curves:          {:^40} ║", self.curve_templates.len());
        println!("║ • Auxiliary:       {:^40} ║", self.auxiliary_templates().len());
        println!("║ • Token Registry:  {:^40} ║",
            if self.token_registry_agent.is_some() { "✓ Configured" } else { "✗ Not Set" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ TIPS                                                       ║");
        println!("║ • Debounce:        {:>37}ms ║", self.debounce_ms);
        println!("║ • Interval:        {:^40} ║",
            if self.tip_interval_secs > 0 { format!("{}s", self.tip_interval_secs) } else { "off".to_string() }
        );
        println!("║ • Tip Log:         {:^40} ║",
            if self.tip_log { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_url: "http://127.0.0.1:6611".to_string(),
            request_timeout_secs: 10,
            feed_mode: FeedMode::Pull,
            feed_refresh_interval_secs: 120,
            debounce_ms: 1000,
            tip_interval_secs: 60,
            curve_templates: vec![],
            governance_templates: vec![],
            deposit_template: None,
            buffer_template: None,
            arb_templates: vec![],
            token_registry_agent: None,
            base_asset_symbol: "GBYTE".to_string(),
            tip_log: true,
            tip_log_path: "./logs/tips.log".to_string(),
        }
    }
}

// ============================================
// TIP LOGGER
// ============================================

/// One emitted tip, as written to the tip log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipLog {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub tip: Tip,
}

impl TipLog {
    pub fn new(tip: Tip) -> Self {
        Self {
            timestamp: Utc::now(),
            tip,
        }
    }

    /// Append this log to a file as one JSON line
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// TESTS
// ============================================
