//! Curve data model: params, state snapshots, oracle refs and tips.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Asset id the ledger uses for its native coin.
pub const BASE_ASSET: &str = "base";

// ============================================
// PARAMS & STATE
// ============================================

/// Static curve parameters, fixed when the agent was defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveParams {
    pub decimals1: u32,
    pub decimals2: u32,
    pub reserve_asset_decimals: u32,
    pub m: f64,
    pub n: f64,
    /// `None` means the ledger's base asset
    #[serde(default)]
    pub reserve_asset: Option<String>,
}

impl CurveParams {
    /// Check that the inversion formulas are well defined for these params.
    pub fn validate(&self) -> Result<(), String> {
        if !self.m.is_finite() || self.m <= 0.0 {
            return Err(format!("m must be > 0 (got {})", self.m));
        }
        if !self.n.is_finite() || self.n <= 1.0 {
            return Err(format!("n must be > 1 (got {})", self.n));
        }
        Ok(())
    }

    pub fn reserve_asset(&self) -> &str {
        self.reserve_asset.as_deref().unwrap_or(BASE_ASSET)
    }

    pub fn decimals(&self, role: TokenRole) -> u32 {
        match role {
            TokenRole::T1 => self.decimals1,
            TokenRole::T2 => self.decimals2,
        }
    }
}

/// Oracle feed the curve's fair price depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OracleRef {
    pub oracle: String,
    pub feed_name: String,
}

fn default_dilution_factor() -> f64 {
    1.0
}

/// Snapshot of a curve's pending state vars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveState {
    #[serde(default)]
    pub supply1: u64,
    #[serde(default)]
    pub supply2: u64,
    #[serde(default = "default_dilution_factor")]
    pub dilution_factor: f64,
    #[serde(default)]
    pub asset1: Option<String>,
    #[serde(default)]
    pub asset2: Option<String>,
}

impl Default for CurveState {
    fn default() -> Self {
        Self {
            supply1: 0,
            supply2: 0,
            dilution_factor: default_dilution_factor(),
            asset1: None,
            asset2: None,
        }
    }
}

impl CurveState {
    /// Both tokens have been issued.
    pub fn is_issued(&self) -> bool {
        self.supply1 != 0 && self.supply2 != 0
    }

    pub fn supply(&self, role: TokenRole) -> u64 {
        match role {
            TokenRole::T1 => self.supply1,
            TokenRole::T2 => self.supply2,
        }
    }

    pub fn asset(&self, role: TokenRole) -> Option<&str> {
        match role {
            TokenRole::T1 => self.asset1.as_deref(),
            TokenRole::T2 => self.asset2.as_deref(),
        }
    }
}

/// Decoded `get_exchange_result` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExchangeResult {
    /// Reserve minor units paid in (negative when reserve is paid out)
    pub reserve_needed: f64,
}

// ============================================
// TIPS
// ============================================

/// Which of the curve's two tokens a tip trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenRole {
    T1,
    T2,
}

impl TokenRole {
    /// Arguments for `get_exchange_result`: `[tokens1, tokens2]`.
    pub fn exchange_args(self, amount: i64) -> [Value; 2] {
        match self {
            TokenRole::T1 => [Value::from(amount), Value::from(0)],
            TokenRole::T2 => [Value::from(0), Value::from(amount)],
        }
    }
}

impl std::fmt::Display for TokenRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenRole::T1 => write!(f, "T1"),
            TokenRole::T2 => write!(f, "T2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipAction {
    Buy,
    Sell,
}

impl TipAction {
    /// Buy when supply has to grow, sell when it has to shrink.
    pub fn from_delta(delta: i64) -> Self {
        if delta > 0 {
            TipAction::Buy
        } else {
            TipAction::Sell
        }
    }
}

impl std::fmt::Display for TipAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TipAction::Buy => write!(f, "buy"),
            TipAction::Sell => write!(f, "sell"),
        }
    }
}

/// Advisory trade that would move a curve back toward its peg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    /// Curve agent address
    pub aa: String,
    pub action: TipAction,
    pub token_role: TokenRole,
    /// Symbol of the traded token
    pub token: String,
    /// Symbol of the reserve asset
    pub reserve_token: String,
    /// Price measured by probing the agent, in reserve per token
    pub current_price: f64,
    pub target_price: f64,
    /// `(target - current) / current * 100`, `+inf` when current <= 0
    pub price_difference_percentage: f64,
    /// Full trade size needed to restore the peg, in major units
    pub max_amount: f64,
}
