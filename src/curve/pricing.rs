//! Closed-form curve pricing
//!
//! The curve keeps reserve `r = dilution * s1^m * s2^n`, so the marginal
//! price of T2 is `dilution * s1^m * n * s2^(n-1)` and the marginal price of
//! T1 is `m * s1^(m-1) * s2^n`. Everything here is synchronous and free of
//! I/O; the engine feeds it one pending-state snapshot at a time.

use super::types::{CurveParams, CurveState, TokenRole};

/// Relative band around the target inside which a curve counts as on-peg.
pub const ON_PEG_TOLERANCE: f64 = 0.001;

/// Probe trades are this fraction of the full corrective trade.
pub const PROBE_DIVISOR: f64 = 10.0;

/// Convert integer minor units to major units.
pub fn major_units(minor: f64, decimals: u32) -> f64 {
    minor / 10f64.powi(decimals as i32)
}

/// Current marginal price of T2 in reserve units.
pub fn current_price(params: &CurveParams, state: &CurveState) -> f64 {
    let s1 = major_units(state.supply1 as f64, params.decimals1);
    let s2 = major_units(state.supply2 as f64, params.decimals2);
    state.dilution_factor * s1.powf(params.m) * params.n * s2.powf(params.n - 1.0)
}

pub fn is_on_peg(price: f64, target_price: f64) -> bool {
    (price - target_price).abs() < ON_PEG_TOLERANCE * target_price
}

/// Supply (major units) and price of one token at which T2 trades at target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PegPoint {
    pub target_supply: f64,
    pub target_price: f64,
}

/// Solve for the supply of `role` that puts the curve on peg, holding the
/// other token's supply fixed.
pub fn peg_point(params: &CurveParams, state: &CurveState, role: TokenRole, target_p2: f64) -> PegPoint {
    let (m, n) = (params.m, params.n);
    let s1 = major_units(state.supply1 as f64, params.decimals1);
    let s2 = major_units(state.supply2 as f64, params.decimals2);

    match role {
        TokenRole::T1 => {
            let target_s1 = (target_p2 / n).powf(1.0 / m) * s2.powf((1.0 - n) / m);
            PegPoint {
                target_supply: target_s1,
                target_price: m * target_s1.powf(m - 1.0) * s2.powf(n),
            }
        }
        TokenRole::T2 => PegPoint {
            target_supply: (target_p2 / n).powf(1.0 / (n - 1.0)) * s1.powf(-m / (n - 1.0)),
            target_price: target_p2,
        },
    }
}

/// Round half toward positive infinity, so `-1.5` becomes `-1`.
pub fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Signed number of minor units to buy (positive) or sell (negative).
///
/// `None` when the target supply is not finite (e.g. for a non-positive
/// target price) or the delta does not fit in an `i64`.
pub fn supply_delta(target_supply: f64, decimals: u32, current_supply: u64) -> Option<i64> {
    // 2^63, exactly representable
    const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

    let target_minor = round_half_up(target_supply * 10f64.powi(decimals as i32));
    if !target_minor.is_finite() || target_minor < -I64_LIMIT || target_minor >= I64_LIMIT {
        return None;
    }
    let current = i64::try_from(current_supply).ok()?;
    (target_minor as i64).checked_sub(current)
}

/// Size of the probe trade for a full delta, in minor units.
pub fn probe_size(delta: i64) -> i64 {
    round_half_up(delta as f64 / PROBE_DIVISOR) as i64
}

/// Average price paid per token by a probe trade, in major units.
pub fn probe_price(
    reserve_needed: f64,
    reserve_decimals: u32,
    probe: i64,
    token_decimals: u32,
) -> f64 {
    major_units(reserve_needed, reserve_decimals) / major_units(probe as f64, token_decimals)
}

/// Signed percentage gap from the measured price to the target.
///
/// Unbounded when the measured price is not positive.
pub fn price_difference_percentage(current: f64, target: f64) -> f64 {
    if current > 0.0 {
        (target - current) / current * 100.0
    } else {
        f64::INFINITY
    }
}

/// `1` for positive numbers, `-1` for everything else.
pub fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else {
        -1
    }
}

/// Trading `delta` moves the measured price toward the target.
pub fn is_profitable(delta: i64, current: f64, target: f64) -> bool {
    sign(delta as f64) == sign(target - current)
}
