/// A directed edge of the token graph: one side of a pool.
/// Every pool contributes exactly two of these, forward and reverse.
/// The weight is the negative log of the effective exchange rate, so a
/// negative-weight cycle is a rate product above one, which is profit.
use std::fmt::{self, Debug};

use alloy::primitives::U256;

use super::pool::{Pool, PoolId};
use super::token::TokenIndex;

/// Saturation bound for edge weights. Degenerate pools (zero reserves,
/// rates beyond double range) clamp here instead of going NaN/infinite,
/// which keeps Bellman-Ford arithmetic well defined.
pub const MAX_WEIGHT: f64 = 230.0;
pub const MIN_WEIGHT: f64 = -230.0;

/// Weight of a directed pool side: `-ln((reserve_out / reserve_in) * (1 - fee))`.
///
/// Computed in log space from `approx_log10`, so huge reserves never meet
/// in a single division and close rates do not cancel catastrophically.
pub fn weight(reserve_in: U256, reserve_out: U256, fee: f64) -> f64 {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return MAX_WEIGHT;
    }

    let fee_factor = 1.0 - fee;
    if fee_factor <= 0.0 {
        return MAX_WEIGHT;
    }

    let rate_ln = (reserve_out.approx_log10() - reserve_in.approx_log10())
        * std::f64::consts::LN_10
        + fee_factor.ln();

    let w = -rate_ln;
    if w.is_nan() {
        return MAX_WEIGHT;
    }
    w.clamp(MIN_WEIGHT, MAX_WEIGHT)
}

/// Multiplicative return of a path with the given weight sum.
/// `exp(-total_weight)`; above one means the path compounds into profit.
pub fn profit_factor(total_weight: f64) -> f64 {
    (-total_weight).exp()
}

#[derive(Clone, PartialEq)]
pub struct Edge {
    pub from: TokenIndex,
    pub to: TokenIndex,
    pub pool: PoolId,
    pub fee: f64,
    pub reserve_in: U256,
    pub reserve_out: U256,
    pub weight: f64,
    /// false: token0 -> token1, true: token1 -> token0
    pub reversed: bool,
}

impl Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            // Edge(F1, 0->1, 1000/2000 @ 0.6938)
            "Edge({:?}, {}->{}, {}/{} @ {:.4})",
            self.pool, self.from, self.to, self.reserve_in, self.reserve_out, self.weight
        )
    }
}

impl Edge {
    /// The token0 -> token1 side of a pool.
    pub fn forward(pool: &Pool, idx0: TokenIndex, idx1: TokenIndex) -> Self {
        Self {
            from: idx0,
            to: idx1,
            pool: pool.id,
            fee: pool.fee,
            reserve_in: pool.reserve0,
            reserve_out: pool.reserve1,
            weight: weight(pool.reserve0, pool.reserve1, pool.fee),
            reversed: false,
        }
    }

    /// The token1 -> token0 side of a pool.
    pub fn reverse(pool: &Pool, idx0: TokenIndex, idx1: TokenIndex) -> Self {
        Self {
            from: idx1,
            to: idx0,
            pool: pool.id,
            fee: pool.fee,
            reserve_in: pool.reserve1,
            reserve_out: pool.reserve0,
            weight: weight(pool.reserve1, pool.reserve0, pool.fee),
            reversed: true,
        }
    }

    /// Overwrite reserves after a pool update and recompute the weight.
    /// Reserves arrive pool-oriented; the reversed flag picks the orientation.
    pub fn set_reserves(&mut self, reserve0: U256, reserve1: U256) {
        let (reserve_in, reserve_out) = if self.reversed {
            (reserve1, reserve0)
        } else {
            (reserve0, reserve1)
        };
        self.reserve_in = reserve_in;
        self.reserve_out = reserve_out;
        self.weight = weight(reserve_in, reserve_out, self.fee);
    }
}
