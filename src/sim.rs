/// Swap simulation over a candidate cycle.
///
/// The log-weight search decides a cycle is profitable at the
/// infinitesimal-trade limit; this module decides what an actual trade
/// keeps of that edge. Swap outputs use the integer constant-product
/// formula so simulation never accumulates floating-point error.
use std::fmt::{self, Display};

use alloy::primitives::U256;
use serde::Serialize;

use crate::arb::cycle::Cycle;
use crate::arb::pool::PoolId;
use crate::arb::token::Token;

/// Constant-product swap output with the fee scaled to integer basis
/// points: `out = (r_out * a * f) / (r_in * 10000 + a * f)` with
/// `f = round((1 - fee) * 10000)`.
///
/// Returns None unless every input is strictly positive (or on the
/// absurd-reserve multiply overflow); the returned amount itself may
/// still round down to zero.
pub fn swap_output(amount_in: U256, reserve_in: U256, reserve_out: U256, fee: f64) -> Option<U256> {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return None;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let fee_scaled = ((1.0 - fee) * 10_000.0).round() as u64;
    if fee_scaled == 0 {
        return None;
    }

    let amount_with_fee = amount_in.checked_mul(U256::from(fee_scaled))?;
    let numerator = reserve_out.checked_mul(amount_with_fee)?;
    let denominator = reserve_in
        .checked_mul(U256::from(10_000_u64))?
        .checked_add(amount_with_fee)?;

    Some(numerator / denominator)
}

/// What one simulated trip around a cycle came out to.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub amount_in: U256,
    pub amount_out: U256,
    pub profit: U256,
    pub profit_factor: f64,
}

impl Simulation {
    fn from_amounts(amount_in: U256, amount_out: U256) -> Self {
        let profit = amount_out.saturating_sub(amount_in);
        let profit_factor = if amount_in.is_zero() {
            0.0
        } else {
            f64::from(amount_out) / f64::from(amount_in)
        };
        Self {
            amount_in,
            amount_out,
            profit,
            profit_factor,
        }
    }
}

/// Maximum share of the first hop's input reserve we open with.
const INPUT_SHARE: u64 = 100; // 1%
/// Maximum share of any hop's output reserve we allow to move.
const SLIPPAGE_SHARE: u64 = 10; // 10%
/// Restart bound for the max-input walk. Both corrections shrink the
/// input strictly, so this only trips on pathological pools.
const MAX_SIZING_ROUNDS: usize = 64;

#[derive(Debug, Clone)]
pub struct Simulator {
    min_profit_factor: f64,
}

impl Simulator {
    #[must_use]
    pub const fn new(min_profit_factor: f64) -> Self {
        Self { min_profit_factor }
    }

    /// Simulate a validated cycle at a realistic size. None means the
    /// cycle does not clear `min_profit_factor` once slippage is real.
    pub fn simulate(&self, cycle: &Cycle) -> Option<Simulation> {
        let amount_in = Self::max_input(cycle)?;
        let amount_out = Self::walk(cycle, amount_in)?;

        let simulation = Simulation::from_amounts(amount_in, amount_out);
        (simulation.profit_factor >= self.min_profit_factor).then_some(simulation)
    }

    /// Largest input that stays inside the per-hop slippage cap.
    ///
    /// Start at 1% of the first hop's input reserve and walk the cycle;
    /// a hop moving more than 10% of its output reserve scales the input
    /// down proportionally, a hop producing nothing halves it. Either
    /// correction strictly shrinks the input, so the walk converges.
    pub fn max_input(cycle: &Cycle) -> Option<U256> {
        let first = cycle.edges.first()?;
        let mut input = first.reserve_in / U256::from(INPUT_SHARE);
        if input.is_zero() {
            return None;
        }

        'sizing: for _ in 0..MAX_SIZING_ROUNDS {
            let mut amount = input;
            for edge in &cycle.edges {
                let output = swap_output(amount, edge.reserve_in, edge.reserve_out, edge.fee)
                    .unwrap_or(U256::ZERO);
                if output.is_zero() {
                    input /= U256::from(2);
                    if input.is_zero() {
                        return None;
                    }
                    continue 'sizing;
                }

                let cap = edge.reserve_out / U256::from(SLIPPAGE_SHARE);
                if output > cap {
                    let scaled = input.checked_mul(cap)? / output;
                    input = if scaled < input && !scaled.is_zero() {
                        scaled
                    } else {
                        input / U256::from(2)
                    };
                    if input.is_zero() {
                        return None;
                    }
                    continue 'sizing;
                }

                amount = output;
            }
            return Some(input);
        }

        log::debug!("max_input failed to converge for {cycle:?}");
        None
    }

    /// Push `amount_in` through every hop; None if any hop dies.
    fn walk(cycle: &Cycle, amount_in: U256) -> Option<U256> {
        let mut amount = amount_in;
        for edge in &cycle.edges {
            amount = swap_output(amount, edge.reserve_in, edge.reserve_out, edge.fee)?;
            if amount.is_zero() {
                return None;
            }
        }
        Some(amount)
    }

    /// Optional post-pass: binary-search the input between a small floor
    /// and 10% of the first hop's reserve, maximizing absolute profit.
    /// The profit curve is single-peaked, so we probe the slope with a
    /// small delta and move toward the rising side.
    pub fn refine(&self, cycle: &Cycle) -> Option<Simulation> {
        let first = cycle.edges.first()?;
        let floor = U256::from(1_000_u64);
        let ceiling = first.reserve_in / U256::from(SLIPPAGE_SHARE);
        if ceiling <= floor {
            return None;
        }

        let precision = U256::from(1_000_u64);
        let delta = U256::from(1_000_u64);

        let mut left = floor;
        let mut right = ceiling;
        let mut best: Option<Simulation> = None;

        let mut count = 0;
        while right.saturating_sub(left) > precision {
            count += 1;
            if count > 100 {
                log::error!("refine failed to converge after {count} iterations");
                break;
            }

            let amount = (left + right) / U256::from(2);
            let amount_delta = amount + delta;

            let (Some(out), Some(out_delta)) =
                (Self::walk(cycle, amount), Self::walk(cycle, amount_delta))
            else {
                break;
            };

            let profit = out.saturating_sub(amount);
            let profit_delta = out_delta.saturating_sub(amount_delta);

            if profit_delta > profit {
                // Rising profit curve
                left = amount;
            } else {
                // Falling profit curve
                right = amount;
            }

            for (candidate_in, candidate_profit, candidate_out) in
                [(amount, profit, out), (amount_delta, profit_delta, out_delta)]
            {
                if best
                    .as_ref()
                    .is_none_or(|b| candidate_profit > b.profit)
                {
                    best = Some(Simulation::from_amounts(candidate_in, candidate_out));
                }
            }
        }

        best.filter(|s| s.profit_factor >= self.min_profit_factor)
    }
}

/// The record the pipeline hands downstream for each profitable cycle
/// that survived simulation.
#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    /// Visited tokens in trade order, starting token first
    pub path: Vec<Token>,
    /// Pool crossed on each hop
    pub pools: Vec<PoolId>,
    pub amount_in: U256,
    pub amount_out: U256,
    pub profit: U256,
    pub profit_factor: f64,
    /// Block the detection snapshot was built at
    pub block: u64,
    /// Snapshot creation to opportunity emission
    pub latency_ms: u64,
}

impl Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self
            .path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        write!(
            f,
            "{} -> {} | in {} out {} (x{:.6}) @ block {}",
            path,
            self.path.first().map_or_else(String::new, ToString::to_string),
            self.amount_in,
            self.amount_out,
            self.profit_factor,
            self.block
        )
    }
}
