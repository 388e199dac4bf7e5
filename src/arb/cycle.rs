/// A cycle is a list of edges that closes back on its first token.
/// It carries its precomputed weight sum and the profit factor that sum
/// implies at the infinitesimal-trade limit; the simulator decides what a
/// real-sized trade keeps of it.
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug};

use eyre::{bail, Result};

use super::edge::{profit_factor, Edge};
use super::token::TokenIndex;

#[derive(Clone)]
pub struct Cycle {
    pub edges: Vec<Edge>,
    pub total_weight: f64,
    pub profit_factor: f64,
}

impl Debug for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle({} @ {:.6})",
            self.edges
                .iter()
                .map(|e| format!("{}->{} via {:?}", e.from, e.to, e.pool))
                .collect::<Vec<_>>()
                .join(", "),
            self.profit_factor
        )
    }
}

impl Cycle {
    /// Validates shape before anything downstream trusts it:
    /// consecutive edges must chain, the last must close the loop, and no
    /// pool may be crossed twice.
    pub fn new(edges: Vec<Edge>) -> Result<Self> {
        if edges.len() < 2 {
            bail!("Cycle must have at least 2 edges");
        }

        for i in 0..edges.len() {
            let next = (i + 1) % edges.len();
            if edges[i].to != edges[next].from {
                bail!(
                    "Edge {} ends at token {} but edge {} starts at token {}",
                    i,
                    edges[i].to,
                    next,
                    edges[next].from
                );
            }
        }

        let mut pools = HashSet::with_capacity(edges.len());
        for edge in &edges {
            if !pools.insert(edge.pool) {
                bail!("Cycle crosses pool {} twice", edge.pool);
            }
        }

        let total_weight: f64 = edges.iter().map(|e| e.weight).sum();
        Ok(Self {
            edges,
            total_weight,
            profit_factor: profit_factor(total_weight),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Token index where the cycle starts and ends.
    #[must_use]
    pub fn start(&self) -> TokenIndex {
        self.edges[0].from
    }

    /// The visited token indices, without the duplicated closing node.
    #[must_use]
    pub fn token_indices(&self) -> Vec<TokenIndex> {
        self.edges.iter().map(|e| e.from).collect()
    }

    /// Rotation-invariant identity: the token sequence rotated so the
    /// smallest index leads. `[1,2,0]` and `[0,1,2]` collide on purpose;
    /// so do two cycles over the same nodes through different pools, and
    /// the set keeps whichever pays better.
    #[must_use]
    pub fn unique_key(&self) -> String {
        let mut indices = self.token_indices();
        if let Some(min_pos) = indices
            .iter()
            .enumerate()
            .min_by_key(|(_, &idx)| idx)
            .map(|(pos, _)| pos)
        {
            indices.rotate_left(min_pos);
        }
        indices
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("-")
    }

    #[must_use]
    pub fn is_profitable(&self, min_profit_factor: f64) -> bool {
        self.profit_factor >= min_profit_factor
    }
}

/// Cycles found during one snapshot scan, deduplicated under rotation.
#[derive(Default)]
pub struct CycleSet {
    cycles: HashMap<String, Cycle>,
}

impl CycleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cycle. A rotationally equivalent incumbent survives unless
    /// the newcomer is strictly more profitable.
    pub fn add(&mut self, cycle: Cycle) {
        let key = cycle.unique_key();
        match self.cycles.get(&key) {
            Some(existing) if existing.profit_factor >= cycle.profit_factor => {}
            _ => {
                self.cycles.insert(key, cycle);
            }
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.cycles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Cycles at or above the threshold, best first.
    #[must_use]
    pub fn profitable(&self, min_profit_factor: f64) -> Vec<Cycle> {
        let mut cycles: Vec<Cycle> = self
            .cycles
            .values()
            .filter(|c| c.is_profitable(min_profit_factor))
            .cloned()
            .collect();
        cycles.sort_by(|a, b| {
            b.profit_factor
                .partial_cmp(&a.profit_factor)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        cycles
    }
}
