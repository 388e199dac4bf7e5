/// The live token/pool graph.
///
/// Tokens get a dense index on insertion; every pool contributes a forward
/// and a reverse edge between its two token indices. Reserve updates rewrite
/// the stored pool and both edge weights in place. The graph itself is not
/// synchronized: the manager owns it behind a lock and hands immutable
/// snapshots to everyone else.
use std::collections::HashMap;

use alloy::primitives::U256;
use eyre::{bail, Result};

use super::edge::Edge;
use super::pool::{Pool, PoolId};
use super::snapshot::Snapshot;
use super::token::{Token, TokenId, TokenIndex};

#[derive(Debug, Clone, Default)]
pub struct TokenGraph {
    /// Tokens indexed by `TokenIndex`
    token_vec: Vec<Token>,

    /// `TokenId` to `TokenIndex` mapping
    token_map: HashMap<TokenId, TokenIndex>,

    /// Adjacency list: outgoing edges per `TokenIndex`
    edges: Vec<Vec<Edge>>,

    /// Pool state by address
    pool_map: HashMap<PoolId, Pool>,
}

/// What `validate` found. Errors are broken invariants; warnings are
/// harmless oddities like tokens no pool references.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl TokenGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a token, or return the index it already has.
    pub fn add_token(&mut self, token: Token) -> Result<TokenIndex> {
        if let Some(&index) = self.token_map.get(&token.id) {
            return Ok(index);
        }

        if self.token_vec.len() != self.edges.len() {
            bail!(
                "Graph corruption: {} tokens vs {} adjacency lists",
                self.token_vec.len(),
                self.edges.len()
            );
        }

        let index = self.token_vec.len();
        self.token_map.insert(token.id, index);
        self.token_vec.push(token);
        self.edges.push(Vec::new());
        Ok(index)
    }

    /// Insert or replace a pool and its two directed edges.
    /// Unknown tokens are created as placeholders; the ingest layer
    /// backfills symbols and decimals through `add_token` later.
    pub fn add_pool(&mut self, pool: Pool) -> Result<()> {
        let idx0 = self.add_token(Token::placeholder(pool.token0))?;
        let idx1 = self.add_token(Token::placeholder(pool.token1))?;

        let forward = Edge::forward(&pool, idx0, idx1);
        let reverse = Edge::reverse(&pool, idx0, idx1);
        Self::upsert_edge(&mut self.edges[idx0], forward);
        Self::upsert_edge(&mut self.edges[idx1], reverse);

        self.pool_map.insert(pool.id, pool);
        Ok(())
    }

    /// Same pool and same target means the same pool side: overwrite it.
    fn upsert_edge(adjacency: &mut Vec<Edge>, edge: Edge) {
        if let Some(existing) = adjacency
            .iter_mut()
            .find(|e| e.pool == edge.pool && e.to == edge.to)
        {
            *existing = edge;
        } else {
            adjacency.push(edge);
        }
    }

    /// Apply fresh reserves to a pool and rewrite both its edges.
    /// Returns false (and touches nothing) when the pool is unknown.
    pub fn update_reserves(&mut self, pool_id: PoolId, reserve0: U256, reserve1: U256) -> bool {
        let Some(pool) = self.pool_map.get_mut(&pool_id) else {
            log::debug!("update_reserves: unknown pool {pool_id}");
            return false;
        };
        pool.reserve0 = reserve0;
        pool.reserve1 = reserve1;

        let (token0, token1) = (pool.token0, pool.token1);
        let (Some(&idx0), Some(&idx1)) = (self.token_map.get(&token0), self.token_map.get(&token1))
        else {
            // add_pool guarantees both tokens; reaching here is a bug
            log::error!("update_reserves: pool {pool_id} references unindexed tokens");
            return false;
        };

        if let Some(edge) = self.edges[idx0]
            .iter_mut()
            .find(|e| e.pool == pool_id && !e.reversed)
        {
            edge.set_reserves(reserve0, reserve1);
        }
        if let Some(edge) = self.edges[idx1]
            .iter_mut()
            .find(|e| e.pool == pool_id && e.reversed)
        {
            edge.set_reserves(reserve0, reserve1);
        }
        true
    }

    /// Deep copy of the current state, stamped with a block height.
    #[must_use]
    pub fn snapshot(&self, block: u64) -> Snapshot {
        Snapshot::new(
            self.token_vec.clone(),
            self.token_map.clone(),
            self.edges.clone(),
            self.pool_map.clone(),
            block,
        )
    }

    pub fn token_index(&self, id: TokenId) -> Option<TokenIndex> {
        self.token_map.get(&id).copied()
    }

    pub fn token(&self, index: TokenIndex) -> Option<&Token> {
        self.token_vec.get(index)
    }

    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.token_vec
    }

    #[must_use]
    pub fn edges_from(&self, index: TokenIndex) -> &[Edge] {
        self.edges.get(index).map_or(&[], Vec::as_slice)
    }

    pub fn get_pool(&self, id: PoolId) -> Option<&Pool> {
        self.pool_map.get(&id)
    }

    #[must_use]
    pub fn has_pool(&self, id: PoolId) -> bool {
        self.pool_map.contains_key(&id)
    }

    #[must_use]
    pub fn tracked_pool_addresses(&self) -> Vec<PoolId> {
        self.pool_map.keys().copied().collect()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.token_vec.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pool_map.len()
    }

    /// (nodes, edges, pools)
    #[must_use]
    pub fn stats(&self) -> (usize, usize, usize) {
        (self.node_count(), self.edge_count(), self.pool_count())
    }

    /// Survey the graph invariants.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        for pool in self.pool_map.values() {
            for token in [pool.token0, pool.token1] {
                if !self.token_map.contains_key(&token) {
                    report
                        .errors
                        .push(format!("pool {} references unknown token {token}", pool.id));
                }
            }

            let forward = self
                .token_map
                .get(&pool.token0)
                .and_then(|&idx| self.edges.get(idx))
                .is_some_and(|adj| adj.iter().any(|e| e.pool == pool.id && !e.reversed));
            let reverse = self
                .token_map
                .get(&pool.token1)
                .and_then(|&idx| self.edges.get(idx))
                .is_some_and(|adj| adj.iter().any(|e| e.pool == pool.id && e.reversed));
            if !forward || !reverse {
                report
                    .errors
                    .push(format!("pool {} is missing a direction", pool.id));
            }
        }

        for adjacency in &self.edges {
            for edge in adjacency {
                if !self.pool_map.contains_key(&edge.pool) {
                    report
                        .errors
                        .push(format!("edge references unknown pool {}", edge.pool));
                }
            }
        }

        for (index, token) in self.token_vec.iter().enumerate() {
            if self.edges[index].is_empty() {
                report
                    .warnings
                    .push(format!("token {token:?} participates in no pool"));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arb::test_helpers::*;

    #[test]
    fn test_add_token_idempotent() {
        let mut graph = TokenGraph::new();
        let a = graph.add_token(token("A")).unwrap();
        let b = graph.add_token(token("B")).unwrap();
        let a_again = graph.add_token(token("A")).unwrap();

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(a_again, 0);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_add_pool_creates_placeholder_tokens() {
        let mut graph = TokenGraph::new();
        graph.add_pool(pool("F1", "A", "B", 100, 200)).unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.pool_count(), 1);
        assert_eq!(graph.token(0).unwrap().symbol, "?");

        // Backfilling real metadata keeps the index
        let index = graph.add_token(token("A")).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn test_pool_yields_two_mirrored_edges() {
        let mut graph = TokenGraph::new();
        graph.add_pool(pool("F1", "A", "B", 100, 200)).unwrap();

        let forward = &graph.edges_from(0)[0];
        let reverse = &graph.edges_from(1)[0];

        assert_eq!(forward.to, 1);
        assert_eq!(reverse.to, 0);
        assert_eq!(forward.reserve_in, reverse.reserve_out);
        assert_eq!(forward.reserve_out, reverse.reserve_in);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_re_adding_pool_overwrites_edges() {
        let mut graph = TokenGraph::new();
        graph.add_pool(pool("F1", "A", "B", 100, 200)).unwrap();
        graph.add_pool(pool("F1", "A", "B", 400, 800)).unwrap();

        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edges_from(0)[0].reserve_in, U256::from(400));
    }

    #[test]
    fn test_update_reserves_unknown_pool() {
        let mut graph = TokenGraph::new();
        graph.add_pool(pool("F1", "A", "B", 100, 200)).unwrap();

        let missing = PoolId::from(address_from_str("F2"));
        assert!(!graph.update_reserves(missing, U256::from(1), U256::from(2)));
        assert_eq!(
            graph
                .get_pool(PoolId::from(address_from_str("F1")))
                .unwrap()
                .reserve0,
            U256::from(100)
        );
    }

    #[test]
    fn test_update_reserves_rewrites_both_edges() {
        let mut graph = TokenGraph::new();
        graph.add_pool(pool("F1", "A", "B", 100, 200)).unwrap();

        let id = PoolId::from(address_from_str("F1"));
        assert!(graph.update_reserves(id, U256::from(500), U256::from(250)));

        let forward = &graph.edges_from(0)[0];
        let reverse = &graph.edges_from(1)[0];
        assert_eq!(forward.reserve_in, U256::from(500));
        assert_eq!(forward.reserve_out, U256::from(250));
        assert_eq!(reverse.reserve_in, U256::from(250));
        assert_eq!(reverse.reserve_out, U256::from(500));
        // Rate flipped below one, so the forward weight is now positive
        assert!(forward.weight > 0.0);
        assert!(reverse.weight < 0.0);
    }

    #[test]
    fn test_validate_clean_graph() {
        let mut graph = TokenGraph::new();
        graph.add_pool(pool("F1", "A", "B", 100, 200)).unwrap();
        graph.add_pool(pool("F2", "B", "C", 100, 200)).unwrap();

        let report = graph.validate();
        assert!(report.is_ok());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_validate_flags_isolated_token() {
        let mut graph = TokenGraph::new();
        graph.add_pool(pool("F1", "A", "B", 100, 200)).unwrap();
        graph.add_token(token("C")).unwrap();

        let report = graph.validate();
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_stats() {
        let mut graph = TokenGraph::new();
        graph.add_pool(pool("F1", "A", "B", 100, 200)).unwrap();
        graph.add_pool(pool("F2", "B", "C", 100, 200)).unwrap();

        assert_eq!(graph.stats(), (3, 4, 2));
        assert!(graph.has_pool(PoolId::from(address_from_str("F1"))));
        assert_eq!(graph.tracked_pool_addresses().len(), 2);
    }
}
