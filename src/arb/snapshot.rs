/// An immutable deep copy of the graph at one block height.
///
/// Detection runs for a while; updates keep streaming. The detector gets a
/// frozen universe and the live graph moves on. Nothing here is shared with
/// the graph (`U256` and all ids are value types), so readers need no
/// synchronization at all.
use std::collections::HashMap;
use std::time::Instant;

use super::edge::Edge;
use super::pool::{Pool, PoolId};
use super::token::{Token, TokenId, TokenIndex};

#[derive(Debug, Clone)]
pub struct Snapshot {
    tokens: Vec<Token>,
    token_map: HashMap<TokenId, TokenIndex>,
    edges: Vec<Vec<Edge>>,
    pools: HashMap<PoolId, Pool>,
    block: u64,
    created_at: Instant,
}

impl Snapshot {
    #[must_use]
    pub fn new(
        tokens: Vec<Token>,
        token_map: HashMap<TokenId, TokenIndex>,
        edges: Vec<Vec<Edge>>,
        pools: HashMap<PoolId, Pool>,
        block: u64,
    ) -> Self {
        Self {
            tokens,
            token_map,
            edges,
            pools,
            block,
            created_at: Instant::now(),
        }
    }

    #[must_use]
    pub const fn block(&self) -> u64 {
        self.block
    }

    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn token_index(&self, id: TokenId) -> Option<TokenIndex> {
        self.token_map.get(&id).copied()
    }

    pub fn token(&self, index: TokenIndex) -> Option<&Token> {
        self.tokens.get(index)
    }

    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    #[must_use]
    pub fn edges_from(&self, index: TokenIndex) -> &[Edge] {
        self.edges.get(index).map_or(&[], Vec::as_slice)
    }

    pub fn get_pool(&self, id: PoolId) -> Option<&Pool> {
        self.pools.get(&id)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }
}
