#![allow(dead_code)]
/// Helper functions for testing
use alloy::primitives::{Address, U256};

use super::edge::{weight, Edge};
use super::graph::TokenGraph;
use super::pool::{Pool, PoolId};
use super::token::{Token, TokenId, TokenIndex};

/// Generates a deterministic Address from a string by padding it with zeros.
/// This is useful for testing where we want consistent addresses without having to hardcode them.
/// This also allows us to use short and readable labels in tests instead of long hex strings.
pub fn address_from_str(s: &str) -> Address {
    assert!(
        s.chars().all(|c| c.is_ascii_hexdigit()),
        "Invalid hex character in string: {s}. Only hex characters are allowed."
    );
    // Take first 40 chars or pad with zeros if shorter
    let hex_str = format!("{s:0<40}");

    let mut bytes = [0u8; 20];
    for (i, chunk) in hex_str.as_bytes().chunks(2).enumerate().take(20) {
        let byte_str = std::str::from_utf8(chunk).unwrap_or("11");
        bytes[i] = u8::from_str_radix(byte_str, 16).unwrap_or(0);
    }

    Address::from(bytes)
}

pub fn token(label: &str) -> Token {
    Token::new(
        TokenId::from(address_from_str(label)),
        label.to_uppercase(),
        18,
    )
}

pub fn pool(label: &str, token0: &str, token1: &str, reserve0: u64, reserve1: u64) -> Pool {
    pool_with_fee(label, token0, token1, reserve0, reserve1, 0.003)
}

pub fn pool_with_fee(
    label: &str,
    token0: &str,
    token1: &str,
    reserve0: u64,
    reserve1: u64,
    fee: f64,
) -> Pool {
    Pool::new(
        PoolId::from(address_from_str(label)),
        TokenId::from(address_from_str(token0)),
        TokenId::from(address_from_str(token1)),
        U256::from(reserve0),
        U256::from(reserve1),
        fee,
    )
    .unwrap()
}

/// Big-reserve variant for scenarios that need realistic magnitudes.
pub fn pool_u128(
    label: &str,
    token0: &str,
    token1: &str,
    reserve0: u128,
    reserve1: u128,
) -> Pool {
    Pool::new(
        PoolId::from(address_from_str(label)),
        TokenId::from(address_from_str(token0)),
        TokenId::from(address_from_str(token1)),
        U256::from(reserve0),
        U256::from(reserve1),
        0.003,
    )
    .unwrap()
}

/// A free-standing edge between two token indices, for cycle-level tests
/// that do not need a whole graph.
pub fn edge(
    pool_label: &str,
    from: TokenIndex,
    to: TokenIndex,
    reserve_in: u64,
    reserve_out: u64,
) -> Edge {
    edge_with_fee(pool_label, from, to, reserve_in, reserve_out, 0.003)
}

pub fn edge_with_fee(
    pool_label: &str,
    from: TokenIndex,
    to: TokenIndex,
    reserve_in: u64,
    reserve_out: u64,
    fee: f64,
) -> Edge {
    let reserve_in = U256::from(reserve_in);
    let reserve_out = U256::from(reserve_out);
    Edge {
        from,
        to,
        pool: PoolId::from(address_from_str(pool_label)),
        fee,
        reserve_in,
        reserve_out,
        weight: weight(reserve_in, reserve_out, fee),
        reversed: false,
    }
}

/// Build a graph from pool tuples. Token indices follow first appearance:
/// `graph(&[("F1", "A", "B", ..), ("F2", "B", "C", ..)])` puts A at 0, B at
/// 1, C at 2.
pub fn graph(pool_args: &[(&str, &str, &str, u64, u64)]) -> TokenGraph {
    let mut graph = TokenGraph::new();
    for (label, token0, token1, reserve0, reserve1) in pool_args {
        graph.add_token(token(token0)).unwrap();
        graph.add_token(token(token1)).unwrap();
        graph
            .add_pool(pool(label, token0, token1, *reserve0, *reserve1))
            .unwrap();
    }
    graph
}
