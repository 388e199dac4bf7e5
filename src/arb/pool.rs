/// A constant-product pool between two tokens.
/// The graph expects pools to be this.
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};

use alloy::primitives::{Address, U256};
use eyre::{bail, Result};
use serde::Serialize;

use super::token::TokenId;

/// Globally unique identifier for a pool: its contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize)]
pub struct PoolId(pub Address);

impl From<Address> for PoolId {
    fn from(addr: Address) -> Self {
        Self(addr)
    }
}

impl TryFrom<&str> for PoolId {
    type Error = eyre::Error;

    fn try_from(s: &str) -> Result<Self> {
        s.parse::<Address>()
            .map(Self)
            .map_err(|e| eyre::eyre!("Invalid pool address {s}: {e}"))
    }
}

impl Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = format!("{}", self.0);
        let hex = hex.trim_start_matches("0x").to_uppercase();
        let zeros = hex.chars().rev().take_while(|&c| c == '0').count();
        if zeros > 10 {
            write!(f, "{}", hex.trim_end_matches('0'))
        } else {
            write!(f, "{hex}")
        }
    }
}

impl Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Lowercase hex is the canonical outward form
        write!(f, "{:#x}", self.0)
    }
}

/// Pool state as it comes from bootstrap or PoolAdded events.
/// Reserves track the latest applied update; `fee` is the proportional
/// input fee, e.g. 0.003 for the standard 30 bps.
#[derive(Clone)]
pub struct Pool {
    pub id: PoolId,
    pub token0: TokenId,
    pub token1: TokenId,
    pub reserve0: U256,
    pub reserve1: U256,
    pub fee: f64,
}

/// Two pools are equal if they have the same address
/// This is for `HashSet` operations
impl PartialEq for Pool {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Pool {}

/// Hash the pool by its address
/// This is for `HashSet` operations
impl Hash for Pool {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pool({:?}, {} {:?} / {} {:?} @ {})",
            self.id, self.reserve0, self.token0, self.reserve1, self.token1, self.fee
        )
    }
}

impl Pool {
    /// Builds a pool, rejecting the degenerate shapes the ingest layer
    /// should never hand us.
    pub fn new(
        id: PoolId,
        token0: TokenId,
        token1: TokenId,
        reserve0: U256,
        reserve1: U256,
        fee: f64,
    ) -> Result<Self> {
        if token0 == token1 {
            bail!("Pool token0 and token1 must be different");
        }
        if !(0.0..1.0).contains(&fee) {
            bail!("Pool fee must be in [0, 1), got {fee}");
        }

        Ok(Self {
            id,
            token0,
            token1,
            reserve0,
            reserve1,
            fee,
        })
    }

    /// Oriented reserves for a swap out of `token_in`, or None if the
    /// token is not a side of this pool.
    pub fn reserves_from(&self, token_in: TokenId) -> Option<(U256, U256)> {
        if token_in == self.token0 {
            Some((self.reserve0, self.reserve1))
        } else if token_in == self.token1 {
            Some((self.reserve1, self.reserve0))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arb::test_helpers::*;

    #[test]
    fn test_same_tokens_rejected() {
        let err = Pool::new(
            PoolId::from(address_from_str("F1")),
            TokenId::from(address_from_str("A")),
            TokenId::from(address_from_str("A")),
            U256::from(100),
            U256::from(200),
            0.003,
        )
        .err()
        .unwrap();
        assert_eq!(err.to_string(), "Pool token0 and token1 must be different");
    }

    #[test]
    fn test_fee_out_of_range_rejected() {
        for bad_fee in [1.0, 1.5, -0.1] {
            let pool = Pool::new(
                PoolId::from(address_from_str("F1")),
                TokenId::from(address_from_str("A")),
                TokenId::from(address_from_str("B")),
                U256::from(100),
                U256::from(200),
                bad_fee,
            );
            assert!(pool.is_err());
        }
    }

    #[test]
    fn test_equality_by_address_only() {
        let a = pool("F1", "A", "B", 100, 200);
        let b = pool("F1", "A", "B", 999, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_reserves_from() {
        let p = pool("F1", "A", "B", 100, 200);
        assert_eq!(
            p.reserves_from(TokenId::from(address_from_str("A"))),
            Some((U256::from(100), U256::from(200)))
        );
        assert_eq!(
            p.reserves_from(TokenId::from(address_from_str("B"))),
            Some((U256::from(200), U256::from(100)))
        );
        assert_eq!(p.reserves_from(TokenId::from(address_from_str("C"))), None);
    }
}
