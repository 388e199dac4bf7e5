/// A token is what we are trading
/// Here, mostly for type safety.
use alloy::primitives::Address;
use core::fmt::{self, Debug};
use eyre::Result;
use serde::Serialize;
use std::fmt::Display;

/// Dense index of a token inside one graph instance.
/// Stable for the lifetime of the graph, meaningless outside of it.
pub type TokenIndex = usize;

/// Globally unique identifier for a token: its contract address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize)]
pub struct TokenId(pub Address);

impl TryFrom<&str> for TokenId {
    type Error = eyre::Error;

    fn try_from(s: &str) -> Result<Self> {
        s.parse::<Address>()
            .map(Self)
            .map_err(|e| eyre::eyre!("Invalid token address {s}: {e}"))
    }
}

impl TryFrom<String> for TokenId {
    type Error = eyre::Error;

    fn try_from(s: String) -> Result<Self> {
        Self::try_from(s.as_str())
    }
}

impl From<Address> for TokenId {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

/// Custom Debug implementation to truncate trailing zeros.
/// This is useful for testing where we deterministically generate the addresses from short strings
/// and pad them with zeros to ensure they are 40 characters long.
/// However, we don't want to print the full 40 character hex string when debugging.
/// There is a '10 zeros test' in case we have some real address that has trailing zeros.
/// We consider the odds of 10+ trailing zeros to be so low that we can safely truncate.
impl Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = format!("{}", self.0);
        let hex = hex.trim_start_matches("0x").to_uppercase();
        let zeros = hex.chars().rev().take_while(|&c| c == '0').count();
        if zeros > 10 {
            let trimmed = hex.trim_end_matches('0');
            write!(f, "{trimmed}")
        } else {
            write!(f, "{hex}")
        }
    }
}

impl Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Lowercase hex is the canonical outward form
        write!(f, "{:#x}", self.0)
    }
}

/// Token metadata as delivered by the ingest layer.
/// Immutable once created; the graph assigns it a dense `TokenIndex` on insertion.
#[derive(Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize)]
pub struct Token {
    pub id: TokenId,
    pub symbol: String,
    pub decimals: u8,
}

impl Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.symbol, self.id)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

impl Token {
    pub const fn new(id: TokenId, symbol: String, decimals: u8) -> Self {
        Self {
            id,
            symbol,
            decimals,
        }
    }

    /// A token we only know by address, e.g. the far side of a freshly listed pool.
    /// Decimals default to 18 until the ingest layer tells us better.
    pub fn placeholder(id: TokenId) -> Self {
        Self {
            id,
            symbol: "?".to_string(),
            decimals: 18,
        }
    }
}
