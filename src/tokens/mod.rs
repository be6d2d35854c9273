//! Token resolution: symbols and addresses to canonical addresses and decimals
//!
//! Lookups fail soft. A symbol the directory does not know is returned
//! unchanged and a decimals read that fails falls back to 18, both tagged as
//! degraded so callers can warn instead of treating them as full success.

mod cache;
mod directory;
mod resolver;

pub use cache::TtlCache;
pub use directory::{LifiTokenDirectory, TokenDirectory, TokenInfo};
pub use resolver::{NativeAsset, TokenResolver, DEFAULT_DECIMALS, TOKEN_CACHE_TTL};

#[cfg(test)]
pub use directory::MockTokenDirectory;

use ethers::types::{Address, H160};
use std::str::FromStr;

/// Zero address used for a chain's native asset
pub const NATIVE_TOKEN: Address = H160([0u8; 20]);

/// Either a canonical address or the caller's input, passed through untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRef {
    Address(Address),
    Unresolved(String),
}

impl TokenRef {
    /// Parse strict `0x` + 40 hex characters
    pub fn parse_address(input: &str) -> Option<Address> {
        let trimmed = input.trim();
        if trimmed.len() == 42 && trimmed.starts_with("0x") {
            Address::from_str(trimmed).ok()
        } else {
            None
        }
    }

    pub fn address(&self) -> Option<Address> {
        match self {
            TokenRef::Address(addr) => Some(*addr),
            TokenRef::Unresolved(_) => None,
        }
    }
}

impl std::fmt::Display for TokenRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenRef::Address(addr) => write!(f, "{:?}", addr),
            TokenRef::Unresolved(input) => write!(f, "{}", input),
        }
    }
}

/// A lookup result with an explicit marker for fallback values
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    /// Why the value is a fallback, if it is one
    pub degraded: Option<String>,
}

impl<T> Resolved<T> {
    pub fn exact(value: T) -> Self {
        Self {
            value,
            degraded: None,
        }
    }

    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            degraded: Some(reason.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// True for the zero-address native sentinel
pub fn is_native(token: &Address) -> bool {
    token.is_zero()
}
