//! Token resolver with short-lived caches

use super::{is_native, Resolved, TokenDirectory, TokenRef, TtlCache, NATIVE_TOKEN};
use crate::chain::ChainClient;
use crate::tx::erc20;

use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Staleness bound for cached symbol and decimals lookups
pub const TOKEN_CACHE_TTL: Duration = Duration::from_secs(300);

/// Decimals assumed when an on-chain read fails
pub const DEFAULT_DECIMALS: u8 = 18;

/// Native currency of a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeAsset {
    pub symbol: String,
    pub decimals: u8,
}

/// Maps symbols or addresses to canonical addresses and decimal counts
pub struct TokenResolver {
    directory: Arc<dyn TokenDirectory>,
    client: Arc<dyn ChainClient>,
    natives: HashMap<u64, NativeAsset>,
    addresses: TtlCache<(u64, String), Address>,
    decimals: TtlCache<(u64, Address), u8>,
}

impl TokenResolver {
    pub fn new(
        directory: Arc<dyn TokenDirectory>,
        client: Arc<dyn ChainClient>,
        natives: HashMap<u64, NativeAsset>,
    ) -> Self {
        Self::with_ttl(directory, client, natives, TOKEN_CACHE_TTL)
    }

    pub fn with_ttl(
        directory: Arc<dyn TokenDirectory>,
        client: Arc<dyn ChainClient>,
        natives: HashMap<u64, NativeAsset>,
        ttl: Duration,
    ) -> Self {
        Self {
            directory,
            client,
            natives,
            addresses: TtlCache::new(ttl),
            decimals: TtlCache::new(ttl),
        }
    }

    /// Native asset of a chain, if configured
    pub fn native(&self, chain_id: u64) -> Option<&NativeAsset> {
        self.natives.get(&chain_id)
    }

    /// Resolve a symbol or address.
    ///
    /// Addresses pass through untouched, including the zero address. Unknown
    /// symbols come back as `TokenRef::Unresolved` with the degraded marker set;
    /// this never fails.
    pub async fn resolve(&self, input: &str, chain_id: u64) -> Resolved<TokenRef> {
        if let Some(address) = TokenRef::parse_address(input) {
            return Resolved::exact(TokenRef::Address(address));
        }

        let symbol = input.trim().to_uppercase();
        if self
            .native(chain_id)
            .map(|n| n.symbol.eq_ignore_ascii_case(&symbol))
            .unwrap_or(false)
        {
            return Resolved::exact(TokenRef::Address(NATIVE_TOKEN));
        }

        let key = (chain_id, symbol);
        if let Some(address) = self.addresses.get(&key) {
            return Resolved::exact(TokenRef::Address(address));
        }

        match self.directory.lookup(chain_id, input.trim()).await {
            Ok(info) => {
                debug!(
                    "Resolved {} on chain {} to {:?} ({} decimals)",
                    input, chain_id, info.address, info.decimals
                );
                self.addresses.insert(key, info.address);
                if !is_native(&info.address) {
                    self.decimals.insert((chain_id, info.address), info.decimals);
                }
                Resolved::exact(TokenRef::Address(info.address))
            }
            Err(e) => {
                warn!("Could not resolve token {} on chain {}: {}", input, chain_id, e);
                Resolved::fallback(
                    TokenRef::Unresolved(input.to_string()),
                    format!("token lookup failed: {}", e),
                )
            }
        }
    }

    /// Decimal count for a token, falling back to 18 when the read fails
    pub async fn decimals(&self, token: Address, chain_id: u64) -> Resolved<u8> {
        if is_native(&token) {
            return match self.native(chain_id) {
                Some(native) => Resolved::exact(native.decimals),
                None => Resolved::fallback(
                    DEFAULT_DECIMALS,
                    format!("no native asset configured for chain {}", chain_id),
                ),
            };
        }

        if let Some(decimals) = self.decimals.get(&(chain_id, token)) {
            return Resolved::exact(decimals);
        }

        let read = self
            .client
            .call(chain_id, token, erc20::encode_decimals())
            .await
            .and_then(|output| erc20::decode_uint(&output));

        match read {
            Ok(value) if value <= U256::from(u8::MAX) => {
                let decimals = value.as_u32() as u8;
                self.decimals.insert((chain_id, token), decimals);
                Resolved::exact(decimals)
            }
            Ok(value) => Resolved::fallback(
                DEFAULT_DECIMALS,
                format!("decimals() returned out-of-range value {}", value),
            ),
            Err(e) => {
                warn!(
                    "decimals() failed for {:?} on chain {}, assuming {}: {}",
                    token, chain_id, DEFAULT_DECIMALS, e
                );
                Resolved::fallback(DEFAULT_DECIMALS, format!("decimals() read failed: {}", e))
            }
        }
    }
}
