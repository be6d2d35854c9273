//! Liquidity source clients
//!
//! One `QuoteSource` implementation per aggregator API. Adding a source means
//! adding a file here and a line to `from_settings`; the ranking never changes.

mod lifi;
mod paraswap;
mod zeroex;

pub use lifi::{LifiSource, LIFI_API};
pub use paraswap::{ParaswapSource, PARASWAP_API};
pub use zeroex::ZeroExSource;

use super::QuoteSource;
use crate::config::SourcesConfig;
use crate::error::{EngineError, EngineResult};
use crate::tokens::is_native;

use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Placeholder several aggregators use for the native asset
pub const NATIVE_PLACEHOLDER: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// Build every enabled source in registration order
pub fn from_settings(
    config: &SourcesConfig,
    timeout: Duration,
) -> EngineResult<Vec<Arc<dyn QuoteSource>>> {
    let mut sources: Vec<Arc<dyn QuoteSource>> = Vec::new();

    for (id, source_config) in config.enabled() {
        let base_url = source_config.base_url.clone();
        let api_key = source_config.api_key.as_deref();
        let source: Arc<dyn QuoteSource> = match id {
            "lifi" => Arc::new(LifiSource::new(
                base_url.unwrap_or_else(|| LIFI_API.to_string()),
                api_key,
                source_config.integrator.clone(),
                timeout,
            )?),
            "zeroex" => Arc::new(ZeroExSource::new(base_url, api_key, timeout)?),
            "paraswap" => Arc::new(ParaswapSource::new(
                base_url.unwrap_or_else(|| PARASWAP_API.to_string()),
                source_config.integrator.clone(),
                timeout,
            )?),
            other => return Err(EngineError::UnknownSource(other.to_string())),
        };
        info!("Registered liquidity source {}", id);
        sources.push(source);
    }

    Ok(sources)
}

/// Token as the aggregator APIs that use the `0xEeee` placeholder expect it
pub(crate) fn api_token(token: &Address) -> String {
    if is_native(token) {
        NATIVE_PLACEHOLDER.to_string()
    } else {
        format!("{:?}", token)
    }
}

/// Parse a decimal or `0x`-prefixed hex amount
pub(crate) fn parse_amount(field: &str, raw: &str) -> EngineResult<U256> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) if hex.is_empty() => Ok(U256::zero()),
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|_| ()),
        None => U256::from_dec_str(raw).map_err(|_| ()),
    };
    parsed.map_err(|_| EngineError::Internal(format!("invalid {} amount: {:?}", field, raw)))
}
