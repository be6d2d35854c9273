//! Configuration management for the swap executor
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub chains: HashMap<String, ChainConfig>,
    pub sources: SourcesConfig,
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Per-source quote timeout
    pub quote_timeout_ms: u64,
    /// Upper bound on every receipt wait
    pub receipt_timeout_secs: u64,
    /// Approve `U256::MAX` instead of the exact amount
    pub infinite_approval: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quote_timeout_ms: 10_000,
            receipt_timeout_secs: 60,
            infinite_approval: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub native_symbol: String,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u8,
    pub gas_price_strategy: GasPriceStrategy,
    pub max_gas_price_gwei: u64,
    pub enabled: bool,
}

fn default_native_decimals() -> u8 {
    18
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceStrategy {
    Legacy,
    Eip1559,
    Arbitrum,
    Optimism,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SourcesConfig {
    pub lifi: Option<SourceConfig>,
    pub zeroex: Option<SourceConfig>,
    pub paraswap: Option<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Integrator tag some aggregators ask for
    pub integrator: Option<String>,
}

impl SourcesConfig {
    /// Enabled sources in registration order
    pub fn enabled(&self) -> Vec<(&'static str, &SourceConfig)> {
        [
            ("lifi", self.lifi.as_ref()),
            ("zeroex", self.zeroex.as_ref()),
            ("paraswap", self.paraswap.as_ref()),
        ]
        .into_iter()
        .filter_map(|(id, cfg)| cfg.filter(|c| c.enabled).map(|c| (id, c)))
        .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: Option<String>,
}

impl Settings {
    /// Load settings from the configured path
    pub fn load() -> Result<Self> {
        let config_path = env::var("SWAP_EXECUTOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::from_path(&config_path)
    }

    /// Load settings from a specific file
    pub fn from_path(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text
    pub fn from_toml(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for (name, chain) in &self.chains {
            if chain.enabled && chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", name);
            }
        }

        if self.sources.enabled().is_empty() {
            anyhow::bail!("At least one quote source must be enabled");
        }

        if self.engine.receipt_timeout_secs == 0 {
            anyhow::bail!("engine.receipt_timeout_secs must be positive");
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex");
    }

    ENV_VAR
        .replace_all(input, |cap: &regex::Captures| {
            env::var(&cap[1]).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[api]
host = "127.0.0.1"
port = 8080

[metrics]
enabled = false
port = 9090

[chains.ethereum]
chain_id = 1
name = "Ethereum"
rpc_urls = ["https://rpc.example/${SWAP_TEST_RPC_KEY}"]
native_symbol = "ETH"
gas_price_strategy = "eip1559"
max_gas_price_gwei = 300
enabled = true

[chains.polygon]
chain_id = 137
name = "Polygon"
rpc_urls = []
native_symbol = "MATIC"
gas_price_strategy = "legacy"
max_gas_price_gwei = 500
enabled = false

[sources.lifi]
enabled = true

[sources.paraswap]
enabled = true
base_url = "https://apiv5.paraswap.io"

[sources.zeroex]
enabled = false

[wallet]
private_key_env = "SWAP_EXECUTOR_PRIVATE_KEY"
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("SWAP_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${SWAP_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("SWAP_TEST_RPC_KEY", "secret");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::from_path(file.path()).unwrap();
        assert_eq!(settings.enabled_chains().len(), 1);

        let eth = settings.get_chain_by_id(1).unwrap();
        assert_eq!(eth.rpc_urls[0], "https://rpc.example/secret");
        assert_eq!(eth.native_decimals, 18);
        assert_eq!(settings.engine.receipt_timeout_secs, 60);
        assert!(!settings.engine.infinite_approval);
    }

    #[test]
    fn test_sources_keep_registration_order() {
        let settings = Settings::from_toml(SAMPLE).unwrap();
        let ids: Vec<_> = settings.sources.enabled().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["lifi", "paraswap"]);
    }

    #[test]
    fn test_rejects_config_without_sources() {
        let broken = SAMPLE.replace("[sources.lifi]\nenabled = true", "[sources.lifi]\nenabled = false")
            .replace("[sources.paraswap]\nenabled = true", "[sources.paraswap]\nenabled = false");
        assert!(Settings::from_toml(&broken).is_err());
    }
}
