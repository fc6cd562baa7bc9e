//! Chain Resolver
//!
//! Maps a numeric EIP-155 chain id to a usable network endpoint.
//! Ships a built-in table of public RPC endpoints and optionally overlays
//! entries from a RON file (`config/chains.ron`), so operators can point a
//! chain at a private node or add a chain the table does not know.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// CAIP-2 namespace for EVM chains
pub const EIP155_NAMESPACE: &str = "eip155";

/// A chain the signer can route transactions to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain_id: u64,
    pub name: String,
    /// Default HTTP JSON-RPC endpoint
    pub rpc_url: String,
    #[serde(default = "default_native_currency")]
    pub native_currency: String,
}

fn default_native_currency() -> String {
    "ETH".to_string()
}

impl ChainInfo {
    fn new(chain_id: u64, name: &str, rpc_url: &str, native_currency: &str) -> Self {
        Self {
            chain_id,
            name: name.to_string(),
            rpc_url: rpc_url.to_string(),
            native_currency: native_currency.to_string(),
        }
    }

    /// CAIP-2 identifier, e.g. `eip155:1`
    pub fn caip2(&self) -> String {
        format!("{}:{}", EIP155_NAMESPACE, self.chain_id)
    }
}

/// Best free public RPC URL per chain.
fn builtin_chains() -> Vec<ChainInfo> {
    vec![
        ChainInfo::new(1, "mainnet", "https://eth.llamarpc.com", "ETH"),
        ChainInfo::new(10, "optimism", "https://mainnet.optimism.io", "ETH"),
        ChainInfo::new(56, "bsc", "https://bsc-dataseed.bnbchain.org", "BNB"),
        ChainInfo::new(100, "gnosis", "https://rpc.gnosischain.com", "xDAI"),
        ChainInfo::new(137, "polygon", "https://polygon-rpc.com", "POL"),
        ChainInfo::new(324, "zksync", "https://mainnet.era.zksync.io", "ETH"),
        ChainInfo::new(8453, "base", "https://mainnet.base.org", "ETH"),
        ChainInfo::new(42161, "arbitrum", "https://arb1.arbitrum.io/rpc", "ETH"),
        ChainInfo::new(43114, "avalanche", "https://api.avax.network/ext/bc/C/rpc", "AVAX"),
        ChainInfo::new(59144, "linea", "https://rpc.linea.build", "ETH"),
        ChainInfo::new(84532, "base-sepolia", "https://sepolia.base.org", "ETH"),
        ChainInfo::new(534352, "scroll", "https://rpc.scroll.io", "ETH"),
        ChainInfo::new(11155111, "sepolia", "https://rpc.sepolia.org", "ETH"),
    ]
}

/// Parse a CAIP-2 chain reference of the form `eip155:<positive integer>`.
///
/// Anything else (other namespaces, extra segments, zero, signs, hex) is rejected.
pub fn parse_eip155_chain_id(chain: &str) -> Option<u64> {
    let mut parts = chain.split(':');
    let namespace = parts.next()?;
    let reference = parts.next()?;

    if parts.next().is_some() || namespace != EIP155_NAMESPACE {
        return None;
    }

    if reference.is_empty() || !reference.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    reference.parse::<u64>().ok().filter(|id| *id > 0)
}

/// Resolves chain ids to endpoints
#[derive(Debug, Clone)]
pub struct ChainResolver {
    chains: HashMap<u64, ChainInfo>,
}

impl ChainResolver {
    /// Resolver over the built-in public endpoint table
    pub fn with_defaults() -> Self {
        Self::from_chains(builtin_chains())
    }

    pub fn from_chains(chains: Vec<ChainInfo>) -> Self {
        Self {
            chains: chains
                .into_iter()
                .filter(|c| !c.rpc_url.is_empty())
                .map(|c| (c.chain_id, c))
                .collect(),
        }
    }

    /// Built-in table overlaid with the entries of a RON file, if present.
    ///
    /// A missing or malformed file is logged and the defaults are used.
    pub fn load(path: &Path) -> Self {
        let mut resolver = Self::with_defaults();

        if !path.exists() {
            log::info!("[chains] No chain config at {:?}, using built-in endpoints", path);
            return resolver;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match ron::from_str::<Vec<ChainInfo>>(&content) {
                Ok(overrides) => {
                    log::info!(
                        "[chains] Loaded {} chain overrides from {:?}: {:?}",
                        overrides.len(),
                        path,
                        overrides.iter().map(|c| c.chain_id).collect::<Vec<_>>()
                    );
                    resolver.overlay(overrides);
                }
                Err(e) => log::error!("[chains] Failed to parse {:?}: {}", path, e),
            },
            Err(e) => log::error!("[chains] Failed to read {:?}: {}", path, e),
        }

        resolver
    }

    /// Replace or add chains. Entries with an empty endpoint remove the chain.
    pub fn overlay(&mut self, chains: Vec<ChainInfo>) {
        for chain in chains {
            if chain.rpc_url.is_empty() {
                self.chains.remove(&chain.chain_id);
            } else {
                self.chains.insert(chain.chain_id, chain);
            }
        }
    }

    pub fn resolve(&self, chain_id: u64) -> Option<&ChainInfo> {
        self.chains.get(&chain_id)
    }

    pub fn is_supported(&self, chain_id: u64) -> bool {
        self.chains.contains_key(&chain_id)
    }

    /// Supported chain ids, ascending
    pub fn supported_chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ChainResolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_eip155_chain_id() {
        assert_eq!(parse_eip155_chain_id("eip155:1"), Some(1));
        assert_eq!(parse_eip155_chain_id("eip155:8453"), Some(8453));
        assert_eq!(parse_eip155_chain_id("eip155:0"), None);
        assert_eq!(parse_eip155_chain_id("eip155:-1"), None);
        assert_eq!(parse_eip155_chain_id("eip155:1.5"), None);
        assert_eq!(parse_eip155_chain_id("eip155:0x1"), None);
        assert_eq!(parse_eip155_chain_id("eip155:"), None);
        assert_eq!(parse_eip155_chain_id("eip155:1:extra"), None);
        assert_eq!(parse_eip155_chain_id("solana:1"), None);
        assert_eq!(parse_eip155_chain_id("1"), None);
        assert_eq!(parse_eip155_chain_id(""), None);
    }

    #[test]
    fn test_builtin_resolution() {
        let resolver = ChainResolver::with_defaults();
        assert_eq!(resolver.resolve(1).map(|c| c.name.as_str()), Some("mainnet"));
        assert_eq!(resolver.resolve(137).map(|c| c.caip2()), Some("eip155:137".to_string()));
        assert!(resolver.resolve(999_999).is_none());
        assert!(resolver.supported_chain_ids().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_overlay_adds_replaces_and_removes() {
        let mut resolver = ChainResolver::with_defaults();
        resolver.overlay(vec![
            ChainInfo::new(1, "mainnet", "http://localhost:8545", "ETH"),
            ChainInfo::new(31337, "anvil", "http://localhost:8546", "ETH"),
            ChainInfo::new(137, "polygon", "", "POL"),
        ]);

        assert_eq!(resolver.resolve(1).unwrap().rpc_url, "http://localhost:8545");
        assert!(resolver.is_supported(31337));
        assert!(!resolver.is_supported(137));
    }

    #[test]
    fn test_load_from_ron_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[(chain_id: 31337, name: "anvil", rpc_url: "http://127.0.0.1:8545")]"#
        )
        .unwrap();

        let resolver = ChainResolver::load(file.path());
        let anvil = resolver.resolve(31337).expect("anvil chain");
        assert_eq!(anvil.native_currency, "ETH");
        assert!(resolver.is_supported(1));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let resolver = ChainResolver::load(Path::new("/nonexistent/chains.ron"));
        assert!(resolver.is_supported(8453));
    }
}
