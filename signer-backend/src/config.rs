use std::env;
use std::path::PathBuf;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const WALLETCONNECT_PROJECT_ID: &str = "WALLETCONNECT_PROJECT_ID";
    pub const RELAY_BRIDGE_URL: &str = "RELAY_BRIDGE_URL";
    pub const SIGNER_METADATA_URL: &str = "SIGNER_METADATA_URL";
    // Key derivation (see keys::create_key_provider)
    pub const SIGNER_KEY_MODE: &str = "SIGNER_KEY_MODE";
    pub const DSTACK_SIMULATOR_ENDPOINT: &str = "DSTACK_SIMULATOR_ENDPOINT";
    pub const SIGNER_MASTER_KEY: &str = "SIGNER_MASTER_KEY";
    // Optional RON file overlaying the built-in chain table
    pub const SIGNER_CHAINS_CONFIG: &str = "SIGNER_CHAINS_CONFIG";
    // Header set by the upstream authentication layer
    pub const VERIFIED_OWNER_HEADER: &str = "VERIFIED_OWNER_HEADER";
    pub const SIGNER_EAGER_CONNECT: &str = "SIGNER_EAGER_CONNECT";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8000;
    pub const DATABASE_URL: &str = "./.db/signer.db";
    pub const RELAY_BRIDGE_URL: &str = "ws://127.0.0.1:8790";
    pub const SIGNER_METADATA_URL: &str = "https://localhost";
    pub const DSTACK_ENDPOINT: &str = "http://localhost:8090";
    pub const VERIFIED_OWNER_HEADER: &str = "x-verified-owner";
    pub const CHAINS_CONFIG_FILE: &str = "chains.ron";
}

/// Returns the absolute path to the signer-backend directory.
pub fn backend_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Path of the chain overlay file: env override, else `config/chains.ron` at the repo root.
pub fn chains_config_path() -> PathBuf {
    env::var(env_vars::SIGNER_CHAINS_CONFIG)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            backend_dir()
                .parent()
                .map(|root| root.join("config"))
                .unwrap_or_else(|| PathBuf::from("config"))
                .join(defaults::CHAINS_CONFIG_FILE)
        })
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

/// Metadata advertised to peers when the engine connects.
#[derive(Clone, Debug)]
pub struct SignerMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icons: Vec<String>,
}

impl SignerMetadata {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            name: "dstack wallet signer".to_string(),
            description: "WalletConnect signer backed by dstack key derivation".to_string(),
            url: url.into(),
            icons: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub walletconnect_project_id: Option<String>,
    pub relay_bridge_url: String,
    pub metadata: SignerMetadata,
    pub verified_owner_header: String,
    pub eager_connect: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var(env_vars::PORT)
                .unwrap_or_else(|_| defaults::PORT.to_string())
                .parse()
                .expect("PORT must be a valid number"),
            database_url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            walletconnect_project_id: env::var(env_vars::WALLETCONNECT_PROJECT_ID)
                .ok()
                .filter(|v| !v.trim().is_empty()),
            relay_bridge_url: env::var(env_vars::RELAY_BRIDGE_URL)
                .unwrap_or_else(|_| defaults::RELAY_BRIDGE_URL.to_string()),
            metadata: SignerMetadata::with_url(
                env::var(env_vars::SIGNER_METADATA_URL)
                    .unwrap_or_else(|_| defaults::SIGNER_METADATA_URL.to_string()),
            ),
            verified_owner_header: env::var(env_vars::VERIFIED_OWNER_HEADER)
                .unwrap_or_else(|_| defaults::VERIFIED_OWNER_HEADER.to_string())
                .to_lowercase(),
            eager_connect: env_flag(env_vars::SIGNER_EAGER_CONNECT, true),
        }
    }
}
