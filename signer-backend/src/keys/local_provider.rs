//! Local Key Provider (development mode)
//!
//! Derives owner keys in-process as `keccak256(master_key || path)`.
//! Deterministic, so the same owner always maps to the same address across
//! restarts as long as SIGNER_MASTER_KEY does not change.

use async_trait::async_trait;
use ethers::utils::keccak256;

use super::{derivation_path, DerivedAccount, KeyProvider};
use crate::config::env_vars;

pub struct LocalKeyProvider {
    master_key: [u8; 32],
}

impl LocalKeyProvider {
    /// Requires: SIGNER_MASTER_KEY (32 bytes, hex)
    pub fn from_env() -> Result<Self, String> {
        let master_key = std::env::var(env_vars::SIGNER_MASTER_KEY)
            .map_err(|_| format!("{} not set", env_vars::SIGNER_MASTER_KEY))?;
        Self::from_master_key(&master_key)
    }

    pub fn from_master_key(master_key: &str) -> Result<Self, String> {
        let key_hex = master_key.strip_prefix("0x").unwrap_or(master_key);
        let bytes = hex::decode(key_hex).map_err(|e| format!("Invalid master key hex: {}", e))?;

        let master_key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "Master key must be 32 bytes".to_string())?;

        Ok(Self { master_key })
    }
}

#[async_trait]
impl KeyProvider for LocalKeyProvider {
    async fn derive_account(&self, owner: &str) -> Result<DerivedAccount, String> {
        let path = derivation_path(owner);
        let mut material = Vec::with_capacity(32 + path.len());
        material.extend_from_slice(&self.master_key);
        material.extend_from_slice(path.as_bytes());

        DerivedAccount::from_key_bytes(&keccak256(&material))
    }

    fn mode_name(&self) -> &'static str {
        "local"
    }
}
