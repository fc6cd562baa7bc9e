//! dstack Key Provider
//!
//! Derives owner keys through the dstack key service. The service returns a
//! deterministic secp256k1 key for each derivation path; the first 32 bytes
//! become the account's secret key.
//!
//! Environment variables:
//! - DSTACK_SIMULATOR_ENDPOINT: HTTP endpoint of the dstack key service
//!   (defaults to http://localhost:8090)
//!
//! Only the HTTP transport is supported. The in-enclave Unix socket
//! (`/var/run/dstack.sock`) is not dialed; point the endpoint at an HTTP
//! proxy for it instead.

use async_trait::async_trait;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{derivation_path, DerivedAccount, KeyProvider};
use crate::config::{defaults, env_vars};

/// HTTP request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a derived account stays cached in-process
const ACCOUNT_CACHE_TTL: Duration = Duration::from_secs(600);

const ACCOUNT_CACHE_CAPACITY: u64 = 1024;

#[derive(Serialize)]
struct GetKeyRequest<'a> {
    path: &'a str,
    purpose: &'a str,
}

#[derive(Debug, Deserialize)]
struct GetKeyResponse {
    key: String,
    #[serde(default)]
    #[allow(dead_code)]
    signature_chain: Vec<String>,
}

/// Key provider backed by the dstack key service
pub struct DstackKeyProvider {
    endpoint: String,
    http_client: reqwest::Client,
    accounts: Cache<String, DerivedAccount>,
}

impl DstackKeyProvider {
    /// Create provider from environment variables
    pub fn from_env() -> Result<Self, String> {
        let endpoint = std::env::var(env_vars::DSTACK_SIMULATOR_ENDPOINT)
            .unwrap_or_else(|_| defaults::DSTACK_ENDPOINT.to_string());
        Self::new(&endpoint)
    }

    pub fn new(endpoint: &str) -> Result<Self, String> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http_client,
            accounts: Cache::builder()
                .max_capacity(ACCOUNT_CACHE_CAPACITY)
                .time_to_live(ACCOUNT_CACHE_TTL)
                .build(),
        })
    }

    async fn fetch_key(&self, path: &str) -> Result<Vec<u8>, String> {
        let url = format!("{}/GetKey", self.endpoint);

        let response = self
            .http_client
            .post(&url)
            .json(&GetKeyRequest { path, purpose: "" })
            .send()
            .await
            .map_err(|e| format!("dstack key service unavailable at {}: {}", self.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("dstack key service error ({}): {}", status, body));
        }

        let data: GetKeyResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse dstack key response: {}", e))?;

        decode_key_material(&data.key)
    }
}

/// Decode the hex key material and keep the 32-byte secret
fn decode_key_material(key_hex: &str) -> Result<Vec<u8>, String> {
    let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);
    let mut bytes = hex::decode(key_hex).map_err(|e| format!("Invalid key hex from dstack: {}", e))?;

    if bytes.len() < 32 {
        return Err(format!(
            "dstack returned {} bytes of key material, expected at least 32",
            bytes.len()
        ));
    }

    bytes.truncate(32);
    Ok(bytes)
}

#[async_trait]
impl KeyProvider for DstackKeyProvider {
    async fn derive_account(&self, owner: &str) -> Result<DerivedAccount, String> {
        let path = derivation_path(owner);

        if let Some(account) = self.accounts.get(&path) {
            return Ok(account);
        }

        log::debug!("[keys] Fetching dstack key for path {}", path);
        let key = self.fetch_key(&path).await?;
        let account = DerivedAccount::from_key_bytes(&key)?;
        self.accounts.insert(path, account.clone());

        Ok(account)
    }

    fn mode_name(&self) -> &'static str {
        "dstack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_key_material_truncates() {
        let hex_key = format!("0x{}", "ab".repeat(64));
        let key = decode_key_material(&hex_key).unwrap();
        assert_eq!(key.len(), 32);
        assert!(key.iter().all(|b| *b == 0xab));
    }

    #[test]
    fn test_decode_key_material_rejects_short() {
        assert!(decode_key_material("abcd").is_err());
        assert!(decode_key_material("zz").is_err());
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let provider = DstackKeyProvider::new("http://127.0.0.1:8090/").unwrap();
        assert_eq!(provider.endpoint, "http://127.0.0.1:8090");
        assert_eq!(provider.mode_name(), "dstack");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        let provider = DstackKeyProvider::new("http://127.0.0.1:9").unwrap();
        let err = provider.derive_account("0xOwner").await.unwrap_err();
        assert!(err.contains("dstack key service unavailable"));
    }
}
