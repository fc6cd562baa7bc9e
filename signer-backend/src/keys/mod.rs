//! Key Derivation Providers
//!
//! Every owner identity maps to one signing account, derived by an external
//! key authority from the path `wallet/ethereum/<owner>`. Two modes:
//!
//! - **dstack** (default): keys are fetched from the dstack key service over HTTP
//! - **local**: keys are derived in-process from `SIGNER_MASTER_KEY` (development only)
//!
//! The mode is selected with the `SIGNER_KEY_MODE` environment variable.

mod dstack_provider;
mod local_provider;

pub use dstack_provider::DstackKeyProvider;
pub use local_provider::LocalKeyProvider;

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Signature};
use std::sync::Arc;

use crate::config::env_vars;

/// Derivation path for an owner's Ethereum account
pub fn derivation_path(owner: &str) -> String {
    format!("wallet/ethereum/{}", owner)
}

/// Payload accepted by `personal_sign` / `eth_sign`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignableMessage {
    /// Bytes decoded from a hex-encoded payload
    Raw(Vec<u8>),
    /// Literal UTF-8 text
    Text(String),
}

impl AsRef<[u8]> for SignableMessage {
    fn as_ref(&self) -> &[u8] {
        match self {
            SignableMessage::Raw(bytes) => bytes,
            SignableMessage::Text(text) => text.as_bytes(),
        }
    }
}

/// A signing account derived for one owner
#[derive(Debug, Clone)]
pub struct DerivedAccount {
    wallet: LocalWallet,
}

impl DerivedAccount {
    /// Build an account from raw secp256k1 secret key bytes
    pub fn from_key_bytes(key_bytes: &[u8]) -> Result<Self, String> {
        if key_bytes.len() != 32 {
            return Err(format!(
                "Invalid derived key: expected 32 bytes, got {}",
                key_bytes.len()
            ));
        }
        let wallet = LocalWallet::from_bytes(key_bytes)
            .map_err(|e| format!("Invalid derived key: {}", e))?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// EIP-55 checksummed address
    pub fn address_string(&self) -> String {
        ethers::utils::to_checksum(&self.wallet.address(), None)
    }

    /// The wallet bound to `chain_id`, for transaction signing
    pub fn wallet_for_chain(&self, chain_id: u64) -> LocalWallet {
        self.wallet.clone().with_chain_id(chain_id)
    }

    /// EIP-191 message signature, 0x-prefixed hex
    pub async fn sign_message(&self, message: &SignableMessage) -> Result<String, String> {
        let signature = self
            .wallet
            .sign_message(message)
            .await
            .map_err(|e| format!("Failed to sign message: {}", e))?;
        Ok(signature_hex(&signature))
    }

    /// EIP-712 typed data signature, 0x-prefixed hex
    pub async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<String, String> {
        let signature = self
            .wallet
            .sign_typed_data(typed_data)
            .await
            .map_err(|e| format!("Failed to sign typed data: {}", e))?;
        Ok(signature_hex(&signature))
    }
}

pub fn signature_hex(signature: &Signature) -> String {
    format!("0x{}", hex::encode(signature.to_vec()))
}

/// Trait for key providers - abstracts where owner keys come from
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Derive (or fetch) the signing account for an owner identity
    async fn derive_account(&self, owner: &str) -> Result<DerivedAccount, String>;

    /// Get the mode name for logging
    fn mode_name(&self) -> &'static str;
}

/// Create the key provider selected by `SIGNER_KEY_MODE`
///
/// - `dstack` (or unset): DstackKeyProvider
/// - `local`: LocalKeyProvider
pub fn create_key_provider() -> Result<Arc<dyn KeyProvider>, String> {
    let mode = std::env::var(env_vars::SIGNER_KEY_MODE)
        .unwrap_or_else(|_| "dstack".to_string())
        .to_lowercase();

    log::info!("[keys] Initializing key provider in {} mode", mode);

    match mode.as_str() {
        "dstack" => Ok(Arc::new(DstackKeyProvider::from_env()?)),
        "local" => {
            log::warn!("[keys] Local key mode derives keys in-process; do not use in production");
            Ok(Arc::new(LocalKeyProvider::from_env()?))
        }
        _ => Err(format!(
            "Unknown {} '{}'. Use 'dstack' or 'local'.",
            env_vars::SIGNER_KEY_MODE,
            mode
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::RecoveryMessage;

    // Hardhat account #0 - test only
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn test_account() -> DerivedAccount {
        DerivedAccount::from_key_bytes(&hex::decode(TEST_KEY).unwrap()).unwrap()
    }

    #[test]
    fn test_derivation_path() {
        assert_eq!(derivation_path("0xOwner"), "wallet/ethereum/0xOwner");
    }

    #[test]
    fn test_checksummed_address() {
        assert_eq!(
            test_account().address_string(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_rejects_short_key() {
        let err = DerivedAccount::from_key_bytes(&[1u8; 16]).unwrap_err();
        assert!(err.contains("expected 32 bytes, got 16"));
        assert!(DerivedAccount::from_key_bytes(&[1u8; 33]).is_err());
        assert!(DerivedAccount::from_key_bytes(&[]).is_err());
    }

    #[tokio::test]
    async fn test_sign_message_recovers_to_account() {
        let account = test_account();
        let message = SignableMessage::Text("hello world".to_string());
        let signature_hex = account.sign_message(&message).await.unwrap();

        let bytes = hex::decode(signature_hex.trim_start_matches("0x")).unwrap();
        let signature = Signature::try_from(bytes.as_slice()).unwrap();
        let recovered = signature
            .recover(RecoveryMessage::Data(b"hello world".to_vec()))
            .unwrap();
        assert_eq!(recovered, account.address());
    }

    #[tokio::test]
    async fn test_raw_and_text_payloads_sign_same_bytes() {
        let account = test_account();
        let raw = account
            .sign_message(&SignableMessage::Raw(b"abc".to_vec()))
            .await
            .unwrap();
        let text = account
            .sign_message(&SignableMessage::Text("abc".to_string()))
            .await
            .unwrap();
        assert_eq!(raw, text);
    }
}
