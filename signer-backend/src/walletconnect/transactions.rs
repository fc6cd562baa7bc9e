//! Transaction forwarding for eth_signTransaction / eth_sendTransaction
//!
//! The peer's transaction object is rebuilt with `from` forced to the
//! session's signing address, filled against the chain's RPC endpoint
//! (nonce, gas, fees) and then either signed or submitted.

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use serde_json::{Map, Value};

use crate::chains::ChainInfo;
use crate::keys::DerivedAccount;

/// Signs or submits a peer-supplied transaction on a resolved chain
#[async_trait]
pub trait TransactionForwarder: Send + Sync {
    /// Returns the RLP-encoded signed transaction as 0x-hex
    async fn sign_transaction(
        &self,
        account: &DerivedAccount,
        chain: &ChainInfo,
        tx: &Value,
    ) -> Result<Value, String>;

    /// Returns the submitted transaction hash
    async fn send_transaction(
        &self,
        account: &DerivedAccount,
        chain: &ChainInfo,
        tx: &Value,
    ) -> Result<Value, String>;
}

/// Forwarder backed by the chain's default HTTP JSON-RPC endpoint
#[derive(Debug, Default)]
pub struct EvmTransactionForwarder;

impl EvmTransactionForwarder {
    pub fn new() -> Self {
        Self
    }

    fn client(
        account: &DerivedAccount,
        chain: &ChainInfo,
    ) -> Result<SignerMiddleware<Provider<Http>, LocalWallet>, String> {
        let provider = Provider::<Http>::try_from(chain.rpc_url.as_str())
            .map_err(|e| format!("Invalid RPC URL for chain {}: {}", chain.chain_id, e))?;
        Ok(SignerMiddleware::new(provider, account.wallet_for_chain(chain.chain_id)))
    }
}

#[async_trait]
impl TransactionForwarder for EvmTransactionForwarder {
    async fn sign_transaction(
        &self,
        account: &DerivedAccount,
        chain: &ChainInfo,
        tx: &Value,
    ) -> Result<Value, String> {
        let client = Self::client(account, chain)?;
        let mut typed_tx = build_transaction(tx, account.address(), chain.chain_id)?;

        client
            .fill_transaction(&mut typed_tx, None)
            .await
            .map_err(|e| format!("Failed to prepare transaction on {}: {}", chain.name, e))?;

        let signature = client
            .signer()
            .sign_transaction(&typed_tx)
            .await
            .map_err(|e| format!("Failed to sign transaction: {}", e))?;

        let signed_tx = typed_tx.rlp_signed(&signature);
        log::info!(
            "[walletconnect] Signed transaction for {} on {}",
            account.address_string(),
            chain.name
        );

        Ok(Value::String(format!("0x{}", hex::encode(&signed_tx))))
    }

    async fn send_transaction(
        &self,
        account: &DerivedAccount,
        chain: &ChainInfo,
        tx: &Value,
    ) -> Result<Value, String> {
        let client = Self::client(account, chain)?;
        let typed_tx = build_transaction(tx, account.address(), chain.chain_id)?;

        let pending = client
            .send_transaction(typed_tx, None)
            .await
            .map_err(|e| format!("Failed to send transaction on {}: {}", chain.name, e))?;

        let tx_hash = format!("{:?}", pending.tx_hash());
        log::info!(
            "[walletconnect] Submitted transaction {} on {}",
            tx_hash,
            chain.name
        );

        Ok(Value::String(tx_hash))
    }
}

fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn quantity(obj: &Map<String, Value>, key: &str) -> Result<Option<U256>, String> {
    let Some(value) = field(obj, key) else {
        return Ok(None);
    };

    let parsed = match value {
        Value::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some("") => Ok(U256::zero()),
            Some(hex_digits) => U256::from_str_radix(hex_digits, 16).map_err(|e| e.to_string()),
            None => U256::from_dec_str(s).map_err(|e| e.to_string()),
        },
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| "not an unsigned integer".to_string()),
        _ => Err("expected a hex or decimal quantity".to_string()),
    };

    parsed
        .map(Some)
        .map_err(|e| format!("Invalid transaction field '{}': {}", key, e))
}

fn address(obj: &Map<String, Value>, key: &str) -> Result<Option<Address>, String> {
    match field(obj, key) {
        None => Ok(None),
        Some(Value::String(s)) => s
            .parse::<Address>()
            .map(Some)
            .map_err(|_| format!("Invalid transaction field '{}': {}", key, s)),
        Some(other) => Err(format!("Invalid transaction field '{}': {}", key, other)),
    }
}

fn calldata(obj: &Map<String, Value>) -> Result<Option<Bytes>, String> {
    match field(obj, "data").or_else(|| field(obj, "input")) {
        None => Ok(None),
        Some(Value::String(s)) => s
            .parse::<Bytes>()
            .map(Some)
            .map_err(|e| format!("Invalid transaction data: {}", e)),
        Some(other) => Err(format!("Invalid transaction data: {}", other)),
    }
}

/// Build a typed transaction from a peer-supplied JSON-RPC transaction object.
/// Any `from` the peer sent is replaced by `from`; EIP-1559 is used when a
/// fee-market field is present, legacy otherwise.
pub fn build_transaction(tx: &Value, from: Address, chain_id: u64) -> Result<TypedTransaction, String> {
    let obj = tx
        .as_object()
        .ok_or_else(|| "Transaction params must be an object".to_string())?;

    let to = address(obj, "to")?;
    let value = quantity(obj, "value")?;
    let data = calldata(obj)?;
    let gas = quantity(obj, "gas")?.or(quantity(obj, "gasLimit")?);
    let nonce = quantity(obj, "nonce")?;
    let max_fee = quantity(obj, "maxFeePerGas")?;
    let priority_fee = quantity(obj, "maxPriorityFeePerGas")?;

    if max_fee.is_some() || priority_fee.is_some() {
        let mut req = Eip1559TransactionRequest::new().from(from).chain_id(chain_id);
        if let Some(to) = to {
            req = req.to(to);
        }
        if let Some(value) = value {
            req = req.value(value);
        }
        if let Some(data) = data {
            req = req.data(data);
        }
        if let Some(gas) = gas {
            req = req.gas(gas);
        }
        if let Some(nonce) = nonce {
            req = req.nonce(nonce);
        }
        if let Some(max_fee) = max_fee {
            req = req.max_fee_per_gas(max_fee);
        }
        if let Some(priority_fee) = priority_fee {
            req = req.max_priority_fee_per_gas(priority_fee);
        }
        Ok(req.into())
    } else {
        let mut req = TransactionRequest::new().from(from).chain_id(chain_id);
        if let Some(to) = to {
            req = req.to(to);
        }
        if let Some(value) = value {
            req = req.value(value);
        }
        if let Some(data) = data {
            req = req.data(data);
        }
        if let Some(gas) = gas {
            req = req.gas(gas);
        }
        if let Some(nonce) = nonce {
            req = req.nonce(nonce);
        }
        if let Some(gas_price) = quantity(obj, "gasPrice")? {
            req = req.gas_price(gas_price);
        }
        Ok(req.into())
    }
}
