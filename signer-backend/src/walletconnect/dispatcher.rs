//! Session request dispatch
//!
//! Sensitive methods are written to the ledger as `proposed` before they run
//! and finalized as `succeeded` or `failed` afterwards. Every outcome is
//! turned into a JSON-RPC response for the peer; nothing propagates out.

use ethers::types::transaction::eip712::TypedData;
use serde_json::{json, Value};
use std::str::FromStr;
use strum::{AsRefStr, EnumString};

use super::protocol::{JsonRpcResponse, SessionRequestEvent};
use super::{ProtocolEngine, SignerContext, SignerError, REQUEST_FAILED_CODE, UNKNOWN_SESSION_CODE};
use crate::chains::{parse_eip155_chain_id, ChainInfo};
use crate::keys::SignableMessage;
use crate::models::{OperationRecord, WalletSession};

/// Methods the signer serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
pub enum SessionMethod {
    #[strum(serialize = "eth_accounts")]
    EthAccounts,
    #[strum(serialize = "eth_requestAccounts")]
    EthRequestAccounts,
    #[strum(serialize = "personal_sign")]
    PersonalSign,
    #[strum(serialize = "eth_sign")]
    EthSign,
    #[strum(serialize = "eth_signTypedData")]
    EthSignTypedData,
    #[strum(serialize = "eth_signTypedData_v4")]
    EthSignTypedDataV4,
    #[strum(serialize = "eth_signTransaction")]
    EthSignTransaction,
    #[strum(serialize = "eth_sendTransaction")]
    EthSendTransaction,
}

impl SessionMethod {
    /// None for anything outside the served set
    pub fn parse(method: &str) -> Option<Self> {
        Self::from_str(method).ok()
    }

    /// Signing and submission methods are ledger-tracked
    pub fn is_sensitive(self) -> bool {
        !matches!(self, SessionMethod::EthAccounts | SessionMethod::EthRequestAccounts)
    }
}

pub async fn handle_session_request(
    engine: &dyn ProtocolEngine,
    ctx: &SignerContext,
    event: SessionRequestEvent,
) {
    let response = process_request(ctx, &event).await;
    if let Err(e) = engine.respond_session_request(&event.topic, &response).await {
        log::error!(
            "[walletconnect] Failed to respond to request {} on {}: {}",
            event.id,
            event.topic,
            e
        );
    }
}

/// Handle one request and build the peer response
pub async fn process_request(ctx: &SignerContext, event: &SessionRequestEvent) -> JsonRpcResponse {
    let topic = event.topic.as_str();
    let method_name = event.params.request.method.as_str();
    let params = &event.params.request.params;
    let chain_id = event.params.chain_id.clone().unwrap_or_default();

    let session = match ctx.db.get_wallet_session(topic) {
        Ok(Some(session)) => session,
        Ok(None) => {
            log::warn!(
                "[walletconnect] Request {} ({}) on unknown session {}",
                event.id,
                method_name,
                topic
            );
            return JsonRpcResponse::error(
                event.id,
                UNKNOWN_SESSION_CODE,
                SignerError::UnknownSession(topic.to_string()).to_string(),
            );
        }
        Err(e) => {
            log::error!("[walletconnect] Session lookup for {} failed: {}", topic, e);
            return JsonRpcResponse::error(event.id, REQUEST_FAILED_CODE, SignerError::Storage(e).to_string());
        }
    };

    let method = SessionMethod::parse(method_name);
    let ledger_entry = match method.filter(|m| m.is_sensitive()) {
        Some(_) => {
            let proposed = OperationRecord::proposed(event.id, topic, method_name, &chain_id, params.clone());
            if let Err(e) = ctx.db.append_session_operation(&proposed) {
                log::error!(
                    "[walletconnect] Ledger append for request {} failed, not executing: {}",
                    event.id,
                    e
                );
                return JsonRpcResponse::error(event.id, REQUEST_FAILED_CODE, SignerError::Storage(e).to_string());
            }
            log::info!(
                "[walletconnect] Incoming request {} on {}: method={}, chain={}",
                event.id,
                topic,
                method_name,
                chain_id
            );
            log::debug!("[walletconnect] Request {} params: {}", event.id, params);
            Some(proposed)
        }
        None => None,
    };

    let outcome = match method {
        Some(method) => execute(ctx, &session, method, params, &chain_id).await,
        None => Err(SignerError::UnsupportedMethod(method_name.to_string())),
    };

    match outcome {
        Ok(result) => {
            if let Some(entry) = ledger_entry {
                log::info!("[walletconnect] Request {} ({}) succeeded", event.id, method_name);
                record(ctx, entry.succeeded(result.clone()));
            }
            JsonRpcResponse::success(event.id, result)
        }
        Err(e) => {
            let message = e.to_string();
            if let Some(entry) = ledger_entry {
                log::error!("[walletconnect] Request {} ({}) failed: {}", event.id, method_name, message);
                record(ctx, entry.failed(message.clone()));
            } else {
                log::warn!("[walletconnect] Request {} ({}) failed: {}", event.id, method_name, message);
            }
            JsonRpcResponse::error(event.id, REQUEST_FAILED_CODE, message)
        }
    }
}

fn record(ctx: &SignerContext, entry: OperationRecord) {
    if let Err(e) = ctx.db.append_session_operation(&entry) {
        log::error!(
            "[walletconnect] Failed to finalize ledger entry {} on {}: {}",
            entry.request_id,
            entry.topic,
            e
        );
    }
}

async fn execute(
    ctx: &SignerContext,
    session: &WalletSession,
    method: SessionMethod,
    params: &Value,
    request_chain: &str,
) -> Result<Value, SignerError> {
    if !method.is_sensitive() {
        return Ok(json!([session.address]));
    }

    let account = ctx
        .keys
        .derive_account(&session.owner)
        .await
        .map_err(SignerError::KeyDerivation)?;

    let result = match method {
        SessionMethod::EthAccounts | SessionMethod::EthRequestAccounts => json!([session.address]),
        SessionMethod::PersonalSign => {
            let message = to_signable_message(params.get(0))?;
            Value::String(account.sign_message(&message).await.map_err(SignerError::RequestFailed)?)
        }
        SessionMethod::EthSign => {
            let message = to_signable_message(params.get(1))?;
            Value::String(account.sign_message(&message).await.map_err(SignerError::RequestFailed)?)
        }
        SessionMethod::EthSignTypedData | SessionMethod::EthSignTypedDataV4 => {
            let typed_data = parse_typed_data(params.get(1))?;
            Value::String(
                account
                    .sign_typed_data(&typed_data)
                    .await
                    .map_err(SignerError::RequestFailed)?,
            )
        }
        SessionMethod::EthSignTransaction | SessionMethod::EthSendTransaction => {
            let chain = resolve_transaction_chain(ctx, request_chain, session.default_chain_id)?;
            let tx = params
                .get(0)
                .ok_or_else(|| SignerError::RequestFailed("missing transaction params".to_string()))?;

            let forwarded = if method == SessionMethod::EthSignTransaction {
                ctx.forwarder.sign_transaction(&account, chain, tx).await
            } else {
                ctx.forwarder.send_transaction(&account, chain, tx).await
            };
            forwarded.map_err(SignerError::RequestFailed)?
        }
    };

    Ok(result)
}

/// The request's chain when it is a resolvable eip155 reference, otherwise
/// the session default
fn resolve_transaction_chain<'a>(
    ctx: &'a SignerContext,
    request_chain: &str,
    default_chain_id: u64,
) -> Result<&'a ChainInfo, SignerError> {
    if let Some(chain) = parse_eip155_chain_id(request_chain).and_then(|id| ctx.chains.resolve(id)) {
        return Ok(chain);
    }

    ctx.chains.resolve(default_chain_id).ok_or_else(|| {
        SignerError::RequestFailed(format!(
            "unsupported chain {}: no default RPC endpoint",
            default_chain_id
        ))
    })
}

/// `0x`-prefixed hex is signed as raw bytes; any other string as text
pub fn to_signable_message(raw: Option<&Value>) -> Result<SignableMessage, SignerError> {
    let Some(Value::String(text)) = raw else {
        return Err(SignerError::RequestFailed("invalid signing payload".to_string()));
    };

    match text.strip_prefix("0x") {
        Some(digits) if digits.chars().all(|c| c.is_ascii_hexdigit()) => {
            let digits = if digits.len() % 2 == 1 {
                format!("0{}", digits)
            } else {
                digits.to_string()
            };
            let bytes = hex::decode(digits)
                .map_err(|e| SignerError::RequestFailed(format!("invalid hex payload: {}", e)))?;
            Ok(SignableMessage::Raw(bytes))
        }
        _ => Ok(SignableMessage::Text(text.clone())),
    }
}

/// Typed data arrives either as a JSON string or as a structured object
pub fn parse_typed_data(raw: Option<&Value>) -> Result<TypedData, SignerError> {
    let parsed = match raw {
        Some(Value::String(text)) => serde_json::from_str::<TypedData>(text),
        Some(value) => serde_json::from_value::<TypedData>(value.clone()),
        None => return Err(SignerError::RequestFailed("missing typed data".to_string())),
    };

    parsed.map_err(|e| SignerError::RequestFailed(format!("invalid typed data: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OperationStatus, SessionSignerRecord};
    use crate::walletconnect::protocol::SessionRequestEvent;
    use crate::walletconnect::testing::{test_context, test_context_with_forwarder, RecordingEngine, StubForwarder};
    use ethers::types::{RecoveryMessage, Signature};
    use std::sync::Arc;

    const TOPIC: &str = "session-topic";

    fn request(id: i64, method: &str, params: Value, chain_id: Option<&str>) -> SessionRequestEvent {
        serde_json::from_value(json!({
            "id": id,
            "topic": TOPIC,
            "params": {
                "chainId": chain_id,
                "request": { "method": method, "params": params }
            }
        }))
        .unwrap()
    }

    async fn register_session(ctx: &SignerContext, default_chain_id: u64) -> String {
        let address = ctx.keys.derive_account("0xOwner").await.unwrap().address_string();
        ctx.db
            .upsert_wallet_session(
                TOPIC,
                &SessionSignerRecord {
                    owner: "0xOwner".to_string(),
                    address: address.clone(),
                    domain: None,
                    default_chain_id,
                },
            )
            .unwrap();
        address
    }

    fn recover(signature: &Value, message: &[u8]) -> String {
        let bytes = hex::decode(signature.as_str().unwrap().trim_start_matches("0x")).unwrap();
        let signature = Signature::try_from(bytes.as_slice()).unwrap();
        let recovered = signature.recover(RecoveryMessage::Data(message.to_vec())).unwrap();
        ethers::utils::to_checksum(&recovered, None)
    }

    #[test]
    fn test_method_routing() {
        assert_eq!(SessionMethod::parse("eth_signTypedData_v4"), Some(SessionMethod::EthSignTypedDataV4));
        assert_eq!(SessionMethod::parse("eth_requestAccounts"), Some(SessionMethod::EthRequestAccounts));
        assert_eq!(SessionMethod::parse("wallet_switchEthereumChain"), None);
        assert!(!SessionMethod::EthAccounts.is_sensitive());
        assert!(SessionMethod::EthSendTransaction.is_sensitive());
        assert_eq!(SessionMethod::PersonalSign.as_ref(), "personal_sign");
    }

    #[test]
    fn test_signable_message_decoding() {
        assert_eq!(
            to_signable_message(Some(&json!("0x68656c6c6f"))).unwrap(),
            SignableMessage::Raw(b"hello".to_vec())
        );
        assert_eq!(
            to_signable_message(Some(&json!("0xabc"))).unwrap(),
            SignableMessage::Raw(vec![0x0a, 0xbc])
        );
        assert_eq!(to_signable_message(Some(&json!("0x"))).unwrap(), SignableMessage::Raw(vec![]));
        assert_eq!(
            to_signable_message(Some(&json!("0xhello"))).unwrap(),
            SignableMessage::Text("0xhello".to_string())
        );
        assert_eq!(
            to_signable_message(Some(&json!("hello"))).unwrap(),
            SignableMessage::Text("hello".to_string())
        );
        assert!(to_signable_message(Some(&json!(42))).is_err());
        assert!(to_signable_message(None).is_err());
    }

    #[tokio::test]
    async fn test_unknown_session_returns_5000_without_ledger_row() {
        let ctx = test_context();
        let engine = RecordingEngine::new();

        handle_session_request(&engine, &ctx, request(1, "personal_sign", json!(["0x00"]), Some("eip155:1"))).await;

        let responses = engine.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].0, TOPIC);
        assert_eq!(responses[0].1.error.as_ref().map(|e| e.code), Some(5000));
        assert_eq!(ctx.db.count_session_operations(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_accounts_bypass_ledger() {
        let ctx = test_context();
        let address = register_session(&ctx, 1).await;

        let response = process_request(&ctx, &request(2, "eth_accounts", json!([]), Some("eip155:1"))).await;

        assert_eq!(response.result, Some(json!([address])));
        assert_eq!(ctx.db.count_session_operations(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_personal_sign_records_success() {
        let ctx = test_context();
        let address = register_session(&ctx, 1).await;

        let response = process_request(
            &ctx,
            &request(3, "personal_sign", json!(["0x68656c6c6f", address]), Some("eip155:1")),
        )
        .await;

        let signature = response.result.expect("signature");
        assert_eq!(recover(&signature, b"hello"), address);

        let ops = ctx.db.list_session_operations(None, Some(TOPIC)).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].request_id, 3);
        assert_eq!(ops[0].status, OperationStatus::Succeeded);
        assert_eq!(ops[0].chain_id, "eip155:1");
        assert_eq!(ops[0].result.as_ref(), Some(&signature));
    }

    #[tokio::test]
    async fn test_eth_sign_uses_second_param() {
        let ctx = test_context();
        let address = register_session(&ctx, 1).await;

        let response = process_request(&ctx, &request(4, "eth_sign", json!([address, "gm"]), None)).await;

        assert_eq!(recover(&response.result.unwrap(), b"gm"), address);
        // A missing chain is stored as an empty string
        let ops = ctx.db.list_session_operations(None, None).unwrap();
        assert_eq!(ops[0].chain_id, "");
    }

    #[tokio::test]
    async fn test_typed_data_from_string_and_object() {
        let ctx = test_context();
        let address = register_session(&ctx, 1).await;

        let typed = json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "chainId", "type": "uint256" }
                ],
                "Mail": [{ "name": "contents", "type": "string" }]
            },
            "primaryType": "Mail",
            "domain": { "name": "Example", "chainId": 1 },
            "message": { "contents": "hi" }
        });

        let from_string = process_request(
            &ctx,
            &request(5, "eth_signTypedData_v4", json!([address, typed.to_string()]), Some("eip155:1")),
        )
        .await;
        let from_object = process_request(
            &ctx,
            &request(6, "eth_signTypedData", json!([address, typed]), Some("eip155:1")),
        )
        .await;

        assert!(from_string.result.is_some());
        assert_eq!(from_string.result, from_object.result);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_returns_5001() {
        let ctx = test_context();
        register_session(&ctx, 1).await;

        let response = process_request(&ctx, &request(7, "personal_sign", json!([{ "not": "a string" }]), None)).await;

        let error = response.error.expect("error");
        assert_eq!(error.code, 5001);
        assert_eq!(error.message, "invalid signing payload");

        let ops = ctx.db.list_session_operations(None, None).unwrap();
        assert_eq!(ops[0].status, OperationStatus::Failed);
        assert_eq!(ops[0].error.as_deref(), Some("invalid signing payload"));
    }

    #[tokio::test]
    async fn test_unsupported_method_returns_5001_without_ledger_row() {
        let ctx = test_context();
        register_session(&ctx, 1).await;

        let response = process_request(&ctx, &request(8, "wallet_addEthereumChain", json!([]), None)).await;

        let error = response.error.expect("error");
        assert_eq!(error.code, 5001);
        assert_eq!(error.message, "unsupported WalletConnect method: wallet_addEthereumChain");
        assert_eq!(ctx.db.count_session_operations(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_redelivered_request_keeps_single_ledger_row() {
        let ctx = test_context();
        let address = register_session(&ctx, 1).await;
        let event = request(9, "personal_sign", json!(["gm", address]), Some("eip155:1"));

        process_request(&ctx, &event).await;
        process_request(&ctx, &event).await;

        assert_eq!(ctx.db.count_session_operations(Some(TOPIC)).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transaction_uses_request_chain_when_resolvable() {
        let forwarder = Arc::new(StubForwarder::new());
        let ctx = test_context_with_forwarder(forwarder.clone());
        let address = register_session(&ctx, 1).await;
        let tx = json!({ "from": "0x000000000000000000000000000000000000dEaD", "to": address });

        let response = process_request(&ctx, &request(10, "eth_sendTransaction", json!([tx]), Some("eip155:137"))).await;
        assert_eq!(response.result, Some(json!("0xsent")));

        process_request(&ctx, &request(11, "eth_signTransaction", json!([tx]), Some("eip155:999999"))).await;
        process_request(&ctx, &request(12, "eth_signTransaction", json!([tx]), Some("eip155:0x89"))).await;

        assert_eq!(
            forwarder.calls(),
            vec![
                ("send".to_string(), 137, address.clone()),
                ("sign".to_string(), 1, address.clone()),
                ("sign".to_string(), 1, address),
            ]
        );
    }

    #[tokio::test]
    async fn test_transaction_forwarding_error_is_recorded() {
        let forwarder = Arc::new(StubForwarder::failing("nonce too low"));
        let ctx = test_context_with_forwarder(forwarder);
        register_session(&ctx, 1).await;

        let response = process_request(&ctx, &request(13, "eth_sendTransaction", json!([{}]), Some("eip155:1"))).await;

        assert_eq!(response.error.map(|e| e.message), Some("nonce too low".to_string()));
        let ops = ctx.db.list_session_operations(None, None).unwrap();
        assert_eq!(ops[0].status, OperationStatus::Failed);
    }

    #[tokio::test]
    async fn test_unresolvable_default_chain_fails() {
        let ctx = test_context();
        register_session(&ctx, 424242).await;

        let response = process_request(&ctx, &request(14, "eth_sendTransaction", json!([{}]), None)).await;

        assert_eq!(
            response.error.map(|e| e.message),
            Some("unsupported chain 424242: no default RPC endpoint".to_string())
        );
    }
}
