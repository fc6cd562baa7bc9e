//! WebSocket bridge to the relay protocol engine sidecar
//!
//! The sidecar owns the relay transport and its crypto. This side speaks a
//! small framed protocol over one WebSocket:
//!
//! - call:  `{"id": 1, "method": "pair", "params": {...}}`
//! - reply: `{"id": 1, "result": ...}` or `{"id": 1, "error": {"message": "..."}}`
//! - event: `{"type": "event", "event": "session_proposal", "data": {...}}`
//!
//! The first call on a fresh connection is `init`, carrying the project id and
//! the signer metadata.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::protocol::{
    ApprovedSession, EngineEvent, JsonRpcResponse, RejectReason, SessionNamespaces,
};
use super::{EngineConnection, EngineConnector, ProtocolEngine};
use crate::config::{env_vars, Config, SignerMetadata};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 256;

type PendingCalls = DashMap<u64, oneshot::Sender<Result<Value, String>>>;

#[derive(Debug, Serialize)]
struct BridgeCall<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<BridgeError>,
}

#[derive(Debug, Deserialize)]
struct BridgeError {
    message: String,
}

pub struct RelayBridgeConnector {
    url: String,
    project_id: Option<String>,
    metadata: SignerMetadata,
}

impl RelayBridgeConnector {
    pub fn new(url: impl Into<String>, project_id: Option<String>, metadata: SignerMetadata) -> Self {
        Self {
            url: url.into(),
            project_id,
            metadata,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.relay_bridge_url.clone(),
            config.walletconnect_project_id.clone(),
            config.metadata.clone(),
        )
    }
}

#[async_trait]
impl EngineConnector for RelayBridgeConnector {
    async fn connect(&self) -> Result<EngineConnection, String> {
        let project_id = self
            .project_id
            .clone()
            .ok_or_else(|| format!("{} is required", env_vars::WALLETCONNECT_PROJECT_ID))?;

        log::info!("[relay] Connecting to relay bridge at {}", self.url);
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| format!("Relay bridge unreachable at {}: {}", self.url, e))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(CHANNEL_CAPACITY);
        let pending: Arc<PendingCalls> = Arc::new(DashMap::new());

        // Writer
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    log::error!("[relay] Send failed: {}", e);
                    break;
                }
            }
        });

        // Reader
        let reader_pending = pending.clone();
        let pong_tx = outbound_tx.clone();
        tokio::spawn(async move {
            while let Some(msg_result) = ws_receiver.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        route_frame(&text, &reader_pending, &event_tx).await;
                    }
                    Ok(Message::Ping(data)) => {
                        let _ = pong_tx.send(Message::Pong(data)).await;
                    }
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        log::error!("[relay] WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            log::warn!("[relay] Relay bridge connection closed");
            // Dropping the senders fails every in-flight call
            reader_pending.clear();
        });

        let bridge = Arc::new(RelayBridge {
            next_id: AtomicU64::new(1),
            pending,
            outbound: outbound_tx,
        });

        bridge
            .call(
                "init",
                json!({
                    "projectId": project_id,
                    "metadata": {
                        "name": self.metadata.name,
                        "description": self.metadata.description,
                        "url": self.metadata.url,
                        "icons": self.metadata.icons,
                    }
                }),
            )
            .await?;

        log::info!("[relay] Relay bridge initialized");

        Ok(EngineConnection {
            engine: bridge,
            events: event_rx,
        })
    }
}

/// Deliver a reply to its waiting call, or forward an event
async fn route_frame(text: &str, pending: &PendingCalls, events: &mpsc::Sender<EngineEvent>) {
    let frame: Value = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("[relay] Dropping unparseable frame: {}", e);
            return;
        }
    };

    if frame.get("type").and_then(|t| t.as_str()) == Some("event") {
        match serde_json::from_value::<EngineEvent>(frame) {
            Ok(event) => {
                if events.send(event).await.is_err() {
                    log::warn!("[relay] Event receiver dropped");
                }
            }
            Err(e) => log::debug!("[relay] Ignoring unrecognized event: {}", e),
        }
        return;
    }

    match serde_json::from_value::<BridgeReply>(frame) {
        Ok(reply) => {
            let Some((_, waiter)) = pending.remove(&reply.id) else {
                log::debug!("[relay] Reply for unknown call {}", reply.id);
                return;
            };
            let outcome = match reply.error {
                Some(error) => Err(error.message),
                None => Ok(reply.result.unwrap_or(Value::Null)),
            };
            let _ = waiter.send(outcome);
        }
        Err(e) => log::warn!("[relay] Dropping malformed reply: {}", e),
    }
}

struct RelayBridge {
    next_id: AtomicU64,
    pending: Arc<PendingCalls>,
    outbound: mpsc::Sender<Message>,
}

impl RelayBridge {
    async fn call(&self, method: &str, params: Value) -> Result<Value, String> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = serde_json::to_string(&BridgeCall { id, method, params })
            .map_err(|e| format!("Failed to encode {} call: {}", method, e))?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if self.outbound.send(Message::Text(frame)).await.is_err() {
            self.pending.remove(&id);
            return Err("Relay bridge connection closed".to_string());
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(outcome)) => outcome.map_err(|e| format!("{} failed: {}", method, e)),
            Ok(Err(_)) => Err("Relay bridge connection closed".to_string()),
            Err(_) => {
                self.pending.remove(&id);
                Err(format!("{} timed out after {}s", method, CALL_TIMEOUT.as_secs()))
            }
        }
    }
}

#[async_trait]
impl ProtocolEngine for RelayBridge {
    async fn pair(&self, uri: &str) -> Result<(), String> {
        self.call("pair", json!({ "uri": uri })).await.map(|_| ())
    }

    async fn approve_session(
        &self,
        proposal_id: i64,
        namespaces: &SessionNamespaces,
    ) -> Result<ApprovedSession, String> {
        let result = self
            .call(
                "approveSession",
                json!({ "id": proposal_id, "namespaces": namespaces }),
            )
            .await?;
        serde_json::from_value(result).map_err(|e| format!("Invalid approveSession result: {}", e))
    }

    async fn reject_session(&self, proposal_id: i64, reason: &RejectReason) -> Result<(), String> {
        self.call("rejectSession", json!({ "id": proposal_id, "reason": reason }))
            .await
            .map(|_| ())
    }

    async fn respond_session_request(
        &self,
        topic: &str,
        response: &JsonRpcResponse,
    ) -> Result<(), String> {
        self.call(
            "respondSessionRequest",
            json!({ "topic": topic, "response": response }),
        )
        .await
        .map(|_| ())
    }
}
