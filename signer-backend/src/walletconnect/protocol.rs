//! Wire types exchanged with the protocol engine

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Incoming `session_proposal`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionProposal {
    pub id: i64,
    pub params: ProposalParams,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalParams {
    #[serde(default)]
    pub pairing_topic: Option<String>,
    #[serde(default)]
    pub proposer: Option<Proposer>,
    #[serde(default)]
    pub required_namespaces: HashMap<String, ProposalNamespace>,
    #[serde(default)]
    pub optional_namespaces: HashMap<String, ProposalNamespace>,
}

impl ProposalParams {
    pub fn proposer_name(&self) -> Option<&str> {
        self.proposer.as_ref()?.metadata.as_ref()?.name.as_deref()
    }

    pub fn proposer_url(&self) -> Option<&str> {
        self.proposer.as_ref()?.metadata.as_ref()?.url.as_deref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Proposer {
    #[serde(default)]
    pub metadata: Option<PeerMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeerMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalNamespace {
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

/// Incoming `session_request`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRequestEvent {
    pub id: i64,
    pub topic: String,
    pub params: SessionRequestParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequestParams {
    pub request: RequestPayload,
    #[serde(default)]
    pub chain_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestPayload {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Incoming `session_delete`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionDeleteEvent {
    #[serde(default)]
    pub id: Option<i64>,
    pub topic: String,
}

/// Events pushed by the engine. Serialized form is `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    SessionProposal(SessionProposal),
    SessionRequest(SessionRequestEvent),
    SessionDelete(SessionDeleteEvent),
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::SessionProposal(_) => "session_proposal",
            EngineEvent::SessionRequest(_) => "session_request",
            EngineEvent::SessionDelete(_) => "session_delete",
        }
    }
}

/// Namespace granted in an approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionNamespace {
    pub methods: Vec<String>,
    pub events: Vec<String>,
    pub accounts: Vec<String>,
}

pub type SessionNamespaces = BTreeMap<String, SessionNamespace>;

/// Session created by a successful approval
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovedSession {
    pub topic: String,
}

/// Reason attached to a rejected proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectReason {
    pub code: i32,
    pub message: String,
}

impl RejectReason {
    pub fn user_rejected() -> Self {
        Self {
            code: 5000,
            message: "User rejected.".to_string(),
        }
    }

    pub fn unsupported_chains() -> Self {
        Self {
            code: 5100,
            message: "Unsupported chains.".to_string(),
        }
    }
}

/// JSON-RPC 2.0 response envelope sent back on a session topic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    pub id: i64,
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: i64, result: Value) -> Self {
        Self {
            id,
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: i64, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}
