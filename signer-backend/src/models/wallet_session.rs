use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

/// Pending pairings expire this long after they are written
pub const PENDING_TTL_SECONDS: i64 = 300;

/// Ledger retention cap, applied globally and per session topic
pub const MAX_OPERATION_RECORDS: usize = 500;

/// Default chain for a pairing started without a chain hint
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// In-flight pairing attempt, keyed by pairing topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConnection {
    pub pairing_topic: String,
    pub owner: String,
    pub default_chain_id: u64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Values written when a pairing attempt starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConnectionRecord {
    pub owner: String,
    pub default_chain_id: u64,
}

/// Mutable fields of an approved session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSignerRecord {
    pub owner: String,
    pub address: String,
    pub domain: Option<String>,
    pub default_chain_id: u64,
}

/// Approved session, keyed by session topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSession {
    pub topic: String,
    pub owner: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub default_chain_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Proposed,
    Succeeded,
    Failed,
}

/// One ledger entry for a sensitive session request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOperation {
    /// Ledger id, monotonically increasing
    pub id: i64,
    /// Peer-assigned JSON-RPC id, unique per topic
    pub request_id: i64,
    pub topic: String,
    pub method: String,
    /// Chain as sent by the peer (e.g. "eip155:1"), kept verbatim
    pub chain_id: String,
    pub params: Value,
    pub status: OperationStatus,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ledger write; the id is assigned by the database
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRecord {
    pub request_id: i64,
    pub topic: String,
    pub method: String,
    pub chain_id: String,
    pub params: Value,
    pub status: OperationStatus,
    pub timestamp: i64,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl OperationRecord {
    pub fn proposed(request_id: i64, topic: &str, method: &str, chain_id: &str, params: Value) -> Self {
        Self {
            request_id,
            topic: topic.to_string(),
            method: method.to_string(),
            chain_id: chain_id.to_string(),
            params,
            status: OperationStatus::Proposed,
            timestamp: Utc::now().timestamp_millis(),
            result: None,
            error: None,
        }
    }

    pub fn succeeded(self, result: Value) -> Self {
        Self {
            status: OperationStatus::Succeeded,
            timestamp: Utc::now().timestamp_millis(),
            result: Some(result),
            error: None,
            ..self
        }
    }

    pub fn failed(self, error: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Failed,
            timestamp: Utc::now().timestamp_millis(),
            result: None,
            error: Some(error.into()),
            ..self
        }
    }
}
