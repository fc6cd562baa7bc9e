//! Test doubles for the protocol engine and transaction forwarding

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::protocol::{
    ApprovedSession, EngineEvent, JsonRpcResponse, RejectReason, SessionNamespaces,
};
use super::{EngineConnection, EngineConnector, ProtocolEngine, SignerContext, TransactionForwarder};
use crate::chains::{ChainInfo, ChainResolver};
use crate::db::Database;
use crate::keys::{DerivedAccount, LocalKeyProvider};

pub const TEST_MASTER_KEY: &str = "0x0101010101010101010101010101010101010101010101010101010101010101";

pub fn test_context() -> Arc<SignerContext> {
    test_context_with_forwarder(Arc::new(StubForwarder::new()))
}

pub fn test_context_with_forwarder(forwarder: Arc<dyn TransactionForwarder>) -> Arc<SignerContext> {
    Arc::new(SignerContext {
        db: Arc::new(Database::new(":memory:").expect("in-memory db")),
        keys: Arc::new(LocalKeyProvider::from_master_key(TEST_MASTER_KEY).expect("master key")),
        chains: Arc::new(ChainResolver::with_defaults()),
        forwarder,
    })
}

/// Engine that records every call
#[derive(Default)]
pub struct RecordingEngine {
    session_topic: String,
    pair_error: Option<String>,
    approve_error: Option<String>,
    pairs: Mutex<Vec<String>>,
    approvals: Mutex<Vec<(i64, SessionNamespaces)>>,
    rejections: Mutex<Vec<(i64, RejectReason)>>,
    responses: Mutex<Vec<(String, JsonRpcResponse)>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            session_topic: "session-topic".to_string(),
            ..Default::default()
        }
    }

    pub fn with_session_topic(mut self, topic: &str) -> Self {
        self.session_topic = topic.to_string();
        self
    }

    pub fn with_pair_error(mut self, error: &str) -> Self {
        self.pair_error = Some(error.to_string());
        self
    }

    pub fn with_approve_error(mut self, error: &str) -> Self {
        self.approve_error = Some(error.to_string());
        self
    }

    pub fn pairs(&self) -> Vec<String> {
        self.pairs.lock().unwrap().clone()
    }

    pub fn approvals(&self) -> Vec<(i64, SessionNamespaces)> {
        self.approvals.lock().unwrap().clone()
    }

    pub fn rejections(&self) -> Vec<(i64, RejectReason)> {
        self.rejections.lock().unwrap().clone()
    }

    pub fn responses(&self) -> Vec<(String, JsonRpcResponse)> {
        self.responses.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProtocolEngine for RecordingEngine {
    async fn pair(&self, uri: &str) -> Result<(), String> {
        if let Some(error) = &self.pair_error {
            return Err(error.clone());
        }
        self.pairs.lock().unwrap().push(uri.to_string());
        Ok(())
    }

    async fn approve_session(
        &self,
        proposal_id: i64,
        namespaces: &SessionNamespaces,
    ) -> Result<ApprovedSession, String> {
        if let Some(error) = &self.approve_error {
            return Err(error.clone());
        }
        self.approvals.lock().unwrap().push((proposal_id, namespaces.clone()));
        Ok(ApprovedSession {
            topic: self.session_topic.clone(),
        })
    }

    async fn reject_session(&self, proposal_id: i64, reason: &RejectReason) -> Result<(), String> {
        self.rejections.lock().unwrap().push((proposal_id, reason.clone()));
        Ok(())
    }

    async fn respond_session_request(
        &self,
        topic: &str,
        response: &JsonRpcResponse,
    ) -> Result<(), String> {
        self.responses.lock().unwrap().push((topic.to_string(), response.clone()));
        Ok(())
    }
}

/// Connector handing out one shared RecordingEngine and counting connects
pub struct MockConnector {
    pub engine: Arc<RecordingEngine>,
    connects: AtomicUsize,
    failures_left: AtomicUsize,
    events: Mutex<Option<mpsc::Sender<EngineEvent>>>,
}

impl MockConnector {
    pub fn new(engine: RecordingEngine) -> Self {
        Self::failing_first(engine, 0)
    }

    /// Fail the first `failures` connection attempts
    pub fn failing_first(engine: RecordingEngine, failures: usize) -> Self {
        Self {
            engine: Arc::new(engine),
            connects: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
            events: Mutex::new(None),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Sender feeding the event loop of the last connection
    pub fn event_sender(&self) -> Option<mpsc::Sender<EngineEvent>> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineConnector for MockConnector {
    async fn connect(&self) -> Result<EngineConnection, String> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent callers overlap
        tokio::task::yield_now().await;

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err("relay bridge unreachable".to_string());
        }

        let (tx, rx) = mpsc::channel(16);
        *self.events.lock().unwrap() = Some(tx);

        Ok(EngineConnection {
            engine: self.engine.clone(),
            events: rx,
        })
    }
}

/// Forwarder that records (kind, chain id, signer address) and returns canned results
pub struct StubForwarder {
    error: Option<String>,
    calls: Mutex<Vec<(String, u64, String)>>,
}

impl StubForwarder {
    pub fn new() -> Self {
        Self {
            error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, u64, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn forward(&self, kind: &str, account: &DerivedAccount, chain: &ChainInfo, result: Value) -> Result<Value, String> {
        self.calls
            .lock()
            .unwrap()
            .push((kind.to_string(), chain.chain_id, account.address_string()));
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(result),
        }
    }
}

#[async_trait]
impl TransactionForwarder for StubForwarder {
    async fn sign_transaction(
        &self,
        account: &DerivedAccount,
        chain: &ChainInfo,
        _tx: &Value,
    ) -> Result<Value, String> {
        self.forward("sign", account, chain, json!("0xsigned"))
    }

    async fn send_transaction(
        &self,
        account: &DerivedAccount,
        chain: &ChainInfo,
        _tx: &Value,
    ) -> Result<Value, String> {
        self.forward("send", account, chain, json!("0xsent"))
    }
}
