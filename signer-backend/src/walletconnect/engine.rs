//! Protocol engine seam and the lazily connected signer engine
//!
//! The engine connection is built on first use and shared for the life of the
//! process. Concurrent first callers wait on the same construction; a failed
//! construction leaves the cell empty so the next caller retries.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, OnceCell};

use super::pairing::{self, KickoffResult};
use super::protocol::{
    ApprovedSession, EngineEvent, JsonRpcResponse, RejectReason, SessionNamespaces,
};
use super::transactions::TransactionForwarder;
use super::{dispatcher, proposal, SignerError};
use crate::chains::ChainResolver;
use crate::db::Database;
use crate::keys::KeyProvider;

/// Operations the signer needs from the pairing/session protocol engine
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    async fn pair(&self, uri: &str) -> Result<(), String>;

    async fn approve_session(
        &self,
        proposal_id: i64,
        namespaces: &SessionNamespaces,
    ) -> Result<ApprovedSession, String>;

    async fn reject_session(&self, proposal_id: i64, reason: &RejectReason) -> Result<(), String>;

    async fn respond_session_request(
        &self,
        topic: &str,
        response: &JsonRpcResponse,
    ) -> Result<(), String>;
}

/// A live engine plus the stream of events it delivers
pub struct EngineConnection {
    pub engine: Arc<dyn ProtocolEngine>,
    pub events: mpsc::Receiver<EngineEvent>,
}

/// Builds the engine connection
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(&self) -> Result<EngineConnection, String>;
}

/// Collaborators shared by every event handler
pub struct SignerContext {
    pub db: Arc<Database>,
    pub keys: Arc<dyn KeyProvider>,
    pub chains: Arc<ChainResolver>,
    pub forwarder: Arc<dyn TransactionForwarder>,
}

pub struct SignerEngine {
    ctx: Arc<SignerContext>,
    connector: Arc<dyn EngineConnector>,
    engine: OnceCell<Arc<dyn ProtocolEngine>>,
}

impl SignerEngine {
    pub fn new(ctx: Arc<SignerContext>, connector: Arc<dyn EngineConnector>) -> Self {
        Self {
            ctx,
            connector,
            engine: OnceCell::new(),
        }
    }

    pub fn context(&self) -> &Arc<SignerContext> {
        &self.ctx
    }

    pub fn is_connected(&self) -> bool {
        self.engine.initialized()
    }

    /// The shared engine, connecting on first use
    pub async fn engine(&self) -> Result<Arc<dyn ProtocolEngine>, SignerError> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                log::info!("[walletconnect] Connecting protocol engine");
                let EngineConnection { engine, events } = self
                    .connector
                    .connect()
                    .await
                    .map_err(SignerError::EngineUnavailable)?;

                spawn_event_loop(engine.clone(), self.ctx.clone(), events);
                log::info!("[walletconnect] Protocol engine connected");
                Ok::<_, SignerError>(engine)
            })
            .await?;

        Ok(engine.clone())
    }

    /// Start a pairing for `owner`; approval arrives later as a proposal event
    pub async fn kickoff(&self, owner: &str, uri: &str) -> Result<KickoffResult, SignerError> {
        pairing::kickoff(self, owner, uri).await
    }
}

/// Receive events one at a time; each is handled on its own task
fn spawn_event_loop(
    engine: Arc<dyn ProtocolEngine>,
    ctx: Arc<SignerContext>,
    mut events: mpsc::Receiver<EngineEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let engine = engine.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                handle_event(engine.as_ref(), &ctx, event).await;
            });
        }
        log::warn!("[walletconnect] Engine event stream closed");
    });
}

/// Route one engine event to its handler
pub async fn handle_event(engine: &dyn ProtocolEngine, ctx: &SignerContext, event: EngineEvent) {
    log::debug!("[walletconnect] Event received: {}", event.name());

    match event {
        EngineEvent::SessionProposal(proposal) => {
            proposal::handle_session_proposal(engine, ctx, proposal).await
        }
        EngineEvent::SessionRequest(request) => {
            dispatcher::handle_session_request(engine, ctx, request).await
        }
        EngineEvent::SessionDelete(deleted) => {
            log::info!("[walletconnect] Session deleted: {}", deleted.topic);
            if let Err(e) = ctx.db.delete_wallet_session(&deleted.topic) {
                log::error!(
                    "[walletconnect] Failed to remove session {}: {}",
                    deleted.topic,
                    e
                );
            }
        }
    }
}
