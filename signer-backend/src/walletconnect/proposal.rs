//! Session proposal handling
//!
//! A proposal is honored only when it arrives on a pairing topic that has a
//! live pending connection. Any failure after that point deletes the pending
//! row before the proposal is rejected.

use std::collections::HashSet;
use url::Url;

use super::protocol::{
    ProposalParams, RejectReason, SessionNamespace, SessionNamespaces, SessionProposal,
};
use super::{ProtocolEngine, SignerContext, SignerError, EIP155_EVENTS, EIP155_METHODS};
use crate::chains::{parse_eip155_chain_id, ChainResolver, EIP155_NAMESPACE};
use crate::models::{PendingConnection, SessionSignerRecord};

pub async fn handle_session_proposal(
    engine: &dyn ProtocolEngine,
    ctx: &SignerContext,
    proposal: SessionProposal,
) {
    let pairing_topic = proposal.params.pairing_topic.clone();

    log::info!(
        "[walletconnect] Session proposal {} received: pairing={:?}, proposer={:?}",
        proposal.id,
        pairing_topic,
        proposal.params.proposer_name()
    );
    log::debug!(
        "[walletconnect] Proposal {} namespaces: required={:?}, optional={:?}",
        proposal.id,
        proposal.params.required_namespaces,
        proposal.params.optional_namespaces
    );

    let pending = match pairing_topic.as_deref() {
        Some(topic) => match ctx.db.get_pending_connection(topic) {
            Ok(pending) => pending,
            Err(e) => {
                log::error!("[walletconnect] Pending lookup for {} failed: {}", topic, e);
                None
            }
        },
        None => None,
    };

    let Some(pending) = pending else {
        log::warn!(
            "[walletconnect] Rejecting proposal {} with no pending pairing",
            proposal.id
        );
        reject(engine, proposal.id, RejectReason::user_rejected()).await;
        return;
    };

    match approve(engine, ctx, &proposal, &pending).await {
        Ok(topic) => {
            log::info!(
                "[walletconnect] Session approved: topic={}, owner={}",
                topic,
                pending.owner
            );
        }
        Err(e) => {
            if let Err(db_err) = ctx.db.delete_pending_connection(&pending.pairing_topic) {
                log::error!(
                    "[walletconnect] Failed to clear pending pairing {}: {}",
                    pending.pairing_topic,
                    db_err
                );
            }

            log::warn!(
                "[walletconnect] Session approval failed for proposal {} (pairing {}): {}",
                proposal.id,
                pending.pairing_topic,
                e
            );

            let reason = match e {
                SignerError::NoSupportedChains => RejectReason::unsupported_chains(),
                _ => RejectReason::user_rejected(),
            };
            reject(engine, proposal.id, reason).await;
        }
    }
}

/// Approve and register the session, returning its topic
async fn approve(
    engine: &dyn ProtocolEngine,
    ctx: &SignerContext,
    proposal: &SessionProposal,
    pending: &PendingConnection,
) -> Result<String, SignerError> {
    let account = ctx
        .keys
        .derive_account(&pending.owner)
        .await
        .map_err(SignerError::KeyDerivation)?;
    let address = account.address_string();

    let chain_ids = resolve_approved_chain_ids(&proposal.params, pending.default_chain_id, &ctx.chains);
    let default_chain_id = *chain_ids.first().ok_or(SignerError::NoSupportedChains)?;

    let namespaces = build_namespaces(&chain_ids, &address);
    let session = engine
        .approve_session(proposal.id, &namespaces)
        .await
        .map_err(SignerError::ApprovalFailed)?;

    ctx.db.upsert_wallet_session(
        &session.topic,
        &SessionSignerRecord {
            owner: pending.owner.clone(),
            address,
            domain: extract_domain(proposal.params.proposer_url()),
            default_chain_id,
        },
    )?;

    if let Err(e) = ctx.db.delete_pending_connection(&pending.pairing_topic) {
        if let Err(db_err) = ctx.db.delete_wallet_session(&session.topic) {
            log::error!(
                "[walletconnect] Failed to drop session {} after pending cleanup failed: {}",
                session.topic,
                db_err
            );
        }
        return Err(e.into());
    }

    Ok(session.topic)
}

async fn reject(engine: &dyn ProtocolEngine, proposal_id: i64, reason: RejectReason) {
    if let Err(e) = engine.reject_session(proposal_id, &reason).await {
        log::error!("[walletconnect] Failed to reject proposal {}: {}", proposal_id, e);
    }
}

/// Chains to approve, in first-seen order across required then optional
/// eip155 namespaces. Falls back to the pending default when none resolve.
pub fn resolve_approved_chain_ids(
    params: &ProposalParams,
    fallback_chain_id: u64,
    chains: &ChainResolver,
) -> Vec<u64> {
    let candidates = [&params.required_namespaces, &params.optional_namespaces]
        .into_iter()
        .filter_map(|namespaces| namespaces.get(EIP155_NAMESPACE))
        .flat_map(|namespace| namespace.chains.iter());

    let mut seen = HashSet::new();
    let approved: Vec<u64> = candidates
        .filter_map(|chain| parse_eip155_chain_id(chain))
        .filter(|chain_id| chains.is_supported(*chain_id))
        .filter(|chain_id| seen.insert(*chain_id))
        .collect();

    if !approved.is_empty() {
        return approved;
    }

    if chains.is_supported(fallback_chain_id) {
        vec![fallback_chain_id]
    } else {
        Vec::new()
    }
}

pub fn build_namespaces(chain_ids: &[u64], address: &str) -> SessionNamespaces {
    let accounts = chain_ids
        .iter()
        .map(|chain_id| format!("{}:{}:{}", EIP155_NAMESPACE, chain_id, address))
        .collect();

    let mut namespaces = SessionNamespaces::new();
    namespaces.insert(
        EIP155_NAMESPACE.to_string(),
        SessionNamespace {
            methods: EIP155_METHODS.iter().map(|m| m.to_string()).collect(),
            events: EIP155_EVENTS.iter().map(|e| e.to_string()).collect(),
            accounts,
        },
    );
    namespaces
}

/// Host of the proposer's metadata URL, if it parses
pub fn extract_domain(url: Option<&str>) -> Option<String> {
    let url = Url::parse(url?).ok()?;
    url.host_str()
        .filter(|host| !host.is_empty())
        .map(|host| host.to_string())
}
