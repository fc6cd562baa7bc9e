//! Pairing kickoff

use serde::Serialize;

use super::uri::PairingUri;
use super::{SignerEngine, SignerError};
use crate::models::{PendingConnectionRecord, DEFAULT_CHAIN_ID};

pub const PAIRING_STARTED: &str = "pairing_started";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KickoffResult {
    /// Pairing topic parsed from the URI
    pub topic: String,
    pub address: String,
    pub status: &'static str,
}

pub(super) async fn kickoff(
    signer: &SignerEngine,
    owner: &str,
    uri: &str,
) -> Result<KickoffResult, SignerError> {
    let ctx = signer.context();
    let pairing = PairingUri::parse(uri)?;
    let topic = pairing.topic;

    if ctx.db.get_pending_connection(&topic)?.is_some() {
        return Err(SignerError::AlreadyPending(topic));
    }

    log::info!("[walletconnect] Connect requested by {} for pairing {}", owner, topic);

    let account = ctx
        .keys
        .derive_account(owner)
        .await
        .map_err(SignerError::KeyDerivation)?;
    let address = account.address_string();

    ctx.db.set_pending_connection(
        &topic,
        &PendingConnectionRecord {
            owner: owner.to_string(),
            default_chain_id: DEFAULT_CHAIN_ID,
        },
    )?;

    let paired = match signer.engine().await {
        Ok(engine) => engine.pair(uri).await.map_err(SignerError::PairingFailed),
        Err(e) => Err(e),
    };

    if let Err(e) = paired {
        log::warn!("[walletconnect] Pairing {} failed, rolling back: {}", topic, e);
        if let Err(db_err) = ctx.db.delete_pending_connection(&topic) {
            log::error!(
                "[walletconnect] Failed to roll back pending pairing {}: {}",
                topic,
                db_err
            );
        }
        return Err(e);
    }

    log::info!("[walletconnect] Pairing initiated: topic={}, address={}", topic, address);

    Ok(KickoffResult {
        topic,
        address,
        status: PAIRING_STARTED,
    })
}
