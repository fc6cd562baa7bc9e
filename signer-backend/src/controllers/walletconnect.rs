use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use super::{error_body, verified_owner};
use crate::walletconnect::uri::PAIRING_URI_SCHEME;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/v1/walletconnect/sessions")
            .route(web::post().to(create_session))
            .route(web::get().to(list_sessions)),
    );
    cfg.service(
        web::resource("/api/v1/walletconnect/operations").route(web::get().to(list_operations)),
    );
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub struct OperationsQuery {
    #[serde(default)]
    pub topic: Option<String>,
}

fn bad_uri(detail: String) -> HttpResponse {
    HttpResponse::BadRequest().json(error_body(
        "invalid WalletConnect URI",
        "WALLETCONNECT_BAD_REQUEST",
        Some(detail),
    ))
}

/// POST /api/v1/walletconnect/sessions: start pairing with a dApp
async fn create_session(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateSessionRequest>,
) -> impl Responder {
    let owner = match verified_owner(&state, &req) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };

    if !body.uri.starts_with(&format!("{}:", PAIRING_URI_SCHEME)) {
        return bad_uri("uri must start with wc:".to_string());
    }

    match state.signer.kickoff(&owner, &body.uri).await {
        Ok(kickoff) => HttpResponse::Ok().json(serde_json::json!({
            "owner": owner,
            "address": kickoff.address,
            "topic": kickoff.topic,
            "status": kickoff.status,
        })),
        Err(e) if e.is_client_error() => bad_uri(e.to_string()),
        Err(e) => {
            log::warn!("[walletconnect] Kickoff for {} failed: {}", owner, e);
            HttpResponse::ServiceUnavailable().json(error_body(
                "WalletConnect unavailable",
                "WALLETCONNECT_UNAVAILABLE",
                Some(e.to_string()),
            ))
        }
    }
}

/// GET /api/v1/walletconnect/sessions: the owner's sessions, newest first
async fn list_sessions(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let owner = match verified_owner(&state, &req) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };

    match state.db.list_wallet_sessions(Some(&owner)) {
        Ok(sessions) => HttpResponse::Ok().json(sessions),
        Err(e) => {
            log::error!("[walletconnect] Failed to list sessions: {}", e);
            HttpResponse::InternalServerError().json(error_body("Internal server error", "STORAGE_ERROR", None))
        }
    }
}

/// GET /api/v1/walletconnect/operations?topic=: the owner's ledger entries
async fn list_operations(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<OperationsQuery>,
) -> impl Responder {
    let owner = match verified_owner(&state, &req) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };

    let topic = query.topic.as_deref().filter(|t| !t.is_empty());
    match state.db.list_session_operations(Some(&owner), topic) {
        Ok(operations) => HttpResponse::Ok().json(operations),
        Err(e) => {
            log::error!("[walletconnect] Failed to list operations: {}", e);
            HttpResponse::InternalServerError().json(error_body("Internal server error", "STORAGE_ERROR", None))
        }
    }
}
