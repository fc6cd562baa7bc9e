use actix_web::{web, HttpRequest, HttpResponse, Responder};

use super::{error_body, verified_owner};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/v1/accounts").route(web::post().to(create_account)));
}

/// POST /api/v1/accounts: derive the verified owner's signing address
async fn create_account(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let owner = match verified_owner(&state, &req) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };

    match state.keys.derive_account(&owner).await {
        Ok(account) => HttpResponse::Ok().json(serde_json::json!({
            "owner": owner,
            "address": account.address_string(),
        })),
        Err(e) => {
            log::error!("[keys] Account derivation for {} failed: {}", owner, e);
            HttpResponse::ServiceUnavailable().json(error_body(
                "Key provider unavailable",
                "KEY_PROVIDER_UNAVAILABLE",
                Some(e),
            ))
        }
    }
}
