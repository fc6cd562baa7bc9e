pub mod accounts;
pub mod health;
pub mod walletconnect;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::AppState;

/// Owner identity established by the upstream authentication layer.
///
/// Requests reach this service only after their signature has been verified;
/// the verifier forwards the recovered owner address in a header.
pub fn verified_owner(state: &web::Data<AppState>, req: &HttpRequest) -> Result<String, HttpResponse> {
    let owner = req
        .headers()
        .get(state.config.verified_owner_header.as_str())
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());

    match owner {
        Some(owner) => Ok(owner.to_string()),
        None => Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Missing verified owner identity",
            "reason": "UNAUTHORIZED"
        }))),
    }
}

/// JSON error body shared by the API controllers
pub fn error_body(error: &str, reason: &str, detail: Option<String>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "error": error,
        "reason": reason,
    });
    if let Some(detail) = detail {
        body["detail"] = serde_json::Value::String(detail);
    }
    body
}
