use axum::{extract::Extension, response::Json};
use std::sync::Arc;

use crate::guard::AuthenticatedPrincipal;

#[utoipa::path(
    get,
    path = "/v1/whoami",
    responses(
        (status = 200, description = "The authenticated principal and its risk score", body = AuthenticatedPrincipal),
        (status = 401, description = "Missing or rejected credentials"),
        (status = 403, description = "Blocked by risk policy")
    ),
    tag = "decision"
)]
pub async fn whoami(principal: Extension<Arc<AuthenticatedPrincipal>>) -> Json<AuthenticatedPrincipal> {
    Json(principal.0.as_ref().clone())
}
