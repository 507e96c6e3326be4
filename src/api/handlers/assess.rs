use axum::{
    extract::Extension,
    response::Json,
};
use std::sync::Arc;

use crate::guard::Guard;
use crate::risk::{RiskAssessment, SecurityContext};

#[utoipa::path(
    post,
    path = "/v1/assess",
    request_body = SecurityContext,
    responses(
        (status = 200, description = "Risk assessment for the supplied context", body = RiskAssessment),
        (status = 401, description = "Missing or rejected credentials"),
        (status = 422, description = "Malformed context")
    ),
    tag = "decision"
)]
// Operator diagnostics: run the assessor against a hand-built context
// without touching session state.
pub async fn assess(
    guard: Extension<Arc<Guard>>,
    Json(context): Json<SecurityContext>,
) -> Json<RiskAssessment> {
    Json(guard.0.assessor().assess(&context))
}
