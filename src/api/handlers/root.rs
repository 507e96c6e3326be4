use axum::response::IntoResponse;

use crate::APP_USER_AGENT;

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service banner", body = String)
    ),
    tag = "health"
)]
pub async fn root() -> impl IntoResponse {
    APP_USER_AGENT
}
