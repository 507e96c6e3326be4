//! Axum adapter: HTTP request in, decision outcome mapped to a response.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Request},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use super::{
    AccessRequest, AuthFailure, AuthOutcome, Guard, MfaChallenge, QUERY_TOKEN_PARAM,
    STEP_UP_HEADER,
};
use crate::risk::RiskLevel;

/// Body returned with a 403 policy block: enough for operator visibility,
/// nothing an attacker can tune against beyond the recommendations.
#[derive(Debug, Serialize, ToSchema)]
pub struct BlockedResponse {
    pub error: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
}

/// Body returned when step-up verification is required.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    pub error: String,
    pub challenge: MfaChallenge,
}

/// Request-enforcement middleware. Terminal outcomes answer directly; a
/// pass attaches the [`super::AuthenticatedPrincipal`] as an extension for
/// downstream handlers.
pub async fn enforce(
    Extension(guard): Extension<Arc<Guard>>,
    mut request: Request,
    next: Next,
) -> Response {
    let access = access_request_from(&request);

    match guard.authenticate(&access).await {
        AuthOutcome::Skipped => next.run(request).await,
        AuthOutcome::Authenticated { principal, .. } => {
            request.extensions_mut().insert(Arc::new(principal));
            next.run(request).await
        }
        AuthOutcome::AuthFailed { reason } => match reason {
            AuthFailure::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "authentication unavailable" })),
            )
                .into_response(),
            _ => unauthorized("invalid or missing credentials"),
        },
        AuthOutcome::SessionFailed => unauthorized("session is no longer valid"),
        AuthOutcome::Blocked { assessment } => (
            StatusCode::FORBIDDEN,
            Json(BlockedResponse {
                error: "access_blocked".to_string(),
                risk_score: assessment.overall_score,
                risk_level: assessment.level,
                recommendations: assessment.recommendations,
            }),
        )
            .into_response(),
        AuthOutcome::MfaRequired { challenge, .. } => (
            StatusCode::UNAUTHORIZED,
            Json(ChallengeResponse {
                error: "mfa_required".to_string(),
                challenge,
            }),
        )
            .into_response(),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": message })),
    )
        .into_response()
}

/// Translate an HTTP request into the orchestrator's input. Enrichment
/// fields (geo, history, network flags) are not derivable from headers and
/// stay empty here; library callers fill them directly.
fn access_request_from(request: &Request) -> AccessRequest {
    let headers = request.headers();
    let header_string = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    let query_token = request.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            pair.strip_prefix(QUERY_TOKEN_PARAM)
                .and_then(|rest| rest.strip_prefix('='))
                .filter(|token| !token.is_empty())
                .map(str::to_string)
        })
    });

    AccessRequest {
        path: request.uri().path().to_string(),
        authorization: header_string(header::AUTHORIZATION),
        cookie: header_string(header::COOKIE),
        query_token,
        has_step_up: headers.contains_key(STEP_UP_HEADER),
        ip_address: client_ip(headers).unwrap_or_else(|| "0.0.0.0".to_string()),
        user_agent: header_string(header::USER_AGENT).unwrap_or_default(),
        accept_language: header_string(header::ACCEPT_LANGUAGE),
        accept_encoding: header_string(header::ACCEPT_ENCODING),
        capabilities: None,
        geo_location: None,
        previous_logins: None,
        failed_attempts: None,
        is_vpn: None,
        is_tor: None,
        is_proxy: None,
    }
}

/// Client address as reported by the proxy chain, first hop wins.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        let first = forwarded.split(',').next().map(str::trim)?;
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn http_request(uri: &str) -> Request {
        HttpRequest::builder()
            .uri(uri)
            .header("user-agent", "Mozilla/5.0 Chrome/120.0")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.2")
            .header("accept-language", "en-US")
            .body(Body::empty())
            .expect("request")
    }

    #[test]
    fn access_request_captures_header_signals() {
        let access = access_request_from(&http_request("/v1/reports"));
        assert_eq!(access.path, "/v1/reports");
        assert_eq!(access.ip_address, "203.0.113.7");
        assert_eq!(access.user_agent, "Mozilla/5.0 Chrome/120.0");
        assert_eq!(access.accept_language.as_deref(), Some("en-US"));
        assert!(!access.has_step_up);
    }

    #[test]
    fn query_token_is_extracted() {
        let access = access_request_from(&http_request("/v1/reports?access_token=tok123&x=1"));
        assert_eq!(access.query_token.as_deref(), Some("tok123"));
    }

    #[test]
    fn step_up_header_presence_is_detected() {
        let request = HttpRequest::builder()
            .uri("/v1/reports")
            .header(STEP_UP_HEADER, "otp-654321")
            .body(Body::empty())
            .expect("request");
        let access = access_request_from(&request);
        assert!(access.has_step_up);
    }

    #[test]
    fn client_ip_falls_back_to_x_real_ip() {
        let request = HttpRequest::builder()
            .uri("/")
            .header("x-real-ip", "198.51.100.9")
            .body(Body::empty())
            .expect("request");
        let access = access_request_from(&request);
        assert_eq!(access.ip_address, "198.51.100.9");
    }

    #[test]
    fn missing_client_ip_defaults_to_unspecified() {
        let request = HttpRequest::builder()
            .uri("/")
            .body(Body::empty())
            .expect("request");
        let access = access_request_from(&request);
        assert_eq!(access.ip_address, "0.0.0.0");
    }
}
