//! End-to-end decision pipeline tests over the HTTP surface.
//!
//! The router is wired exactly as the server wires it, with in-memory
//! collaborators standing in for the external token, session, and threat
//! services.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use vigil::api;
use vigil::guard::{
    Guard, GuardConfig, Profile, STEP_UP_HEADER, StaticTokenVerifier, TokenClaims,
    TracingAuditSink,
};
use vigil::risk::{NoopThreatFeed, StaticThreatFeed, ThreatFeed};
use vigil::session::{InMemorySessionStore, SessionStore, SessionStoreError};

const TOKEN: &str = "integration-token";
const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 Chrome/120.0";

fn claims(session_id: Uuid) -> TokenClaims {
    TokenClaims {
        subject: Uuid::new_v4(),
        email: "user@example.com".to_string(),
        roles: vec!["member".to_string()],
        permissions: vec!["reports:read".to_string()],
        mfa_enabled: true,
        session_id,
        device_id: None,
        last_login: Some(Utc::now() - Duration::days(120)),
    }
}

/// Counts validate calls so tests can observe the trust-cache short-circuit.
struct CountingSessionStore {
    inner: InMemorySessionStore,
    validations: AtomicUsize,
}

impl CountingSessionStore {
    fn new() -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            validations: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SessionStore for CountingSessionStore {
    async fn validate(&self, session_id: Uuid) -> Result<bool, SessionStoreError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.inner.validate(session_id).await
    }

    async fn touch(&self, session_id: Uuid) -> Result<(), SessionStoreError> {
        self.inner.touch(session_id).await
    }
}

async fn app_with(
    config: GuardConfig,
    threat_feed: Arc<dyn ThreatFeed>,
    store: Arc<CountingSessionStore>,
) -> (Router, Uuid) {
    let session_id = Uuid::new_v4();
    store
        .inner
        .insert(session_id, Utc::now() + Duration::hours(1))
        .await;

    let verifier = StaticTokenVerifier::new().with_token(TOKEN, claims(session_id));
    let guard = Arc::new(Guard::new(
        config,
        threat_feed,
        Arc::new(verifier),
        store,
        Arc::new(TracingAuditSink),
    ));
    (
        api::router(guard, Arc::new(NoopThreatFeed), CorsLayer::new()),
        session_id,
    )
}

async fn standard_app() -> (Router, Arc<CountingSessionStore>) {
    let store = Arc::new(CountingSessionStore::new());
    let (router, _) = app_with(
        GuardConfig::standard(),
        Arc::new(NoopThreatFeed),
        Arc::clone(&store),
    )
    .await;
    (router, store)
}

fn authed_request(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("authorization", format!("Bearer {TOKEN}"))
        .header("user-agent", USER_AGENT)
        .header("accept-language", "en-US")
        .header("accept-encoding", "gzip")
        .header("x-forwarded-for", "203.0.113.7")
        .header(STEP_UP_HEADER, "otp-654321")
        .body(Body::empty())
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn excluded_paths_skip_enforcement() {
    let (app, _) = standard_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_credentials_are_rejected() {
    let (app, _) = standard_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/whoami")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forged_token_never_authenticates() {
    let (app, store) = standard_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/whoami")
                .header("authorization", "Bearer forged")
                .header("user-agent", USER_AGENT)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    // Rejected before any session work.
    assert_eq!(store.validations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn valid_token_returns_the_principal() {
    let (app, _) = standard_app().await;
    let response = app.oneshot(authed_request("/v1/whoami")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["email"], "user@example.com");
    assert!(body["risk_score"].is_u64());
    assert_eq!(body["roles"][0], "member");
}

#[tokio::test]
async fn second_request_hits_the_trust_cache() {
    let (app, store) = standard_app().await;

    let first = app
        .clone()
        .oneshot(authed_request("/v1/whoami"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(store.validations.load(Ordering::SeqCst), 1);

    let second = app.oneshot(authed_request("/v1/whoami")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    // The trust cache short-circuited the session store.
    assert_eq!(store.validations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_session_fails_closed() {
    let store = Arc::new(CountingSessionStore::new());
    let verifier = StaticTokenVerifier::new().with_token(TOKEN, claims(Uuid::new_v4()));
    let guard = Arc::new(Guard::new(
        GuardConfig::standard(),
        Arc::new(NoopThreatFeed),
        Arc::new(verifier),
        store,
        Arc::new(TracingAuditSink),
    ));
    let app = api::router(guard, Arc::new(NoopThreatFeed), CorsLayer::new());

    let response = app.oneshot(authed_request("/v1/whoami")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn denylisted_address_is_blocked_with_assessment_body() {
    let feed = Arc::new(StaticThreatFeed::new(["203.0.113.7".parse().unwrap()]));
    let store = Arc::new(CountingSessionStore::new());
    let (app, _) = app_with(GuardConfig::standard(), feed, store).await;

    let response = app.oneshot(authed_request("/v1/whoami")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert_eq!(body["error"], "access_blocked");
    assert!(body["risk_score"].is_u64());
    assert!(body["recommendations"].as_array().is_some_and(|r| !r.is_empty()));
}

#[tokio::test]
async fn admin_profile_challenges_without_step_up() {
    let store = Arc::new(CountingSessionStore::new());
    let (app, _) = app_with(
        GuardConfig::for_profile(Profile::Admin),
        Arc::new(NoopThreatFeed),
        store,
    )
    .await;

    let mut request = authed_request("/v1/whoami");
    request.headers_mut().remove(STEP_UP_HEADER);
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["error"], "mfa_required");
    assert!(body["challenge"]["challenge_id"].is_string());
    assert_eq!(body["challenge"]["methods"][0], "totp");

    // The same request with a step-up credential passes.
    let response = app.oneshot(authed_request("/v1/whoami")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn assess_endpoint_runs_the_assessor() {
    let (app, _) = standard_app().await;

    let context = serde_json::json!({
        "user_id": Uuid::new_v4(),
        "session_id": Uuid::new_v4(),
        "device_fingerprint": {
            "id": "diagnostic",
            "user_agent": "Mozilla/5.0 HeadlessChrome/120.0",
            "ip_address": "203.0.113.9",
            "trust_score": 15,
            "created_at": Utc::now(),
            "capabilities": null
        },
        "ip_address": "203.0.113.9",
        "user_agent": "Mozilla/5.0 HeadlessChrome/120.0",
        "timestamp": Utc::now()
    });

    let mut request = authed_request("/v1/assess");
    *request.method_mut() = axum::http::Method::POST;
    request
        .headers_mut()
        .insert("content-type", "application/json".parse().unwrap());
    *request.body_mut() = Body::from(context.to_string());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["allow_access"], false);
    assert_eq!(body["requires_mfa"], true);
    assert!(body["factors"].as_array().is_some_and(|f| !f.is_empty()));
}
