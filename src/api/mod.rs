use crate::{
    APP_USER_AGENT,
    cli::globals::GlobalArgs,
    guard::{self, Guard, GuardConfig, RemoteTokenVerifier},
    risk::{NoopThreatFeed, RemoteThreatFeed, ThreatFeed, spawn_refresher},
    session::{InMemorySessionStore, PgSessionStore, SessionStore, spawn_sweeper},
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, post},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span, warn};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;

const THREAT_FEED_REFRESH_SECONDS: u64 = 300;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::root::root,
        handlers::whoami::whoami,
        handlers::assess::assess,
    ),
    components(schemas(
        handlers::health::Health,
        crate::guard::AuthenticatedPrincipal,
        crate::guard::MfaChallenge,
        crate::guard::BlockedResponse,
        crate::guard::ChallengeResponse,
        crate::risk::SecurityContext,
        crate::risk::RiskAssessment,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "decision", description = "Risk-based access decisions")
    )
)]
struct ApiDoc;

/// Build the application router. The enforcement middleware wraps every
/// route; excluded paths pass through it untouched.
#[must_use]
pub fn router(guard: Arc<Guard>, threat_feed: Arc<dyn ThreatFeed>, cors: CorsLayer) -> Router {
    let cache = guard.cache();
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::health::health))
        .route("/v1/whoami", get(handlers::whoami::whoami))
        .route("/v1/assess", post(handlers::assess::assess))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| {
                        HeaderValue::from_str(Ulid::new().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(Arc::clone(&guard)))
                .layer(Extension(threat_feed))
                .layer(Extension(cache))
                .layer(middleware::from_fn(guard::enforce)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: Option<String>,
    config: GuardConfig,
    introspect_url: String,
    threat_feed_url: Option<String>,
    console_origin: String,
    globals: &GlobalArgs,
) -> Result<()> {
    let threat_feed: Arc<dyn ThreatFeed> = match threat_feed_url {
        Some(url) => {
            let feed = Arc::new(RemoteThreatFeed::new(url, APP_USER_AGENT)?);
            // Startup fetch is best-effort: lookups miss until the first
            // successful refresh and /health reports the degraded feed.
            if let Err(err) = feed.refresh().await {
                warn!(error = %err, "initial threat feed fetch failed; starting with an empty set");
            }
            spawn_refresher(
                Arc::clone(&feed),
                Duration::from_secs(THREAT_FEED_REFRESH_SECONDS),
            );
            feed
        }
        None => Arc::new(NoopThreatFeed),
    };

    let sessions: Arc<dyn SessionStore> = match dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(&dsn)
                .await
                .context("Failed to connect to session store")?;
            Arc::new(PgSessionStore::new(pool))
        }
        None => {
            warn!("no session store DSN configured; using the in-memory store");
            Arc::new(InMemorySessionStore::new())
        }
    };

    let tokens = Arc::new(RemoteTokenVerifier::new(
        introspect_url,
        globals.introspect_token.clone(),
        APP_USER_AGENT,
    )?);

    let sweep_period = config.revalidation_interval();
    let guard = Arc::new(Guard::new(
        config,
        Arc::clone(&threat_feed),
        tokens,
        sessions,
        Arc::new(guard::TracingAuditSink),
    ));
    spawn_sweeper(guard.cache(), sweep_period);

    let origin = console_origin_header(&console_origin)?;
    let cors = CorsLayer::new()
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(guard::STEP_UP_HEADER),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true);

    let app = router(guard, threat_feed, cors);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn console_origin_header(console_origin: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(console_origin)
        .with_context(|| format!("Invalid console origin: {console_origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Console origin must include a valid host: {console_origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build console origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_origin_drops_path_and_keeps_port() {
        let origin = console_origin_header("http://localhost:5173/console/").unwrap();
        assert_eq!(origin, "http://localhost:5173");
    }

    #[test]
    fn console_origin_rejects_garbage() {
        assert!(console_origin_header("not a url").is_err());
    }
}
