use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::GIT_COMMIT_HASH;
use crate::risk::{FeedStatus, ThreatFeed};
use crate::session::TrustCache;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    threat_feed: String,
    trust_cache_entries: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and threat feed are healthy", body = [Health]),
        (status = 503, description = "Threat feed is unreachable", body = [Health])
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(
    threat_feed: Extension<Arc<dyn ThreatFeed>>,
    cache: Extension<Arc<TrustCache>>,
) -> impl IntoResponse {
    let feed_status = threat_feed.0.status();
    let is_healthy = feed_status != FeedStatus::Error;

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        threat_feed: feed_status.as_str().to_string(),
        trust_cache_entries: cache.0.len().await,
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .map_err(|err| {
            error!("Failed to parse X-App header: {}", err);
        });
    let headers = headers.unwrap_or_default();

    match feed_status {
        FeedStatus::Ok => debug!("Threat feed is healthy"),
        FeedStatus::Error => debug!("Threat feed is unhealthy"),
        FeedStatus::Static => debug!("Threat feed is static"),
    }

    if is_healthy {
        (StatusCode::OK, headers, Json(health))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, Json(health))
    }
}
