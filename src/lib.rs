//! # Vigil (Adaptive Risk-Based Access Decision Engine)
//!
//! `vigil` turns a raw authentication attempt (bearer credential + network
//! and device signals) into an access decision: allow, demand step-up
//! verification, or block. Decisions are made per request, zero-trust
//! style; the only state kept between requests is a short-TTL session
//! trust cache.
//!
//! ## Decision pipeline
//!
//! - **Fingerprinting:** [`fingerprint`] derives a stable device identity
//!   and an initial trust estimate from request signals, with no state and
//!   no side effects.
//! - **Risk assessment:** [`risk`] combines location-velocity, device,
//!   behavioral, temporal, and network signals into one weighted score,
//!   a classification level, and policy recommendations.
//! - **Session trust:** [`session`] caches recently validated sessions so
//!   the authoritative session store is consulted at most once per
//!   revalidation interval, and sweeps abandoned entries in the background.
//! - **Orchestration:** [`guard`] runs the per-request state machine:
//!   credential extraction, external verification, context assembly,
//!   assessment, and policy enforcement. Every ambiguous or failing path
//!   denies access.
//!
//! ## External collaborators
//!
//! Token verification, session storage, threat intelligence, and audit
//! delivery are consumed through narrow traits ([`guard::TokenVerifier`],
//! [`session::SessionStore`], [`risk::ThreatFeed`], [`guard::AuditSink`])
//! so deployments can swap backends without touching decision logic.

pub mod api;
pub mod cli;
pub mod fingerprint;
pub mod guard;
pub mod risk;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
