//! Zero-trust decision orchestration.
//!
//! Every request runs the same pipeline: exclusion check, credential
//! extraction, external verification, context assembly, risk assessment,
//! policy enforcement, session validation. Any ambiguity or internal
//! failure denies access; nothing here fails open.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};
use ulid::Ulid;
use utoipa::ToSchema;

use crate::fingerprint::{self, BrowserCapabilities, DeviceSignals};
use crate::risk::{
    GeoLocation, LoginHistoryEntry, RiskAssessment, RiskAssessor, RiskConfig, RiskLevel,
    ThreatFeed,
};
use crate::session::{SessionStore, TrustCache};

pub mod audit;
mod middleware;
mod principal;
mod token;

pub use audit::{AuditEvent, AuditSink, Decision, TracingAuditSink};
pub use middleware::{BlockedResponse, ChallengeResponse, enforce};
pub use principal::AuthenticatedPrincipal;
pub use token::{RemoteTokenVerifier, StaticTokenVerifier, TokenClaims, TokenError, TokenVerifier};

/// Header carrying a step-up credential. Only presence is checked here;
/// validating it is the MFA subsystem's job.
pub const STEP_UP_HEADER: &str = "x-vigil-step-up";
const TOKEN_COOKIE_NAME: &str = "vigil_token";
const QUERY_TOKEN_PARAM: &str = "access_token";

const DEFAULT_REVALIDATION_SECONDS: u64 = 300;
const STRICT_REVALIDATION_SECONDS: u64 = 60;

/// Named deployment profiles mapping to fixed configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Standard,
    Strict,
    Admin,
}

impl Profile {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Strict => "strict",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "strict" => Ok(Self::Strict),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown profile: {other}")),
        }
    }
}

/// Per-deployment configuration: risk thresholds, revalidation interval,
/// and enforcement exclusions. Always passed explicitly at construction;
/// there is no ambient default instance.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    profile: Profile,
    risk: RiskConfig,
    revalidation_interval: Duration,
    excluded_paths: Vec<String>,
}

impl GuardConfig {
    #[must_use]
    pub fn for_profile(profile: Profile) -> Self {
        let (risk, revalidation_seconds) = match profile {
            Profile::Standard => (RiskConfig::standard(), DEFAULT_REVALIDATION_SECONDS),
            Profile::Strict => (RiskConfig::strict(), STRICT_REVALIDATION_SECONDS),
            Profile::Admin => (RiskConfig::admin(), STRICT_REVALIDATION_SECONDS),
        };
        Self {
            profile,
            risk,
            revalidation_interval: Duration::from_secs(revalidation_seconds),
            excluded_paths: vec!["/".to_string(), "/health".to_string()],
        }
    }

    #[must_use]
    pub fn standard() -> Self {
        Self::for_profile(Profile::Standard)
    }

    #[must_use]
    pub fn with_revalidation_interval(mut self, interval: Duration) -> Self {
        self.revalidation_interval = interval;
        self
    }

    #[must_use]
    pub fn with_excluded_paths(mut self, paths: Vec<String>) -> Self {
        self.excluded_paths = paths;
        self
    }

    #[must_use]
    pub fn with_risk(mut self, risk: RiskConfig) -> Self {
        self.risk = risk;
        self
    }

    #[must_use]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    #[must_use]
    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    #[must_use]
    pub fn revalidation_interval(&self) -> Duration {
        self.revalidation_interval
    }

    #[must_use]
    pub fn excluded_paths(&self) -> &[String] {
        &self.excluded_paths
    }

    /// Exact match, or prefix match for patterns ending in `*`.
    #[must_use]
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|pattern| {
            pattern
                .strip_suffix('*')
                .map_or_else(|| pattern == path, |prefix| path.starts_with(prefix))
        })
    }
}

/// One inbound request as the orchestrator sees it. The HTTP adapter fills
/// the header-derived fields; the enrichment fields (geo, history, network
/// flags) come from whatever upstream intelligence the caller has.
#[derive(Debug, Clone, Default)]
pub struct AccessRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub cookie: Option<String>,
    pub query_token: Option<String>,
    pub has_step_up: bool,
    pub ip_address: String,
    pub user_agent: String,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
    pub capabilities: Option<BrowserCapabilities>,
    pub geo_location: Option<GeoLocation>,
    pub previous_logins: Option<Vec<LoginHistoryEntry>>,
    pub failed_attempts: Option<u32>,
    pub is_vpn: Option<bool>,
    pub is_tor: Option<bool>,
    pub is_proxy: Option<bool>,
}

/// Why a request failed authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingCredential,
    InvalidCredential,
    /// Verification infrastructure failed; reported as a server error but
    /// still denied.
    Internal,
}

/// Challenge descriptor returned with a step-up demand.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MfaChallenge {
    pub challenge_id: String,
    pub methods: Vec<String>,
    pub risk_level: RiskLevel,
}

impl MfaChallenge {
    fn new(claims: &TokenClaims, risk_level: RiskLevel) -> Self {
        let methods = if claims.mfa_enabled {
            vec!["totp".to_string(), "webauthn".to_string()]
        } else {
            vec!["email".to_string()]
        };
        Self {
            challenge_id: Ulid::new().to_string(),
            methods,
            risk_level,
        }
    }
}

/// Closed set of decision outcomes; callers must handle every branch.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Path excluded from enforcement; no verification was attempted.
    Skipped,
    /// Risk policy denied access.
    Blocked { assessment: RiskAssessment },
    /// Access needs a step-up credential first. Not a failure.
    MfaRequired {
        challenge: MfaChallenge,
        assessment: RiskAssessment,
    },
    /// The session store rejected or could not answer for the session.
    SessionFailed,
    /// Credential missing, unverifiable, or the verifier itself failed.
    AuthFailed { reason: AuthFailure },
    Authenticated {
        principal: AuthenticatedPrincipal,
        assessment: RiskAssessment,
    },
}

/// Pipeline states, traced on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Init,
    Skipped,
    TokenExtracted,
    TokenVerified,
    TokenFailed,
    ContextBuilt,
    RiskAssessed,
    Blocked,
    MfaRequired,
    SessionCheck,
    SessionFailed,
    Authenticated,
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    debug!(from = ?state, to = ?next, "pipeline transition");
    *state = next;
}

/// The per-request decision engine. All collaborators are injected; the
/// guard owns only the trust cache it shares with the sweeper.
pub struct Guard {
    config: GuardConfig,
    assessor: RiskAssessor,
    cache: Arc<TrustCache>,
    tokens: Arc<dyn TokenVerifier>,
    sessions: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
}

impl Guard {
    #[must_use]
    pub fn new(
        config: GuardConfig,
        threat_feed: Arc<dyn ThreatFeed>,
        tokens: Arc<dyn TokenVerifier>,
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let cache = Arc::new(TrustCache::new(config.revalidation_interval()));
        let assessor = RiskAssessor::new(config.risk().clone(), threat_feed);
        Self {
            config,
            assessor,
            cache,
            tokens,
            sessions,
            audit,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Shared handle for the background sweeper and health reporting.
    #[must_use]
    pub fn cache(&self) -> Arc<TrustCache> {
        Arc::clone(&self.cache)
    }

    #[must_use]
    pub fn assessor(&self) -> &RiskAssessor {
        &self.assessor
    }

    /// Run the full decision pipeline for one request.
    pub async fn authenticate(&self, request: &AccessRequest) -> AuthOutcome {
        let mut state = PipelineState::Init;

        if self.config.is_excluded(&request.path) {
            transition(&mut state, PipelineState::Skipped);
            return AuthOutcome::Skipped;
        }

        let Some(credential) = extract_credential(request) else {
            transition(&mut state, PipelineState::TokenFailed);
            debug!(path = %request.path, "no bearer credential presented");
            return AuthOutcome::AuthFailed {
                reason: AuthFailure::MissingCredential,
            };
        };
        transition(&mut state, PipelineState::TokenExtracted);

        let claims = match self.tokens.verify_access_token(&credential).await {
            Ok(claims) => {
                transition(&mut state, PipelineState::TokenVerified);
                claims
            }
            Err(TokenError::Infrastructure(message)) => {
                transition(&mut state, PipelineState::TokenFailed);
                error!(path = %request.path, error = %message, "token verification infrastructure failed");
                return AuthOutcome::AuthFailed {
                    reason: AuthFailure::Internal,
                };
            }
            Err(err) => {
                transition(&mut state, PipelineState::TokenFailed);
                debug!(path = %request.path, error = %err, "token rejected");
                return AuthOutcome::AuthFailed {
                    reason: AuthFailure::InvalidCredential,
                };
            }
        };

        let context = self.build_context(request, &claims);
        transition(&mut state, PipelineState::ContextBuilt);

        let assessment = self.assessor.assess(&context);
        transition(&mut state, PipelineState::RiskAssessed);

        if !assessment.allow_access {
            transition(&mut state, PipelineState::Blocked);
            self.audit.record(AuditEvent {
                timestamp: Utc::now(),
                decision: Decision::Blocked,
                user_id: claims.subject,
                session_id: claims.session_id,
                ip_address: request.ip_address.clone(),
                path: request.path.clone(),
                risk_score: assessment.overall_score,
                risk_level: assessment.level,
            });
            return AuthOutcome::Blocked { assessment };
        }

        if assessment.requires_mfa && !request.has_step_up {
            transition(&mut state, PipelineState::MfaRequired);
            self.audit.record(AuditEvent {
                timestamp: Utc::now(),
                decision: Decision::StepUpRequired,
                user_id: claims.subject,
                session_id: claims.session_id,
                ip_address: request.ip_address.clone(),
                path: request.path.clone(),
                risk_score: assessment.overall_score,
                risk_level: assessment.level,
            });
            let challenge = MfaChallenge::new(&claims, assessment.level);
            return AuthOutcome::MfaRequired {
                challenge,
                assessment,
            };
        }

        transition(&mut state, PipelineState::SessionCheck);
        let cached = self.cache.get(claims.session_id).await;
        let risk_score = match cached {
            Some(entry) if entry.is_fresh(self.config.revalidation_interval()) => {
                debug!(session_id = %claims.session_id, "trust cache hit");
                entry.risk_score()
            }
            _ => {
                match self.sessions.validate(claims.session_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        transition(&mut state, PipelineState::SessionFailed);
                        warn!(session_id = %claims.session_id, "session store rejected session");
                        return AuthOutcome::SessionFailed;
                    }
                    Err(err) => {
                        transition(&mut state, PipelineState::SessionFailed);
                        error!(session_id = %claims.session_id, error = %err, "session store unavailable");
                        return AuthOutcome::SessionFailed;
                    }
                }
                if let Err(err) = self.sessions.touch(claims.session_id).await {
                    // Activity stamping is best-effort; validation already
                    // succeeded.
                    warn!(session_id = %claims.session_id, error = %err, "session touch failed");
                }
                // The cache write happens only after the store round trip
                // completed; an abandoned request never leaves an entry.
                self.cache
                    .put(claims.session_id, assessment.overall_score)
                    .await;
                assessment.overall_score
            }
        };

        transition(&mut state, PipelineState::Authenticated);
        let principal = AuthenticatedPrincipal::from_claims(
            claims,
            risk_score,
            context.device_fingerprint.clone(),
        );
        if assessment.level >= RiskLevel::High {
            warn!(
                user_id = %principal.id,
                score = assessment.overall_score,
                level = assessment.level.as_str(),
                "elevated-risk session authenticated"
            );
        }
        self.audit.record(AuditEvent {
            timestamp: Utc::now(),
            decision: Decision::Allowed,
            user_id: principal.id,
            session_id: principal.session_id,
            ip_address: request.ip_address.clone(),
            path: request.path.clone(),
            risk_score: assessment.overall_score,
            risk_level: assessment.level,
        });
        AuthOutcome::Authenticated {
            principal,
            assessment,
        }
    }

    /// Assemble the assessment context: fingerprint regenerated from the
    /// current request's signals, identity from the verified claims.
    fn build_context(
        &self,
        request: &AccessRequest,
        claims: &TokenClaims,
    ) -> crate::risk::SecurityContext {
        let now = Utc::now();
        let signals = DeviceSignals {
            user_agent: request.user_agent.clone(),
            ip_address: request.ip_address.clone(),
            accept_language: request.accept_language.clone(),
            accept_encoding: request.accept_encoding.clone(),
            capabilities: request.capabilities.clone(),
        };
        let device_fingerprint = fingerprint::generate(&signals);
        let account_age_days = claims
            .last_login
            .map(|last_login| u32::try_from((now - last_login).num_days().max(0)).unwrap_or(u32::MAX));

        crate::risk::SecurityContext {
            user_id: claims.subject,
            session_id: claims.session_id,
            device_fingerprint,
            ip_address: request.ip_address.clone(),
            user_agent: request.user_agent.clone(),
            timestamp: now,
            geo_location: request.geo_location.clone(),
            previous_logins: request.previous_logins.clone(),
            failed_attempts: request.failed_attempts,
            account_age_days,
            is_vpn: request.is_vpn,
            is_tor: request.is_tor,
            is_proxy: request.is_proxy,
        }
    }
}

/// Bearer extraction order: authorization header, then cookie, then query
/// parameter (logged, since URLs leak into access logs).
fn extract_credential(request: &AccessRequest) -> Option<String> {
    if let Some(token) = request
        .authorization
        .as_deref()
        .and_then(extract_bearer_token)
    {
        return Some(token);
    }
    if let Some(token) = request.cookie.as_deref().and_then(extract_cookie_token) {
        return Some(token);
    }
    if let Some(token) = request.query_token.as_deref() {
        let trimmed = token.trim();
        if !trimmed.is_empty() {
            warn!(path = %request.path, "bearer credential passed as query parameter");
            return Some(trimmed.to_string());
        }
    }
    None
}

fn extract_bearer_token(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn extract_cookie_token(value: &str) -> Option<String> {
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == TOKEN_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}
