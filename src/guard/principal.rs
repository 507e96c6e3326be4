//! Authenticated principal attached to requests after a successful decision.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::token::TokenClaims;
use crate::fingerprint::DeviceFingerprint;

/// Verified identity plus the risk score the decision was made under.
/// Built fresh per request and never persisted by the engine.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthenticatedPrincipal {
    pub id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub mfa_enabled: bool,
    pub risk_score: u8,
    pub device_fingerprint: DeviceFingerprint,
    pub session_id: Uuid,
}

impl AuthenticatedPrincipal {
    pub(crate) fn from_claims(
        claims: TokenClaims,
        risk_score: u8,
        device_fingerprint: DeviceFingerprint,
    ) -> Self {
        Self {
            id: claims.subject,
            email: claims.email,
            roles: claims.roles,
            permissions: claims.permissions,
            mfa_enabled: claims.mfa_enabled,
            risk_score,
            device_fingerprint,
            session_id: claims.session_id,
        }
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|held| held == role)
    }

    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|held| held == permission)
    }
}
