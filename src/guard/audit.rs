//! Fire-and-forget audit trail of access decisions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::risk::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Blocked,
    StepUpRequired,
    Allowed,
}

/// One recorded decision. Carries enough to reconstruct why without ever
/// holding the credential itself.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub ip_address: String,
    pub path: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
}

/// Destination for decision events. Implementations must not block the
/// request path; recording is best-effort.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Default sink: structured log lines, severity matched to the decision.
#[derive(Debug, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event.decision {
            Decision::Blocked => error!(
                user_id = %event.user_id,
                session_id = %event.session_id,
                ip = %event.ip_address,
                path = %event.path,
                score = event.risk_score,
                level = event.risk_level.as_str(),
                "access blocked"
            ),
            Decision::StepUpRequired => warn!(
                user_id = %event.user_id,
                session_id = %event.session_id,
                ip = %event.ip_address,
                path = %event.path,
                score = event.risk_score,
                level = event.risk_level.as_str(),
                "step-up verification required"
            ),
            Decision::Allowed => debug!(
                user_id = %event.user_id,
                session_id = %event.session_id,
                ip = %event.ip_address,
                path = %event.path,
                score = event.risk_score,
                level = event.risk_level.as_str(),
                "access allowed"
            ),
        }
    }
}
