//! Device identity derivation from request signals.
//!
//! Fingerprints are value objects: the same signals always produce the same
//! `id` and `trust_score`, and a fingerprint is never mutated after creation.
//! Comparisons go through [`compare`], not identity equality.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

const BASELINE_TRUST: i16 = 70;
const AUTOMATION_PENALTY: i16 = 40;
const MISSING_FEATURES_PENALTY: i16 = 20;
const NO_CAPABILITY_PROBE_PENALTY: i16 = 10;
const MISSING_HEADER_PENALTY: i16 = 5;
const SAME_DEVICE_THRESHOLD: u8 = 80;

/// User-agent substrings that identify automation tooling. Matching is
/// case-insensitive and drives both the trust penalty and `is_bot`.
pub(crate) const AUTOMATION_SIGNATURES: [&str; 8] = [
    "headless",
    "phantom",
    "selenium",
    "webdriver",
    "automation",
    "bot",
    "crawler",
    "scraper",
];

/// Raw signals collected from one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DeviceSignals {
    pub user_agent: String,
    pub ip_address: String,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
    /// Client-side capability probes, when the caller ran them.
    pub capabilities: Option<BrowserCapabilities>,
}

/// Browser feature probes reported by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BrowserCapabilities {
    pub canvas: bool,
    pub webgl: bool,
    pub audio_context: bool,
    pub plugins: Vec<String>,
}

impl BrowserCapabilities {
    /// Number of expected features absent from this probe set.
    pub(crate) fn missing_count(&self) -> u8 {
        u8::from(!self.canvas)
            + u8::from(!self.webgl)
            + u8::from(!self.audio_context)
            + u8::from(self.plugins.is_empty())
    }
}

/// Derived device identity. A new fingerprint is a new value; fields are
/// never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceFingerprint {
    /// Stable digest of user-agent + IP + coarse headers.
    pub id: String,
    pub user_agent: String,
    pub ip_address: String,
    /// 0-100, neutral baseline minus signal penalties.
    pub trust_score: u8,
    pub created_at: DateTime<Utc>,
    pub capabilities: Option<BrowserCapabilities>,
}

impl DeviceFingerprint {
    /// Rebind the creation timestamp, for callers that persist fingerprints
    /// and rehydrate them later.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Whether the user-agent matches a known automation signature.
    #[must_use]
    pub fn is_automation(&self) -> bool {
        matches_automation_signature(&self.user_agent).is_some()
    }
}

/// Coarse device class sniffed from the user-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}

/// Diagnostic breakdown produced by [`analyze`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FingerprintAnalysis {
    pub fingerprint: DeviceFingerprint,
    /// Human-readable notes on what lowered the trust score.
    pub notes: Vec<String>,
    pub trust_score: u8,
    /// Strictly the automation-signature match, independent of trust score.
    pub is_bot: bool,
    pub device_type: DeviceType,
    pub browser_family: String,
    pub os_family: String,
}

/// Field-wise comparison of two fingerprints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FingerprintComparison {
    /// 0-100 weighted similarity across comparable fields.
    pub similarity: u8,
    pub matching_fields: Vec<&'static str>,
    pub different_fields: Vec<&'static str>,
    pub is_same_device: bool,
}

/// Derive a fingerprint from one request's signals.
///
/// Deterministic for identical signal sets: repeated calls for the same
/// device converge to the same `id` even though no state is kept here.
#[must_use]
pub fn generate(signals: &DeviceSignals) -> DeviceFingerprint {
    DeviceFingerprint {
        id: digest_id(signals),
        user_agent: signals.user_agent.clone(),
        ip_address: signals.ip_address.clone(),
        trust_score: trust_score(signals),
        created_at: Utc::now(),
        capabilities: signals.capabilities.clone(),
    }
}

/// Descriptive variant of [`generate`] used for diagnostics.
#[must_use]
pub fn analyze(signals: &DeviceSignals) -> FingerprintAnalysis {
    let fingerprint = generate(signals);
    let mut notes = Vec::new();

    if fingerprint.is_automation() {
        notes.push("user-agent matches an automation signature".to_string());
    }
    if header_missing(signals.accept_language.as_deref()) {
        notes.push("accept-language header missing".to_string());
    }
    if header_missing(signals.accept_encoding.as_deref()) {
        notes.push("accept-encoding header missing".to_string());
    }
    match &signals.capabilities {
        None => notes.push("no browser capability probes supplied".to_string()),
        Some(caps) if caps.missing_count() >= 3 => notes.push(format!(
            "{} of 4 expected browser features missing",
            caps.missing_count()
        )),
        Some(_) => {}
    }

    FingerprintAnalysis {
        is_bot: fingerprint.is_automation(),
        trust_score: fingerprint.trust_score,
        device_type: classify_device(&signals.user_agent),
        browser_family: browser_family(&signals.user_agent).to_string(),
        os_family: os_family(&signals.user_agent).to_string(),
        fingerprint,
        notes,
    }
}

/// Compare two fingerprints field by field.
///
/// Capability flags only count when both sides carried probes; otherwise the
/// similarity is scored over the fields both fingerprints actually have.
#[must_use]
pub fn compare(a: &DeviceFingerprint, b: &DeviceFingerprint) -> FingerprintComparison {
    let mut matching = Vec::new();
    let mut different = Vec::new();
    let mut earned: u32 = 0;
    let mut total: u32 = 0;

    let mut field = |name: &'static str, weight: u32, equal: bool| {
        total += weight;
        if equal {
            earned += weight;
            matching.push(name);
        } else {
            different.push(name);
        }
    };

    field("user_agent", 30, a.user_agent == b.user_agent);
    field("ip_address", 30, a.ip_address == b.ip_address);

    if let (Some(ca), Some(cb)) = (&a.capabilities, &b.capabilities) {
        field("canvas", 10, ca.canvas == cb.canvas);
        field("webgl", 10, ca.webgl == cb.webgl);
        field("audio_context", 10, ca.audio_context == cb.audio_context);
        field("plugins", 10, ca.plugins == cb.plugins);
    }

    let similarity = if total == 0 {
        0
    } else {
        u8::try_from(earned * 100 / total).unwrap_or(100)
    };

    FingerprintComparison {
        similarity,
        matching_fields: matching,
        different_fields: different,
        is_same_device: similarity >= SAME_DEVICE_THRESHOLD,
    }
}

fn digest_id(signals: &DeviceSignals) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signals.user_agent.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(signals.ip_address.as_bytes());
    hasher.update(b"\x1f");
    if let Some(language) = &signals.accept_language {
        hasher.update(language.as_bytes());
    }
    hasher.update(b"\x1f");
    if let Some(encoding) = &signals.accept_encoding {
        hasher.update(encoding.as_bytes());
    }
    Base64UrlUnpadded::encode_string(&hasher.finalize())
}

fn trust_score(signals: &DeviceSignals) -> u8 {
    let mut score = BASELINE_TRUST;

    if matches_automation_signature(&signals.user_agent).is_some() {
        score -= AUTOMATION_PENALTY;
    }
    if header_missing(signals.accept_language.as_deref()) {
        score -= MISSING_HEADER_PENALTY;
    }
    if header_missing(signals.accept_encoding.as_deref()) {
        score -= MISSING_HEADER_PENALTY;
    }
    match &signals.capabilities {
        None => score -= NO_CAPABILITY_PROBE_PENALTY,
        Some(caps) if caps.missing_count() >= 3 => score -= MISSING_FEATURES_PENALTY,
        Some(_) => {}
    }

    u8::try_from(score.clamp(0, 100)).unwrap_or(0)
}

fn header_missing(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

pub(crate) fn matches_automation_signature(user_agent: &str) -> Option<&'static str> {
    let lowered = user_agent.to_lowercase();
    AUTOMATION_SIGNATURES
        .iter()
        .find(|signature| lowered.contains(*signature))
        .copied()
}

fn classify_device(user_agent: &str) -> DeviceType {
    let lowered = user_agent.to_lowercase();
    if lowered.contains("ipad") || lowered.contains("tablet") {
        DeviceType::Tablet
    } else if lowered.contains("mobile")
        || lowered.contains("iphone")
        || lowered.contains("android")
    {
        DeviceType::Mobile
    } else if lowered.contains("windows") || lowered.contains("macintosh") || lowered.contains("x11")
    {
        DeviceType::Desktop
    } else {
        DeviceType::Unknown
    }
}

fn browser_family(user_agent: &str) -> &'static str {
    let lowered = user_agent.to_lowercase();
    // Order matters: Edge and Chrome both advertise Safari tokens.
    if lowered.contains("edg/") || lowered.contains("edge") {
        "edge"
    } else if lowered.contains("firefox") {
        "firefox"
    } else if lowered.contains("chrome") || lowered.contains("chromium") {
        "chrome"
    } else if lowered.contains("safari") {
        "safari"
    } else {
        "unknown"
    }
}

fn os_family(user_agent: &str) -> &'static str {
    let lowered = user_agent.to_lowercase();
    if lowered.contains("android") {
        "android"
    } else if lowered.contains("iphone") || lowered.contains("ipad") || lowered.contains("ios") {
        "ios"
    } else if lowered.contains("windows") {
        "windows"
    } else if lowered.contains("mac os") || lowered.contains("macintosh") {
        "macos"
    } else if lowered.contains("linux") || lowered.contains("x11") {
        "linux"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESKTOP_UA: &str =
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

    fn full_signals() -> DeviceSignals {
        DeviceSignals {
            user_agent: DESKTOP_UA.to_string(),
            ip_address: "203.0.113.7".to_string(),
            accept_language: Some("en-US,en;q=0.9".to_string()),
            accept_encoding: Some("gzip, br".to_string()),
            capabilities: Some(BrowserCapabilities {
                canvas: true,
                webgl: true,
                audio_context: true,
                plugins: vec!["pdf-viewer".to_string()],
            }),
        }
    }

    #[test]
    fn generate_is_deterministic() {
        let signals = full_signals();
        let a = generate(&signals);
        let b = generate(&signals);
        assert_eq!(a.id, b.id);
        assert_eq!(a.trust_score, b.trust_score);
    }

    #[test]
    fn id_changes_with_user_agent() {
        let mut signals = full_signals();
        let a = generate(&signals);
        signals.user_agent = "curl/8.4.0".to_string();
        let b = generate(&signals);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn clean_browser_keeps_baseline_trust() {
        let fingerprint = generate(&full_signals());
        assert_eq!(fingerprint.trust_score, 70);
    }

    #[test]
    fn headless_user_agent_is_flagged_as_bot() {
        let mut signals = full_signals();
        signals.user_agent = "Mozilla/5.0 HeadlessChrome/120.0".to_string();
        let analysis = analyze(&signals);
        assert!(analysis.is_bot);
        assert!(analysis.trust_score < 50);
        assert!(
            analysis
                .notes
                .iter()
                .any(|note| note.contains("automation"))
        );
    }

    #[test]
    fn is_bot_is_independent_of_trust_score() {
        // A clean UA with no probes loses trust but is not a bot.
        let signals = DeviceSignals {
            user_agent: DESKTOP_UA.to_string(),
            ip_address: "203.0.113.7".to_string(),
            accept_language: None,
            accept_encoding: None,
            capabilities: None,
        };
        let analysis = analyze(&signals);
        assert!(!analysis.is_bot);
        assert!(analysis.trust_score < 70);
    }

    #[test]
    fn missing_features_are_penalized() {
        let mut signals = full_signals();
        signals.capabilities = Some(BrowserCapabilities {
            canvas: false,
            webgl: false,
            audio_context: false,
            plugins: vec!["pdf-viewer".to_string()],
        });
        let with_missing = generate(&signals);
        let baseline = generate(&full_signals());
        assert!(with_missing.trust_score < baseline.trust_score);
    }

    #[test]
    fn compare_same_signals_is_same_device() {
        let signals = full_signals();
        let comparison = compare(&generate(&signals), &generate(&signals));
        assert_eq!(comparison.similarity, 100);
        assert!(comparison.is_same_device);
        assert!(comparison.different_fields.is_empty());
    }

    #[test]
    fn compare_different_network_still_same_device() {
        let signals = full_signals();
        let a = generate(&signals);
        let mut moved = signals.clone();
        moved.ip_address = "198.51.100.23".to_string();
        let b = generate(&moved);
        let comparison = compare(&a, &b);
        assert!(comparison.different_fields.contains(&"ip_address"));
        // 70 of 100 points remain: below the same-device cutoff.
        assert!(!comparison.is_same_device);
    }

    #[test]
    fn compare_without_probes_scores_header_fields_only() {
        let mut signals = full_signals();
        signals.capabilities = None;
        let comparison = compare(&generate(&signals), &generate(&signals));
        assert_eq!(comparison.similarity, 100);
        assert_eq!(
            comparison.matching_fields,
            vec!["user_agent", "ip_address"]
        );
    }

    #[test]
    fn classifies_desktop_chrome_on_macos() {
        let analysis = analyze(&full_signals());
        assert_eq!(analysis.device_type, DeviceType::Desktop);
        assert_eq!(analysis.browser_family, "chrome");
        assert_eq!(analysis.os_family, "macos");
    }
}
