//! Short-TTL cache of recently validated sessions.
//!
//! Avoids a session-store round trip for every request on an
//! already-validated session. The cache is process-local: multi-instance
//! deployments revalidate independently, at worst once per revalidation
//! interval per instance.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

// Entries are considered abandoned once idle for twice the revalidation
// interval; until then a stale entry still short-circuits nothing but may
// be refreshed in place.
const STALE_MULTIPLIER: u32 = 2;
const SWEEP_START_JITTER_MS: u64 = 1000;

/// One validated session. Whole-record value: a reader never observes a
/// partially updated entry.
#[derive(Debug, Clone, Copy)]
pub struct TrustEntry {
    last_validated: Instant,
    risk_score: u8,
}

impl TrustEntry {
    #[must_use]
    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }

    /// Entry is trustworthy only while younger than the revalidation
    /// interval; expired entries must trigger a fresh validation.
    #[must_use]
    pub fn is_fresh(&self, revalidation_interval: Duration) -> bool {
        self.last_validated.elapsed() < revalidation_interval
    }
}

/// Explicit, injectable store keyed by session id. Writes replace the whole
/// record; racing writers settle on last-writer-wins, which is acceptable
/// because both wrote a valid, recent score.
#[derive(Debug)]
pub struct TrustCache {
    entries: RwLock<HashMap<Uuid, TrustEntry>>,
    revalidation_interval: Duration,
}

impl TrustCache {
    #[must_use]
    pub fn new(revalidation_interval: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            revalidation_interval,
        }
    }

    #[must_use]
    pub fn revalidation_interval(&self) -> Duration {
        self.revalidation_interval
    }

    pub async fn get(&self, session_id: Uuid) -> Option<TrustEntry> {
        self.entries.read().await.get(&session_id).copied()
    }

    /// Record a successful validation, overwriting any previous entry.
    pub async fn put(&self, session_id: Uuid, risk_score: u8) {
        let entry = TrustEntry {
            last_validated: Instant::now(),
            risk_score,
        };
        self.entries.write().await.insert(session_id, entry);
    }

    /// Drop a session eagerly, e.g. on logout or termination.
    pub async fn remove(&self, session_id: Uuid) {
        self.entries.write().await.remove(&session_id);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Remove entries idle past twice the revalidation interval.
    ///
    /// Stale keys are snapshotted under the read lock first so the write
    /// lock is held only for the deletions, not the full scan.
    pub async fn sweep(&self) -> usize {
        let stale_after = self.revalidation_interval * STALE_MULTIPLIER;
        let stale: Vec<Uuid> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.last_validated.elapsed() >= stale_after)
            .map(|(session_id, _)| *session_id)
            .collect();
        if stale.is_empty() {
            return 0;
        }

        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for session_id in stale {
            // An entry may have been refreshed between snapshot and delete.
            let still_stale = entries
                .get(&session_id)
                .is_some_and(|entry| entry.last_validated.elapsed() >= stale_after);
            if still_stale && entries.remove(&session_id).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

/// Run [`TrustCache::sweep`] on a fixed period from a background task,
/// decoupled from request handling.
pub fn spawn_sweeper(cache: Arc<TrustCache>, period: Duration) {
    tokio::spawn(async move {
        // Jittered start so several instances do not sweep in lockstep.
        let jitter = rand::thread_rng().gen_range(0..=SWEEP_START_JITTER_MS);
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = cache.sweep().await;
            if removed > 0 {
                debug!(removed, "trust cache sweep");
            }
        }
    });
}
