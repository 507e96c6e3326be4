//! Pluggable threat-intelligence feed.
//!
//! Lookups are synchronous so the assessor never suspends; the remote feed
//! refreshes its in-memory set from a background task instead.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use reqwest::{
    Client,
    header::{ETAG, IF_NONE_MATCH},
};
use tracing::{info, warn};
use url::Url;

const FEED_CACHE_TTL_SECONDS: u64 = 300;

/// Answers whether an address is on a known-malicious list. Implementations
/// must not block or suspend.
pub trait ThreatFeed: Send + Sync {
    fn is_known_malicious(&self, ip: IpAddr) -> bool;

    /// Dependency status surfaced by `/health`.
    fn status(&self) -> FeedStatus {
        FeedStatus::Static
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// Remote feed reachable and fresh.
    Ok,
    /// Remote feed unreachable; serving the last known set.
    Error,
    /// No external dependency.
    Static,
}

impl FeedStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Static => "static",
        }
    }
}

/// Feed that never matches; for deployments without threat intelligence.
#[derive(Debug, Clone)]
pub struct NoopThreatFeed;

impl ThreatFeed for NoopThreatFeed {
    fn is_known_malicious(&self, _ip: IpAddr) -> bool {
        false
    }
}

/// Fixed denylist, loaded once at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticThreatFeed {
    addresses: HashSet<IpAddr>,
}

impl StaticThreatFeed {
    #[must_use]
    pub fn new(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }
}

impl ThreatFeed for StaticThreatFeed {
    fn is_known_malicious(&self, ip: IpAddr) -> bool {
        self.addresses.contains(&ip)
    }
}

struct FeedCache {
    addresses: HashSet<IpAddr>,
    fetched_at: Instant,
    etag: Option<String>,
    last_refresh_ok: bool,
}

impl FeedCache {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < Duration::from_secs(FEED_CACHE_TTL_SECONDS)
    }
}

/// Denylist fetched from a remote newline-delimited list of addresses.
///
/// Refresh failures keep the last known set so lookups keep working; the
/// degraded state is reported through [`ThreatFeed::status`].
pub struct RemoteThreatFeed {
    url: String,
    client: Client,
    cache: RwLock<FeedCache>,
}

impl RemoteThreatFeed {
    /// Build a feed for an https URL. The first fetch happens on the initial
    /// [`Self::refresh`]; until then every lookup misses.
    ///
    /// # Errors
    /// Returns an error for a non-https URL or if the HTTP client cannot be
    /// built.
    pub fn new(url: String, user_agent: &str) -> Result<Self> {
        let parsed = Url::parse(&url).context("Invalid threat feed URL")?;
        if parsed.scheme() != "https" {
            return Err(anyhow!("Threat feed URL must use https: {url}"));
        }
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build threat feed HTTP client")?;
        Ok(Self {
            url,
            client,
            cache: RwLock::new(FeedCache {
                addresses: HashSet::new(),
                fetched_at: stale_instant(),
                etag: None,
                last_refresh_ok: false,
            }),
        })
    }

    /// Fetch the denylist and swap the in-memory set.
    ///
    /// # Errors
    /// Returns an error when the fetch fails; the previous set stays in
    /// place and the feed reports [`FeedStatus::Error`].
    pub async fn refresh(&self) -> Result<()> {
        let etag = self
            .cache
            .read()
            .map(|cache| cache.etag.clone())
            .unwrap_or_default();

        let result = self.fetch(etag.as_deref()).await;
        let mut cache = self
            .cache
            .write()
            .map_err(|_| anyhow!("threat feed cache lock poisoned"))?;
        match result {
            Ok(FetchOutcome::NotModified) => {
                cache.fetched_at = Instant::now();
                cache.last_refresh_ok = true;
                Ok(())
            }
            Ok(FetchOutcome::Updated { addresses, etag }) => {
                info!(entries = addresses.len(), "threat feed refreshed");
                cache.addresses = addresses;
                cache.fetched_at = Instant::now();
                cache.etag = etag;
                cache.last_refresh_ok = true;
                Ok(())
            }
            Err(err) => {
                // Keep serving the previous set; lookups must not fail open
                // by clearing it.
                cache.last_refresh_ok = false;
                Err(err)
            }
        }
    }

    async fn fetch(&self, etag: Option<&str>) -> Result<FetchOutcome> {
        let mut request = self.client.get(&self.url);
        if let Some(etag_value) = etag {
            request = request.header(IF_NONE_MATCH, etag_value);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 304 {
            return Ok(FetchOutcome::NotModified);
        }
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!("threat feed fetch failed: {status}"));
        }
        Ok(FetchOutcome::Updated {
            addresses: parse_denylist(&body),
            etag,
        })
    }
}

impl ThreatFeed for RemoteThreatFeed {
    fn is_known_malicious(&self, ip: IpAddr) -> bool {
        self.cache
            .read()
            .map(|cache| cache.addresses.contains(&ip))
            .unwrap_or(false)
    }

    fn status(&self) -> FeedStatus {
        self.cache
            .read()
            .map(|cache| {
                if cache.last_refresh_ok && cache.is_fresh() {
                    FeedStatus::Ok
                } else {
                    FeedStatus::Error
                }
            })
            .unwrap_or(FeedStatus::Error)
    }
}

enum FetchOutcome {
    NotModified,
    Updated {
        addresses: HashSet<IpAddr>,
        etag: Option<String>,
    },
}

/// One address per line; blank lines and `#` comments are skipped, anything
/// unparseable is logged and dropped.
fn parse_denylist(body: &str) -> HashSet<IpAddr> {
    let mut addresses = HashSet::new();
    let mut rejected = 0usize;
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match trimmed.parse::<IpAddr>() {
            Ok(ip) => {
                addresses.insert(ip);
            }
            Err(_) => rejected += 1,
        }
    }
    if rejected > 0 {
        warn!(rejected, "threat feed lines did not parse as addresses");
    }
    addresses
}

fn stale_instant() -> Instant {
    Instant::now()
        .checked_sub(Duration::from_secs(FEED_CACHE_TTL_SECONDS + 1))
        .unwrap_or_else(Instant::now)
}

/// Refresh the feed on a fixed period from a background task, decoupled
/// from request handling.
pub fn spawn_refresher(feed: std::sync::Arc<RemoteThreatFeed>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = feed.refresh().await {
                warn!(error = %err, url = %feed.url, "threat feed refresh failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_feed_never_matches() {
        assert!(!NoopThreatFeed.is_known_malicious("203.0.113.9".parse().unwrap()));
        assert_eq!(NoopThreatFeed.status(), FeedStatus::Static);
    }

    #[test]
    fn static_feed_matches_configured_addresses() {
        let feed = StaticThreatFeed::new(["198.51.100.66".parse().unwrap()]);
        assert!(feed.is_known_malicious("198.51.100.66".parse().unwrap()));
        assert!(!feed.is_known_malicious("198.51.100.67".parse().unwrap()));
    }

    #[test]
    fn denylist_parser_skips_comments_and_garbage() {
        let body = "# exit nodes\n198.51.100.66\n\nnot-an-ip\n2001:db8::7\n";
        let addresses = parse_denylist(body);
        assert_eq!(addresses.len(), 2);
        assert!(addresses.contains(&"198.51.100.66".parse::<IpAddr>().unwrap()));
        assert!(addresses.contains(&"2001:db8::7".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn remote_feed_rejects_plain_http() {
        let result = RemoteThreatFeed::new("http://feed.test/list".to_string(), "vigil/test");
        assert!(result.is_err());
    }

    #[test]
    fn remote_feed_starts_empty_and_degraded() {
        let feed =
            RemoteThreatFeed::new("https://feed.test/list".to_string(), "vigil/test").unwrap();
        assert!(!feed.is_known_malicious("198.51.100.66".parse().unwrap()));
        assert_eq!(feed.status(), FeedStatus::Error);
    }
}
