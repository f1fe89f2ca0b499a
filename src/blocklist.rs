use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use url::Url;

const AD_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googleadservices.com",
    "adsafeprotected.com",
    "adnxs.com",
    "advertising.com",
    "amazon-adsystem.com",
    "advertising.amazon.com",
    "facebook.com/tr",
    "facebook.net",
    "fbcdn.net",
    "adsrvr.org",
    "adtechus.com",
    "outbrain.com",
    "taboola.com",
    "criteo.com",
    "scorecardresearch.com",
    "quantserve.com",
    "google-analytics.com",
    "googletagmanager.com",
    "analytics.google.com",
    "hotjar.com",
    "mouseflow.com",
    "fullstory.com",
    "mixpanel.com",
    "segment.com",
    "amplitude.com",
];

const TRACKER_DOMAINS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "doubleclick.net",
    "googlesyndication.com",
    "facebook.com/tr",
    "facebook.net",
    "scorecardresearch.com",
    "quantserve.com",
    "adnxs.com",
    "advertising.com",
    "criteo.com",
    "outbrain.com",
    "taboola.com",
    "googletagservices.com",
    "googleapis.com/analytics",
    "gstatic.com/analytics",
    "ga.js",
    "analytics.js",
];

const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
];

/// Drop known tracking parameters from `url`, keeping the rest in order.
/// Anything that does not parse, or carries no tracking parameters, comes
/// back untouched.
pub fn sanitize_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let is_tracking = |key: &str| TRACKING_PARAMS.iter().any(|p| *p == key);
    if !parsed.query_pairs().any(|(key, _)| is_tracking(&key[..])) {
        return url.to_string();
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking(&key[..]))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    debug!(from = url, to = %parsed, "stripped tracking parameters");
    parsed.into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Ad,
    Tracker,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Ad => "ad",
            BlockKind::Tracker => "tracker",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockVerdict {
    pub blocked: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<BlockKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl BlockVerdict {
    fn allowed() -> Self {
        Self {
            blocked: false,
            kind: None,
            domain: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStats {
    pub ads_blocked: u64,
    pub trackers_blocked: u64,
    pub total_blocked: u64,
    pub blocked_domains_count: usize,
    pub enabled: bool,
}

#[derive(Default)]
struct Counters {
    ads: u64,
    trackers: u64,
    domains: HashSet<&'static str>,
}

pub struct BlockFilter {
    enabled: AtomicBool,
    counters: Mutex<Counters>,
}

impl Default for BlockFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockFilter {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn is_blocked(&self, url: &str) -> BlockVerdict {
        if !self.is_enabled() {
            return BlockVerdict::allowed();
        }
        let lower = url.to_lowercase();

        let hit = AD_DOMAINS
            .iter()
            .find(|d| lower.contains(*d))
            .map(|d| (BlockKind::Ad, *d))
            .or_else(|| {
                TRACKER_DOMAINS
                    .iter()
                    .find(|d| lower.contains(*d))
                    .map(|d| (BlockKind::Tracker, *d))
            });

        let Some((kind, domain)) = hit else {
            return BlockVerdict::allowed();
        };

        let mut counters = self.counters.lock();
        match kind {
            BlockKind::Ad => counters.ads += 1,
            BlockKind::Tracker => counters.trackers += 1,
        }
        counters.domains.insert(domain);
        drop(counters);

        info!(kind = kind.as_str(), domain, "blocked request");
        BlockVerdict {
            blocked: true,
            kind: Some(kind),
            domain: Some(domain.to_string()),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> BlockStats {
        let counters = self.counters.lock();
        BlockStats {
            ads_blocked: counters.ads,
            trackers_blocked: counters.trackers,
            total_blocked: counters.ads + counters.trackers,
            blocked_domains_count: counters.domains.len(),
            enabled: self.is_enabled(),
        }
    }

    pub fn reset_stats(&self) {
        *self.counters.lock() = Counters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_list_wins_over_tracker_list() {
        let filter = BlockFilter::new();
        let verdict = filter.is_blocked("https://stats.DoubleClick.net/pixel");
        assert!(verdict.blocked);
        assert_eq!(verdict.kind, Some(BlockKind::Ad));
        assert_eq!(verdict.domain.as_deref(), Some("doubleclick.net"));
    }

    #[test]
    fn tracker_only_entries_are_trackers() {
        let filter = BlockFilter::new();
        let verdict = filter.is_blocked("https://cdn.example.com/ga.js");
        assert_eq!(verdict.kind, Some(BlockKind::Tracker));
    }

    #[test]
    fn clean_urls_pass() {
        let filter = BlockFilter::new();
        assert_eq!(filter.is_blocked("https://example.com"), BlockVerdict::allowed());
        assert_eq!(filter.stats().total_blocked, 0);
    }

    #[test]
    fn disabled_filter_blocks_nothing() {
        let filter = BlockFilter::new();
        filter.disable();
        assert!(!filter.is_blocked("https://doubleclick.net").blocked);
        assert!(!filter.stats().enabled);
    }

    #[test]
    fn google_service_trackers_are_listed() {
        let filter = BlockFilter::new();
        for url in [
            "https://www.googletagservices.com/tag/js/gpt.js",
            "https://www.googleapis.com/analytics/v3/data",
            "https://www.gstatic.com/analytics/collect",
        ] {
            assert_eq!(filter.is_blocked(url).kind, Some(BlockKind::Tracker), "{url}");
        }
        // Only the analytics paths, not the whole hosts.
        assert!(!filter.is_blocked("https://fonts.googleapis.com/css2").blocked);
    }

    #[test]
    fn sanitize_strips_tracking_params_only() {
        assert_eq!(
            sanitize_url("https://example.com/?utm_source=x&id=1"),
            "https://example.com/?id=1"
        );
        assert_eq!(
            sanitize_url("https://shop.example/item?a=1&fbclid=abc&b=2&gclid=z&ref=home"),
            "https://shop.example/item?a=1&b=2"
        );
    }

    #[test]
    fn sanitize_drops_empty_query() {
        assert_eq!(
            sanitize_url("https://example.com/page?utm_medium=email&utm_campaign=spring"),
            "https://example.com/page"
        );
    }

    #[test]
    fn sanitize_leaves_clean_and_unparsable_urls_alone() {
        assert_eq!(sanitize_url("https://example.com"), "https://example.com");
        assert_eq!(
            sanitize_url("https://example.com/?q=a%20b&referrer=x"),
            "https://example.com/?q=a%20b&referrer=x"
        );
        assert_eq!(sanitize_url("not a url"), "not a url");
    }

    #[test]
    fn stats_count_and_reset() {
        let filter = BlockFilter::new();
        filter.is_blocked("https://doubleclick.net/a");
        filter.is_blocked("https://doubleclick.net/b");
        filter.is_blocked("https://x.org/analytics.js");

        let stats = filter.stats();
        assert_eq!(stats.ads_blocked, 2);
        assert_eq!(stats.trackers_blocked, 1);
        assert_eq!(stats.total_blocked, 3);
        assert_eq!(stats.blocked_domains_count, 2);

        filter.reset_stats();
        assert_eq!(filter.stats().total_blocked, 0);
        assert_eq!(filter.stats().blocked_domains_count, 0);
    }
}
