//! Tiered gateway resolution with caching.
//!
//! Given a content address and the user's region, try: the cached
//! last-successful gateway, then available in-region gateways ordered by
//! observed p50 latency, then the remaining in-region gateways, then
//! neighbouring regions by the fixed adjacency table, then the global
//! last-resort gateways. Failures back off exponentially before advancing.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::gateway::{Gateway, GatewayClient};
use crate::monitor::HealthBoard;
use crate::reference::ReferenceData;
use crate::snapshot::ContentAddress;

/// Successful resolution receipt: the bytes plus how they were obtained.
#[derive(Debug, Clone)]
pub struct ResolvedContent {
    pub bytes: Vec<u8>,
    pub gateway_used: String,
    pub attempt_count: u32,
    pub total_duration_ms: u64,
    pub errors_encountered: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Every tier failed; the attempt log tells the story.
    #[error("all gateway tiers exhausted after {attempts} attempts for {cid}")]
    Exhausted {
        cid: ContentAddress,
        attempts: u32,
        errors: Vec<String>,
    },
}

struct SuccessEntry {
    gateway_url: String,
    at: Instant,
}

pub struct FallbackResolver {
    config: ResolverConfig,
    refs: Arc<ReferenceData>,
    gateways: Vec<Gateway>,
    client: Arc<dyn GatewayClient>,
    board: HealthBoard,
    /// Last successful gateway per content address, TTL-bounded.
    success_cache: Mutex<LruCache<ContentAddress, SuccessEntry>>,
    /// Per-gateway recent failures, window-bounded, to prevent thrashing.
    failure_cache: Mutex<HashMap<String, Instant>>,
}

impl FallbackResolver {
    pub fn new(
        config: ResolverConfig,
        refs: Arc<ReferenceData>,
        gateways: Vec<Gateway>,
        client: Arc<dyn GatewayClient>,
        board: HealthBoard,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity.max(1)).unwrap();
        Self {
            config,
            refs,
            gateways,
            client,
            board,
            success_cache: Mutex::new(LruCache::new(capacity)),
            failure_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a content address for a user region.
    pub async fn resolve(
        &self,
        cid: &ContentAddress,
        user_region: &str,
    ) -> Result<ResolvedContent, ResolveError> {
        let started = Instant::now();
        let mut errors: Vec<String> = Vec::new();
        let mut attempts = 0u32;

        for (tier, gateway_url) in self.candidate_urls(cid, user_region) {
            if attempts >= self.config.max_attempts {
                break;
            }
            if attempts > 0 {
                // Exponential backoff keyed to the tier being advanced into.
                let delay = self.config.backoff_base_ms.saturating_mul(1 << tier.min(8));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            attempts += 1;

            match self.client.fetch(&gateway_url, cid).await {
                Ok(bytes) => {
                    self.success_cache.lock().put(
                        cid.clone(),
                        SuccessEntry { gateway_url: gateway_url.clone(), at: Instant::now() },
                    );
                    self.failure_cache.lock().remove(&gateway_url);
                    return Ok(ResolvedContent {
                        bytes,
                        gateway_used: gateway_url,
                        attempt_count: attempts,
                        total_duration_ms: started.elapsed().as_millis() as u64,
                        errors_encountered: errors,
                    });
                }
                Err(error) => {
                    debug!(gateway = %gateway_url, %error, "resolve attempt failed");
                    self.failure_cache.lock().insert(gateway_url.clone(), Instant::now());
                    errors.push(format!("{gateway_url}: {error}"));
                }
            }
        }

        Err(ResolveError::Exhausted { cid: cid.clone(), attempts, errors })
    }

    /// Ordered candidate list: (tier index, gateway url). Tier 0 is the
    /// success cache; gateways in the failure window are pushed to the very
    /// end rather than dropped, so resolution can still drain them when
    /// everything else is down.
    fn candidate_urls(&self, cid: &ContentAddress, user_region: &str) -> Vec<(usize, String)> {
        let failure_window = Duration::from_secs(self.config.failure_window_secs);
        let cache_ttl = Duration::from_secs(self.config.cache_ttl_secs);

        let mut ordered: Vec<(usize, String)> = Vec::new();

        // Tier 0: cached last-success for this address, if fresh.
        {
            let mut cache = self.success_cache.lock();
            if let Some(entry) = cache.get(cid) {
                if entry.at.elapsed() < cache_ttl {
                    ordered.push((0, entry.gateway_url.clone()));
                } else {
                    cache.pop(cid);
                }
            }
        }

        // Tiers 1-2: user region by health, then the rest of the region.
        let board = self.board.read();
        let mut in_region: Vec<&Gateway> =
            self.gateways.iter().filter(|g| g.region == user_region).collect();
        in_region.sort_by(|a, b| {
            let ha = board.get(&a.url);
            let hb = board.get(&b.url);
            let avail_a = ha.map(|h| h.available).unwrap_or(true);
            let avail_b = hb.map(|h| h.available).unwrap_or(true);
            let p50_a = ha.and_then(|h| h.p50()).unwrap_or(f64::MAX);
            let p50_b = hb.and_then(|h| h.p50()).unwrap_or(f64::MAX);
            avail_b
                .cmp(&avail_a)
                .then(p50_a.partial_cmp(&p50_b).unwrap_or(std::cmp::Ordering::Equal))
                .then(a.url.cmp(&b.url))
        });
        for (position, gateway) in in_region.iter().enumerate() {
            let tier = if position == 0 { 1 } else { 2 };
            ordered.push((tier, gateway.url.clone()));
        }

        // Tier 3: neighbouring regions in adjacency order.
        for neighbour in self.refs.region_neighbours(user_region) {
            for gateway in self.gateways.iter().filter(|g| &g.region == neighbour) {
                ordered.push((3, gateway.url.clone()));
            }
        }

        // Tier 4: global last-resort gateways.
        let global = self.refs.global_region();
        for gateway in self.gateways.iter().filter(|g| g.region == global) {
            ordered.push((4, gateway.url.clone()));
        }

        // Dedupe, keeping first occurrence.
        let mut seen = std::collections::HashSet::new();
        ordered.retain(|(_, url)| seen.insert(url.clone()));

        // Recent failures sink to the back within their order.
        let failures = self.failure_cache.lock();
        let (fresh, stale): (Vec<_>, Vec<_>) = ordered.into_iter().partition(|(_, url)| {
            failures
                .get(url)
                .map(|at| at.elapsed() >= failure_window)
                .unwrap_or(true)
        });
        fresh.into_iter().chain(stale).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGatewayClient;
    use parking_lot::RwLock;

    fn gateways() -> Vec<Gateway> {
        vec![
            Gateway { url: "https://am-1".into(), region: "americas".into(), pinning_service_id: None },
            Gateway { url: "https://am-2".into(), region: "americas".into(), pinning_service_id: None },
            Gateway { url: "https://eu-1".into(), region: "europe".into(), pinning_service_id: None },
            Gateway { url: "https://global-1".into(), region: "global".into(), pinning_service_id: None },
        ]
    }

    fn resolver(client: Arc<MockGatewayClient>) -> FallbackResolver {
        let config = ResolverConfig { backoff_base_ms: 1, ..ResolverConfig::default() };
        let refs = Arc::new(ReferenceData::load().unwrap());
        let board: HealthBoard = Arc::new(RwLock::new(HashMap::new()));
        FallbackResolver::new(config, refs, gateways(), client, board)
    }

    #[tokio::test]
    async fn resolves_from_user_region_first() {
        let client = MockGatewayClient::new();
        let cid = client.insert(b"manifest");
        let resolver = resolver(Arc::clone(&client));
        let resolved = resolver.resolve(&cid, "americas").await.unwrap();
        assert!(resolved.gateway_used.starts_with("https://am-"));
        assert_eq!(resolved.attempt_count, 1);
        assert_eq!(resolved.bytes, b"manifest");
        assert!(resolved.errors_encountered.is_empty());
    }

    #[tokio::test]
    async fn falls_through_region_then_neighbours_then_global() {
        let client = MockGatewayClient::new();
        let cid = client.insert(b"manifest");
        client.kill("https://am-1");
        client.kill("https://am-2");
        client.kill("https://eu-1");
        let resolver = resolver(Arc::clone(&client));
        let resolved = resolver.resolve(&cid, "americas").await.unwrap();
        assert_eq!(resolved.gateway_used, "https://global-1");
        assert_eq!(resolved.attempt_count, 4);
        assert_eq!(resolved.errors_encountered.len(), 3);
    }

    #[tokio::test]
    async fn success_cache_short_circuits_subsequent_resolves() {
        let client = MockGatewayClient::new();
        let cid = client.insert(b"manifest");
        client.kill("https://am-1");
        let resolver = resolver(Arc::clone(&client));
        let first = resolver.resolve(&cid, "americas").await.unwrap();
        assert_eq!(first.gateway_used, "https://am-2");

        // The failed gateway recovers, but the cache pins am-2 first.
        client.revive("https://am-1");
        let second = resolver.resolve(&cid, "americas").await.unwrap();
        assert_eq!(second.gateway_used, "https://am-2");
        assert_eq!(second.attempt_count, 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_every_error() {
        let client = MockGatewayClient::new();
        let cid = ContentAddress::for_bytes(b"never-published");
        let resolver = resolver(Arc::clone(&client));
        let error = resolver.resolve(&cid, "americas").await.unwrap_err();
        match error {
            ResolveError::Exhausted { attempts, errors, .. } => {
                assert_eq!(attempts, 4);
                assert_eq!(errors.len(), 4);
                assert!(errors.iter().all(|e| e.contains("HTTP 404")));
            }
        }
    }

    #[tokio::test]
    async fn failure_window_deprioritizes_recently_failed_gateways() {
        let client = MockGatewayClient::new();
        let cid = client.insert(b"manifest");
        client.fail_next("https://am-1", 1);
        let resolver = resolver(Arc::clone(&client));

        // am-1 sorts first (url order with no health data); it fails once,
        // resolution lands on am-2.
        let first = resolver.resolve(&cid, "americas").await.unwrap();
        assert_eq!(first.gateway_used, "https://am-2");

        // A fresh resolve of a different address skips am-1 while it sits in
        // the failure window, even though it would now succeed.
        let other = client.insert(b"other-content");
        let second = resolver.resolve(&other, "americas").await.unwrap();
        assert_eq!(second.gateway_used, "https://am-2");
    }
}
