//! Deterministic in-memory doubles for the online services: a scriptable
//! pinning provider and a scriptable gateway client. Used by this crate's
//! test suites; exported so downstream integrations can drive the
//! replication and resolution paths without a network.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::gateway::{GatewayClient, GatewayError};
use crate::replicate::{
    PinStatus, PinningService, ProviderError, ProviderMetadata, ReplicaDescriptor, UploadMetadata,
};
use crate::snapshot::ContentAddress;

enum Behavior {
    Healthy,
    Failing(ProviderError),
    Flaky { remaining: u32, error: ProviderError },
    /// Returns a bogus content address for every upload.
    Corrupting,
}

/// How many times a flaky provider fails before succeeding.
pub struct FlakyPlan {
    pub failures_before_success: u32,
    pub error: ProviderError,
}

/// Scriptable in-memory pinning provider.
pub struct MockPinningService {
    metadata: ProviderMetadata,
    behavior: Mutex<Behavior>,
    pinned: Mutex<BTreeMap<ContentAddress, usize>>,
    unpinned: Mutex<Vec<ContentAddress>>,
}

impl MockPinningService {
    fn new(id: &str, regions: &[&str], behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            metadata: ProviderMetadata {
                id: id.to_string(),
                supported_regions: regions.iter().map(|r| r.to_string()).collect(),
                per_gb_cost: 0.08,
                free_tier_gb: 1.0,
            },
            behavior: Mutex::new(behavior),
            pinned: Mutex::new(BTreeMap::new()),
            unpinned: Mutex::new(Vec::new()),
        })
    }

    pub fn healthy(id: &str, regions: &[&str]) -> Arc<Self> {
        Self::new(id, regions, Behavior::Healthy)
    }

    pub fn failing(id: &str, regions: &[&str], error: ProviderError) -> Arc<Self> {
        Self::new(id, regions, Behavior::Failing(error))
    }

    pub fn flaky(id: &str, regions: &[&str], plan: FlakyPlan) -> Arc<Self> {
        Self::new(
            id,
            regions,
            Behavior::Flaky { remaining: plan.failures_before_success, error: plan.error },
        )
    }

    pub fn corrupting(id: &str, regions: &[&str]) -> Arc<Self> {
        Self::new(id, regions, Behavior::Corrupting)
    }

    /// Number of distinct content addresses pinned.
    pub fn pinned_count(&self) -> usize {
        self.pinned.lock().len()
    }

    pub fn is_pinned(&self, cid: &ContentAddress) -> bool {
        self.pinned.lock().contains_key(cid)
    }

    pub fn unpinned(&self) -> Vec<ContentAddress> {
        self.unpinned.lock().clone()
    }
}

#[async_trait]
impl PinningService for MockPinningService {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn upload(
        &self,
        artifact: &[u8],
        meta: UploadMetadata,
    ) -> Result<ReplicaDescriptor, ProviderError> {
        {
            let mut behavior = self.behavior.lock();
            match &mut *behavior {
                Behavior::Healthy => {}
                Behavior::Failing(error) => return Err(error.clone()),
                Behavior::Flaky { remaining, error } => {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(error.clone());
                    }
                }
                Behavior::Corrupting => {
                    return Ok(ReplicaDescriptor {
                        provider_id: self.metadata.id.clone(),
                        region: meta.region,
                        content_address: ContentAddress::for_bytes(b"corrupted"),
                        bytes: artifact.len(),
                    });
                }
            }
        }
        let cid = ContentAddress::for_bytes(artifact);
        self.pinned.lock().insert(cid.clone(), artifact.len());
        Ok(ReplicaDescriptor {
            provider_id: self.metadata.id.clone(),
            region: meta.region,
            content_address: cid,
            bytes: artifact.len(),
        })
    }

    async fn status(&self, content_address: &ContentAddress) -> Result<PinStatus, ProviderError> {
        let pinned = self.pinned.lock().contains_key(content_address);
        Ok(PinStatus {
            pinned,
            replicas: if pinned { 1 } else { 0 },
            last_seen: pinned.then(Utc::now),
        })
    }

    async fn healthcheck(&self) -> bool {
        !matches!(&*self.behavior.lock(), Behavior::Failing(_))
    }

    async fn unpin(&self, content_address: &ContentAddress) -> Result<(), ProviderError> {
        self.pinned.lock().remove(content_address);
        self.unpinned.lock().push(content_address.clone());
        Ok(())
    }
}

/// Scriptable in-memory gateway fabric shared by every gateway URL: content
/// is global, failures are per-gateway.
pub struct MockGatewayClient {
    content: Mutex<BTreeMap<ContentAddress, Vec<u8>>>,
    dead: Mutex<BTreeSet<String>>,
    /// Per-gateway count of probes/fetches to fail before recovering.
    fail_next: Mutex<BTreeMap<String, u32>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockGatewayClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            content: Mutex::new(BTreeMap::new()),
            dead: Mutex::new(BTreeSet::new()),
            fail_next: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn insert(&self, bytes: &[u8]) -> ContentAddress {
        let cid = ContentAddress::for_bytes(bytes);
        self.content.lock().insert(cid.clone(), bytes.to_vec());
        cid
    }

    /// Make every request to this gateway URL fail until revived.
    pub fn kill(&self, gateway_url: &str) {
        self.dead.lock().insert(gateway_url.to_string());
    }

    pub fn revive(&self, gateway_url: &str) {
        self.dead.lock().remove(gateway_url);
        self.fail_next.lock().remove(gateway_url);
    }

    /// Fail the next `n` requests to this gateway, then recover.
    pub fn fail_next(&self, gateway_url: &str, n: u32) {
        self.fail_next.lock().insert(gateway_url.to_string(), n);
    }

    /// (gateway_url, cid) pairs in request order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    fn check_gateway(&self, gateway_url: &str) -> Result<(), GatewayError> {
        if self.dead.lock().contains(gateway_url) {
            return Err(GatewayError::Timeout);
        }
        let mut fail_next = self.fail_next.lock();
        if let Some(remaining) = fail_next.get_mut(gateway_url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GatewayError::Http(502));
            }
            fail_next.remove(gateway_url);
        }
        Ok(())
    }
}

#[async_trait]
impl GatewayClient for MockGatewayClient {
    async fn probe(&self, gateway_url: &str, cid: &ContentAddress) -> Result<(), GatewayError> {
        self.calls
            .lock()
            .push((gateway_url.to_string(), cid.to_string()));
        self.check_gateway(gateway_url)?;
        if self.content.lock().contains_key(cid) {
            Ok(())
        } else {
            Err(GatewayError::Http(404))
        }
    }

    async fn fetch(
        &self,
        gateway_url: &str,
        cid: &ContentAddress,
    ) -> Result<Vec<u8>, GatewayError> {
        self.calls
            .lock()
            .push((gateway_url.to_string(), cid.to_string()));
        self.check_gateway(gateway_url)?;
        self.content
            .lock()
            .get(cid)
            .cloned()
            .ok_or(GatewayError::Http(404))
    }
}
