//! Staged rollout and resolution against the in-memory provider and
//! gateway doubles: publish a real pipeline snapshot, verify phase
//! behaviour, and resolve the manifest back out.

use std::collections::HashMap;
use std::sync::Arc;

use boundmark::config::{PipelineConfig, ReplicationConfig, RolloutConfig, RolloutPhase, ResolverConfig};
use boundmark::error::RunError;
use boundmark::event::EventLog;
use boundmark::gateway::Gateway;
use boundmark::pipeline::Pipeline;
use boundmark::provenance::{AcquisitionMethod, ProvenanceRecord};
use boundmark::raw::RawDataset;
use boundmark::reference::ReferenceData;
use boundmark::replicate::{PinningService, ProviderError, ReplicationService};
use boundmark::resolve::FallbackResolver;
use boundmark::rollout::{ActivePointer, CancelFlag, MemPointer, RolloutCoordinator, RolloutState};
use boundmark::snapshot::{ContentAddress, SnapshotBundle};
use boundmark::testing::{MockGatewayClient, MockPinningService};
use boundmark::types::{AuthorityTier, JurisdictionPath};
use chrono::{TimeZone, Utc};
use parking_lot::RwLock;
use serde_json::json;

fn build_bundle() -> SnapshotBundle {
    let provenance = ProvenanceRecord {
        source_url: "https://gis.example.gov/honolulu/query".into(),
        authority_tier: AuthorityTier::Municipal,
        jurisdiction: JurisdictionPath::parse("US/HI/honolulu").unwrap(),
        observation_timestamp: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        acquisition_method: AcquisitionMethod::RestQuery,
        response_hash: "r1".into(),
        http_status: 200,
        declared_feature_count: Some(9),
        declared_geometry_type: Some("Polygon".into()),
        declared_crs: Some("EPSG:4326".into()),
        quality_flags: Vec::new(),
    };
    let features: Vec<_> = (0..9)
        .map(|i| {
            let cx = -158.20 + 0.06 * i as f64;
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [cx - 0.02, 21.38], [cx + 0.02, 21.38],
                        [cx + 0.02, 21.42], [cx - 0.02, 21.42],
                        [cx - 0.02, 21.38]
                    ]]
                },
                "properties": { "name": format!("District {}", i + 1) }
            })
        })
        .collect();
    let collection = json!({ "type": "FeatureCollection", "features": features });
    let (dataset, _) = RawDataset::from_feature_collection(
        "Honolulu City Council Districts",
        &collection,
        provenance,
    )
    .unwrap();

    let config = PipelineConfig { snapshot_version: "2026Q3".into(), ..PipelineConfig::default() };
    let refs = ReferenceData::load().unwrap();
    let events = EventLog::new();
    Pipeline::new(&config, &refs, &events)
        .run(vec![dataset])
        .unwrap()
        .bundle
        .expect("snapshot produced")
}

fn three_phase_config() -> RolloutConfig {
    let phase = |region: &str| RolloutPhase {
        regions: vec![region.to_string()],
        delay_secs: 0,
        min_success_ratio: 0.8,
    };
    RolloutConfig {
        phases: vec![phase("americas"), phase("europe"), phase("asia_pacific")],
        verification_sample_size: 2,
        rollback_enabled: true,
    }
}

fn gateways() -> Vec<Gateway> {
    let gw = |url: &str, region: &str| Gateway {
        url: url.to_string(),
        region: region.to_string(),
        pinning_service_id: None,
    };
    vec![
        gw("https://am-1", "americas"),
        gw("https://am-2", "americas"),
        gw("https://eu-1", "europe"),
        gw("https://eu-2", "europe"),
        gw("https://ap-1", "asia_pacific"),
        gw("https://ap-2", "asia_pacific"),
        gw("https://global-1", "global"),
    ]
}

fn replication(providers: Vec<Arc<dyn PinningService>>) -> ReplicationService {
    ReplicationService::new(
        ReplicationConfig { retry_base_delay_ms: 1, ..ReplicationConfig::default() },
        providers,
    )
}

fn seed(client: &MockGatewayClient, bundle: &SnapshotBundle) {
    for bytes in bundle.files.values() {
        client.insert(bytes);
    }
}

#[tokio::test]
async fn full_rollout_publishes_and_resolves() {
    let bundle = build_bundle();
    let client = MockGatewayClient::new();
    seed(&client, &bundle);

    let all_regions = ["americas", "europe", "asia_pacific"];
    let providers: Vec<Arc<dyn PinningService>> = vec![
        MockPinningService::healthy("pin-a", &all_regions),
        MockPinningService::healthy("pin-b", &all_regions),
        MockPinningService::healthy("pin-c", &all_regions),
    ];
    let service = replication(providers);
    let pointer = MemPointer::new();
    let config = three_phase_config();
    let gateways = gateways();
    let coordinator = RolloutCoordinator::new(
        &config,
        &service,
        &gateways,
        Arc::clone(&client) as Arc<dyn boundmark::gateway::GatewayClient>,
        &pointer,
    );

    let report = coordinator.execute(&bundle, &CancelFlag::new()).await.unwrap();
    assert_eq!(report.state, RolloutState::Completed);
    assert_eq!(report.phases.len(), 3);
    assert!(report.phases.iter().all(|p| p.passed));
    assert_eq!(pointer.get().unwrap(), Some(bundle.manifest_cid.clone()));

    // A client in Europe resolves the manifest the pointer references.
    let refs = Arc::new(ReferenceData::load().unwrap());
    let board = Arc::new(RwLock::new(HashMap::new()));
    let resolver = FallbackResolver::new(
        ResolverConfig { backoff_base_ms: 1, ..ResolverConfig::default() },
        refs,
        gateways.clone(),
        Arc::clone(&client) as Arc<dyn boundmark::gateway::GatewayClient>,
        board,
    );
    let active = pointer.get().unwrap().unwrap();
    let resolved = resolver.resolve(&active, "europe").await.unwrap();
    assert!(resolved.gateway_used.starts_with("https://eu-"));
    assert_eq!(
        ContentAddress::for_bytes(&resolved.bytes),
        bundle.manifest_cid
    );
}

#[tokio::test]
async fn phase_two_provider_failures_below_quorum_roll_back() {
    let bundle = build_bundle();
    let client = MockGatewayClient::new();
    seed(&client, &bundle);

    // Europe has one healthy provider and one that times out: quorum of 2
    // cannot be met in phase 2.
    let providers: Vec<Arc<dyn PinningService>> = vec![
        MockPinningService::healthy("pin-a", &["americas", "asia_pacific", "europe"]),
        MockPinningService::failing("pin-b", &["europe"], ProviderError::Timeout),
        MockPinningService::healthy("pin-c", &["americas", "asia_pacific"]),
    ];
    let service = replication(providers);
    let previous = ContentAddress::for_bytes(b"2026Q2-manifest");
    let pointer = MemPointer::with_value(previous.clone());
    let config = three_phase_config();
    let gateways = gateways();
    let coordinator = RolloutCoordinator::new(
        &config,
        &service,
        &gateways,
        Arc::clone(&client) as Arc<dyn boundmark::gateway::GatewayClient>,
        &pointer,
    );

    let error = coordinator.execute(&bundle, &CancelFlag::new()).await.unwrap_err();
    assert!(matches!(error, RunError::RolledBack(_)));
    assert_eq!(error.exit_code(), 5);
    // The active manifest pointer equals its pre-rollout value.
    assert_eq!(pointer.get().unwrap(), Some(previous));
}
