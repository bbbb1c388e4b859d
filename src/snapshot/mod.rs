//! Snapshot artifacts: content addressing, the manifest, the packaged
//! bundle, and snapshot validation.
//!
//! A snapshot is immutable: the packager assembles every artifact in memory,
//! content-addresses each, and only then writes the tree to disk through a
//! staging directory and an atomic rename. The manifest's own content
//! address is the single pointer clients need.

mod codec;
mod package;
mod report;
mod store;

pub use codec::{
    read_districts_bytes, read_global_index_bytes, read_merkle_bytes, read_proofs_bytes,
    DistrictRecord,
};
pub use package::{package, PackageInputs};
pub use report::{
    CountryProvenance, DatasetReport, DistrictProvenance, ProvenanceSummary, RunReport,
};
pub use store::{ArtifactSink, ArtifactSource, DiskStore, MemStore};

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::district::NormalizedDistrict;
use crate::merkle::{country_index_leaf, district_leaf, fold, MerkleProof};

/// Self-describing content address: `sha256-<hex>` over the artifact bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self(format!("sha256-{}", hex::encode(Sha256::digest(bytes))))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let hex_part = s
            .strip_prefix("sha256-")
            .with_context(|| format!("unsupported content address: {s}"))?;
        anyhow::ensure!(
            hex_part.len() == 64 && hex_part.chars().all(|c| c.is_ascii_hexdigit()),
            "malformed content address: {s}"
        );
        Ok(Self(s.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the bytes hash to this address.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::for_bytes(bytes) == *self
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-country summary row in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountrySummary {
    pub cid: ContentAddress,
    pub district_count: usize,
    pub bytes: usize,
}

/// Snapshot manifest; the outward contract of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Calendar-quarter tag, e.g. "2026Q3".
    pub version: String,
    /// Hex keccak-256 global root.
    pub global_root: String,
    pub created_at: DateTime<Utc>,
    pub per_country: BTreeMap<String, CountrySummary>,
    /// Content address of `global_index.bin`.
    pub index_cid: ContentAddress,
    /// Content address per artifact path.
    pub files: BTreeMap<String, ContentAddress>,
    pub provenance_summary: ProvenanceSummary,
}

pub const MANIFEST_PATH: &str = "manifest.json";

/// A fully packaged, content-addressed snapshot held in memory.
#[derive(Debug, Clone)]
pub struct SnapshotBundle {
    pub manifest: Manifest,
    /// Content address of the serialized manifest itself.
    pub manifest_cid: ContentAddress,
    /// Every artifact including `manifest.json`, keyed by relative path.
    pub files: BTreeMap<String, Vec<u8>>,
}

impl SnapshotBundle {
    /// Total artifact bytes.
    pub fn total_bytes(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Write the bundle under `dir` with all-or-nothing visibility: stage
    /// into a temporary sibling, then atomically rename into place.
    pub fn write_to_dir(&self, dir: &Path) -> Result<()> {
        anyhow::ensure!(!dir.exists(), "snapshot path already exists: {}", dir.display());
        let parent = dir
            .parent()
            .with_context(|| format!("snapshot path has no parent: {}", dir.display()))?;
        std::fs::create_dir_all(parent)?;

        let staging = tempfile::Builder::new()
            .prefix(".snapshot-staging-")
            .tempdir_in(parent)
            .context("failed to create staging directory")?;
        {
            let mut store = DiskStore::new(staging.path());
            for (rel, bytes) in &self.files {
                store.put(rel, bytes)?;
            }
        }
        let staged = staging.keep();
        std::fs::rename(&staged, dir)
            .with_context(|| format!("failed to finalize snapshot at {}", dir.display()))?;
        Ok(())
    }
}

/// Validation result counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotValidation {
    pub artifacts_checked: usize,
    pub countries: usize,
    pub districts: usize,
    pub proofs_verified: usize,
}

/// Re-check a written snapshot: every artifact hash against the manifest,
/// the index/leaf set equality per country, and every proof against the
/// global root.
pub fn validate_snapshot(src: &dyn ArtifactSource) -> Result<SnapshotValidation> {
    let manifest_bytes = src.get(MANIFEST_PATH).context("failed to read manifest.json")?;
    let manifest: Manifest =
        serde_json::from_slice(&manifest_bytes).context("failed to parse manifest.json")?;

    let mut validation = SnapshotValidation::default();

    // Artifact hashes.
    for (rel, cid) in &manifest.files {
        let bytes = src.get(rel).with_context(|| format!("missing artifact: {rel}"))?;
        anyhow::ensure!(cid.matches(&bytes), "content address mismatch for {rel}");
        validation.artifacts_checked += 1;
    }

    // Global tree.
    let (countries, global_levels) =
        read_global_index_bytes(&src.get("global_index.bin").context("missing global_index.bin")?)?;
    let global_root_hex = hex::encode(
        global_levels
            .last()
            .and_then(|level| level.first())
            .context("global index tree is empty")?,
    );
    anyhow::ensure!(
        global_root_hex == manifest.global_root,
        "global root mismatch between manifest and global_index.bin"
    );
    let global_root: [u8; 32] = global_levels.last().unwrap()[0];

    // Per-country checks.
    anyhow::ensure!(
        countries.len() == manifest.per_country.len(),
        "country set mismatch between manifest and global index"
    );
    for (position, country) in countries.iter().enumerate() {
        let base = format!("country/{country}");
        let index = crate::index::read_index_bytes(
            &src.get(&format!("{base}/index.rtree"))
                .with_context(|| format!("missing index for {country}"))?,
        )?;
        let merkle_levels = read_merkle_bytes(
            &src.get(&format!("{base}/merkle.bin"))
                .with_context(|| format!("missing merkle tree for {country}"))?,
        )?;
        let leaves = merkle_levels.first().context("country tree has no leaves")?;

        // The spatial index's district set must equal the tree's leaf set.
        anyhow::ensure!(
            leaves.len() == index.len(),
            "leaf/index cardinality mismatch for {country}"
        );
        let index_districts: Vec<&NormalizedDistrict> = index.districts().collect();
        for (leaf, district) in leaves.iter().zip(index_districts.iter().copied()) {
            anyhow::ensure!(
                *leaf == district_leaf(district),
                "leaf set diverges from spatial index for {country} at {}",
                district.district_id
            );
        }

        // Country root must be committed by the global tree at this position.
        let country_root = *merkle_levels.last().unwrap().first().unwrap();
        anyhow::ensure!(
            global_levels[0][position] == country_index_leaf(*country, &country_root),
            "global index leaf mismatch for {country}"
        );

        // Every proof verifies against the global root.
        let proofs: BTreeMap<_, MerkleProof> = read_proofs_bytes(
            &src.get(&format!("{base}/proofs.bin"))
                .with_context(|| format!("missing proofs for {country}"))?,
        )?;
        anyhow::ensure!(
            proofs.len() == index.len(),
            "proof count mismatch for {country}"
        );
        for proof in proofs.values() {
            anyhow::ensure!(
                proof.verify_against(&global_root),
                "proof failed verification: {}",
                proof.district_id
            );
            validation.proofs_verified += 1;
        }

        // fold() sanity over the stored levels for the first leaf.
        if let Some(first) = leaves.first() {
            let proof = proofs.values().next().unwrap();
            anyhow::ensure!(
                fold(*first, &proof.country_path) == country_root,
                "stored levels do not fold to the country root for {country}"
            );
        }

        validation.countries += 1;
        validation.districts += index.len();
    }

    Ok(validation)
}
