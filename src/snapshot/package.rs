//! Snapshot packaging: serialize every country shard's artifacts, content
//! address them, and assemble the manifest.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::index::{write_index_bytes, SpatialIndex};
use crate::merkle::{MerkleProof, SnapshotCommitment};
use crate::shard::CountryShard;
use crate::snapshot::codec;
use crate::types::{CountryCode, DistrictId};

use super::{
    ContentAddress, CountryProvenance, CountrySummary, Manifest, ProvenanceSummary,
    SnapshotBundle, MANIFEST_PATH,
};

/// Everything the packager needs from the pipeline.
pub struct PackageInputs<'a> {
    pub version: &'a str,
    pub created_at: DateTime<Utc>,
    pub shards: &'a BTreeMap<CountryCode, CountryShard>,
    pub indexes: &'a BTreeMap<CountryCode, SpatialIndex>,
    pub commitment: &'a SnapshotCommitment,
    pub provenance: &'a BTreeMap<CountryCode, CountryProvenance>,
    pub summary: ProvenanceSummary,
}

/// Build the content-addressed bundle. Pure function of its inputs apart
/// from `created_at`, which lands only in the manifest.
pub fn package(inputs: PackageInputs<'_>) -> Result<SnapshotBundle> {
    let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut per_country = BTreeMap::new();

    for (country, shard) in inputs.shards {
        if shard.is_empty() {
            continue;
        }
        let base = format!("country/{country}");
        let commitment = inputs
            .commitment
            .countries
            .get(country)
            .with_context(|| format!("no commitment for {country}"))?;
        let index = inputs
            .indexes
            .get(country)
            .with_context(|| format!("no spatial index for {country}"))?;

        let district_refs: Vec<_> = shard.districts.iter().collect();
        let districts_bytes = codec::write_districts_bytes(&district_refs)?;
        let index_bytes = write_index_bytes(index)?;
        let merkle_bytes = codec::write_merkle_bytes(&commitment.tree)?;

        let country_proofs: BTreeMap<DistrictId, MerkleProof> = commitment
            .district_ids
            .iter()
            .map(|id| {
                inputs
                    .commitment
                    .proofs
                    .get(id)
                    .cloned()
                    .map(|proof| (*id, proof))
                    .with_context(|| format!("missing proof for {id}"))
            })
            .collect::<Result<_>>()?;
        let proofs_bytes = codec::write_proofs_bytes(&country_proofs)?;

        let provenance = inputs.provenance.get(country).cloned().unwrap_or_default();
        let provenance_bytes = serde_json::to_vec_pretty(&provenance)
            .context("failed to serialize country provenance")?;

        let artifacts = [
            (format!("{base}/districts.bin"), districts_bytes),
            (format!("{base}/index.rtree"), index_bytes),
            (format!("{base}/merkle.bin"), merkle_bytes),
            (format!("{base}/proofs.bin"), proofs_bytes),
            (format!("{base}/provenance.json"), provenance_bytes),
        ];

        // Bundle cid: hash over the sorted (path, cid) pairs of the
        // country's artifacts.
        let mut bundle_lines = String::new();
        let mut bundle_bytes = 0usize;
        for (path, bytes) in &artifacts {
            bundle_lines.push_str(path);
            bundle_lines.push(':');
            bundle_lines.push_str(ContentAddress::for_bytes(bytes).as_str());
            bundle_lines.push('\n');
            bundle_bytes += bytes.len();
        }
        per_country.insert(
            country.to_string(),
            CountrySummary {
                cid: ContentAddress::for_bytes(bundle_lines.as_bytes()),
                district_count: shard.len(),
                bytes: bundle_bytes,
            },
        );
        files.extend(artifacts);
    }

    let countries: Vec<CountryCode> = inputs.commitment.countries.keys().copied().collect();
    let global_bytes =
        codec::write_global_index_bytes(&countries, &inputs.commitment.global_tree)?;
    let index_cid = ContentAddress::for_bytes(&global_bytes);
    files.insert("global_index.bin".into(), global_bytes);

    let file_cids: BTreeMap<String, ContentAddress> = files
        .iter()
        .map(|(path, bytes)| (path.clone(), ContentAddress::for_bytes(bytes)))
        .collect();

    let manifest = Manifest {
        version: inputs.version.to_string(),
        global_root: hex::encode(inputs.commitment.global_root),
        created_at: inputs.created_at,
        per_country,
        index_cid,
        files: file_cids,
        provenance_summary: inputs.summary,
    };
    let manifest_bytes =
        serde_json::to_vec_pretty(&manifest).context("failed to serialize manifest")?;
    let manifest_cid = ContentAddress::for_bytes(&manifest_bytes);
    files.insert(MANIFEST_PATH.into(), manifest_bytes);

    Ok(SnapshotBundle { manifest, manifest_cid, files })
}
