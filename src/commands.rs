//! CLI command implementations over the library API.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::cli::{Cli, QueryArgs, RunArgs, VerifyArgs};
use crate::config::PipelineConfig;
use crate::event::EventLog;
use crate::pipeline::Pipeline;
use crate::provenance::ProvenanceRecord;
use crate::raw::RawDataset;
use crate::reference::ReferenceData;
use crate::snapshot::{validate_snapshot, DiskStore};
use crate::types::CountryCode;

/// On-disk form of one raw dataset, as handed over by the acquisition
/// collaborator: title, provenance record, and the feature collection.
#[derive(Deserialize)]
struct RawDatasetFile {
    title: String,
    provenance: ProvenanceRecord,
    collection: serde_json::Value,
}

/// `boundmark run`: offline pipeline over a directory of dataset files.
/// Returns the process exit code.
pub fn run(_cli: &Cli, args: &RunArgs) -> Result<i32> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(version) = &args.version {
        config.snapshot_version = version.clone();
    }
    let refs = ReferenceData::load()?;

    let mut datasets = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(&args.input)
        .with_context(|| format!("failed to read input directory: {}", args.input.display()))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("failed to read dataset: {}", path.display()))?;
        let file: RawDatasetFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse dataset: {}", path.display()))?;
        let (dataset, skipped) =
            RawDataset::from_feature_collection(file.title, &file.collection, file.provenance)?;
        if skipped > 0 {
            info!(path = %path.display(), skipped, "skipped non-polygonal features");
        }
        datasets.push(dataset);
    }

    let events = EventLog::new();
    let pipeline = Pipeline::new(&config, &refs, &events);
    let mut outcome = match pipeline.run(datasets) {
        Ok(outcome) => outcome,
        Err(error) => {
            eprintln!("{error}");
            return Ok(error.exit_code());
        }
    };
    outcome.report.events = events.drain();

    if let Some(bundle) = &outcome.bundle {
        let target = args.out.join(&bundle.manifest.version);
        bundle.write_to_dir(&target)?;
        outcome.report.published = true;
        println!("snapshot written to {}", target.display());
        println!("manifest cid: {}", bundle.manifest_cid);
        println!("global root: {}", bundle.manifest.global_root);
    } else {
        println!("no districts committed; no snapshot produced");
    }

    if args.report {
        std::fs::create_dir_all(&args.out)?;
        let report_path = args.out.join(format!("report-{}.json", config.snapshot_version));
        std::fs::write(&report_path, serde_json::to_vec_pretty(&outcome.report)?)?;
        println!("report written to {}", report_path.display());
    }
    print!("{}", outcome.report.render_text());
    Ok(0)
}

/// `boundmark verify`: re-check a written snapshot end to end.
pub fn verify(_cli: &Cli, args: &VerifyArgs) -> Result<i32> {
    let store = DiskStore::new(&args.snapshot);
    match validate_snapshot(&store) {
        Ok(validation) => {
            println!(
                "ok: {} artifacts, {} countries, {} districts, {} proofs verified",
                validation.artifacts_checked,
                validation.countries,
                validation.districts,
                validation.proofs_verified,
            );
            Ok(0)
        }
        Err(error) => {
            eprintln!("snapshot verification failed: {error:#}");
            Ok(3)
        }
    }
}

/// `boundmark query`: candidate + exact point lookup against one shard.
pub fn query(_cli: &Cli, args: &QueryArgs) -> Result<i32> {
    let country = CountryCode::new(&args.country.to_ascii_uppercase())?;
    let store = DiskStore::new(&args.snapshot);
    use crate::snapshot::ArtifactSource;
    let bytes = store
        .get(&format!("country/{country}/index.rtree"))
        .with_context(|| format!("snapshot has no shard for {country}"))?;
    let index = crate::index::read_index_bytes(&bytes)?;

    let hits = index.locate(args.lon, args.lat);
    if hits.is_empty() {
        println!("no district contains ({}, {})", args.lon, args.lat);
    } else {
        for district in hits {
            println!(
                "{}  {}  {}  [{}]",
                district.district_id,
                district.jurisdiction.canonical(),
                district.local_name,
                district.universal_type.to_str(),
            );
        }
    }
    Ok(0)
}
