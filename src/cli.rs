use std::path::PathBuf;

/// Boundary commitment CLI (argument schema only)
#[derive(clap::Parser, Debug)]
#[command(name = "boundmark", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run the offline pipeline over a directory of raw dataset files
    Run(RunArgs),

    /// Re-verify a written snapshot: artifact hashes, index/leaf equality,
    /// and every Merkle proof
    Verify(VerifyArgs),

    /// Point-in-polygon lookup against a written snapshot's spatial index
    Query(QueryArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Directory of raw dataset JSON files (one dataset per file)
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub input: PathBuf,

    /// Output directory; the snapshot lands at <out>/<version>
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub out: PathBuf,

    /// Pipeline configuration file (JSON); defaults apply when omitted
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Snapshot version tag, e.g. 2026Q3 (overrides the config value)
    #[arg(long)]
    pub version: Option<String>,

    /// Write the run report as JSON next to the snapshot
    #[arg(long)]
    pub report: bool,
}

#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    /// Snapshot directory containing manifest.json
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub snapshot: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct QueryArgs {
    /// Snapshot directory containing manifest.json
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub snapshot: PathBuf,

    /// ISO 3166-1 alpha-2 country code of the shard to search
    pub country: String,

    /// Longitude in degrees
    pub lon: f64,

    /// Latitude in degrees
    pub lat: f64,
}
