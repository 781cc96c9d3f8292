//! diagnose - run the diagnostic reasoning engine from the command line
//!
//! # Usage
//!
//! ```bash
//! diagnose --profile cctv_psu_24w.json --measurements readings.json --instance cam-01
//!
//! # Follow-up after carrying out the first recovery step
//! diagnose --profile cctv_psu_24w.json --measurements readings.json \
//!     --instance cam-01 --completed-step check_fuse
//! ```
//!
//! # Environment Variables
//!
//! - `DIAG_ENGINE_CONFIG`: Path to engine policy TOML (default: ./engine_config.toml)
//! - `RUST_LOG`: Logging level (default: info)
//!
//! The result is printed to stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::info;

use diagnostic_engine::config::{self, EngineConfig};
use diagnostic_engine::{DiagnosisRequest, DiagnosticEngine, EquipmentProfile, Measurement};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "diagnose")]
#[command(about = "Diagnose equipment faults from calibrated measurements")]
#[command(version)]
struct CliArgs {
    /// Equipment profile (JSON)
    #[arg(long, value_name = "PATH")]
    profile: PathBuf,

    /// Measurement batch (JSON array of {signal_id, value, unit, timestamp})
    #[arg(long, value_name = "PATH")]
    measurements: PathBuf,

    /// Equipment instance id, reported in the result context
    #[arg(long, value_name = "ID")]
    instance: Option<String>,

    /// Recovery step already carried out (repeatable)
    #[arg(long = "completed-step", value_name = "STEP_ID")]
    completed_steps: Vec<String>,

    /// Engine policy TOML, overriding the default search order
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Timestamp for the result (RFC 3339); defaults to the latest measurement
    #[arg(long, value_name = "RFC3339")]
    at: Option<DateTime<Utc>>,

    /// Single-line JSON output
    #[arg(long)]
    compact: bool,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {what} from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {what} from {}", path.display()))
}

fn main() -> Result<()> {
    // Logs on stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let engine_config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading engine config from {}", path.display()))?,
        None => EngineConfig::load(),
    };
    config::init(engine_config);

    let profile: EquipmentProfile = read_json(&args.profile, "equipment profile")?;
    let measurements: Vec<Measurement> = read_json(&args.measurements, "measurements")?;
    info!(
        equipment = %profile.equipment_id(),
        measurements = measurements.len(),
        "Inputs loaded"
    );

    let mut request = DiagnosisRequest::new(profile.equipment_id(), measurements)
        .with_completed_steps(args.completed_steps);
    if let Some(instance) = args.instance {
        request = request.with_instance(instance);
    }
    if let Some(at) = args.at {
        request = request.requested_at(at);
    }

    let engine = DiagnosticEngine::new(config::get().clone()).with_profile(profile);
    let result = engine.diagnose(&request).context("diagnosis rejected")?;

    let output = if args.compact {
        serde_json::to_string(&result)
    } else {
        serde_json::to_string_pretty(&result)
    }
    .context("serializing diagnosis result")?;
    println!("{output}");

    Ok(())
}
