//! Shared fixtures for integration tests: the 24W CCTV power supply profile
//! and measurement helpers.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use diagnostic_engine::{DiagnosticEngine, EngineConfig, EquipmentProfile, Measurement};

pub const PSU_ID: &str = "cctv-psu-24w-v1";

/// The CCTV power supply profile, parsed from the JSON fixture.
pub fn psu_profile() -> EquipmentProfile {
    serde_json::from_str(include_str!("../fixtures/cctv_psu_24w.json")).expect("fixture profile must parse")
}

/// Engine with default policy and the PSU registered.
pub fn psu_engine() -> DiagnosticEngine {
    DiagnosticEngine::new(EngineConfig::default()).with_profile(psu_profile())
}

/// Fixed base time so results are reproducible.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
}

/// Volt reading `offset_secs` after the base time.
pub fn volts(signal_id: &str, value: f64, offset_secs: i64) -> Measurement {
    Measurement::new(signal_id, value, "V", base_time() + Duration::seconds(offset_secs))
}

/// Mains present, bulk DC collapsed, no output.
pub fn no_output_batch() -> Vec<Measurement> {
    vec![
        volts("ac_input", 231.0, 0),
        volts("bridge_output", 18.5, 1),
        volts("output_12v", 0.0, 2),
    ]
}

/// Output rail above its upper limit.
pub fn overvoltage_batch() -> Vec<Measurement> {
    vec![volts("output_12v", 13.4, 0)]
}
