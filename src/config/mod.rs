//! Engine Configuration Module
//!
//! Diagnostic policy loaded from TOML, replacing hardcoded thresholds with
//! operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `DIAG_ENGINE_CONFIG` environment variable (path to TOML file)
//! 2. `engine_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! The library always takes an `EngineConfig` explicitly. The binary keeps
//! its loaded copy in a process-wide slot:
//!
//! ```ignore
//! config::init(EngineConfig::load());
//! let engine = DiagnosticEngine::new(config::get().clone());
//! ```

mod engine_config;
pub mod defaults;
pub mod validation;

pub use engine_config::*;

use std::sync::OnceLock;

static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize the global engine configuration. Later calls are ignored.
pub fn init(config: EngineConfig) {
    if ENGINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// The global engine configuration, or the built-in defaults when `init()`
/// has not run.
pub fn get() -> &'static EngineConfig {
    ENGINE_CONFIG.get_or_init(|| {
        tracing::warn!("config::get() called before config::init(), using defaults");
        EngineConfig::default()
    })
}

pub fn is_initialized() -> bool {
    ENGINE_CONFIG.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_get_keeps_first_config() {
        let mut custom = EngineConfig::default();
        custom.matching.max_differentials = 2;
        init(custom);
        assert!(is_initialized());

        let mut ignored = EngineConfig::default();
        ignored.matching.max_differentials = 5;
        init(ignored);
        assert_eq!(get().matching.max_differentials, 2);
    }
}
