//! Engine-level tunables.
//!
//! Scoped to this crate's own knobs (parallel executor defaults, whether
//! examples/tests should install a `tracing` subscriber) — not a host
//! configuration loader. Layering follows the teacher's `config.rs`:
//! defaults, then `indigo.toml`, then `INDIGO_*` environment variables.

use crate::rule::ParallelOptions;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default parallel fan-out applied when a rule opts into `parallel`
    /// without specifying `batch_size`/`max_parallel` explicitly.
    #[serde(default)]
    pub default_parallel: Option<ParallelOptions>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration, in the shape of the teacher's `LoggingConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing-subscriber` `EnvFilter` directive, e.g. `"indigo=debug"`.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Emit structured JSON instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: default_filter(),
            json: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_parallel: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, `indigo.toml` (if present), and
    /// `INDIGO_*` environment variables, in that order of precedence.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(
            EngineConfig::default(),
        ))
        .merge(Toml::file("indigo.toml"))
        .merge(Env::prefixed("INDIGO_").split("__"))
        .extract()
    }

    /// Install a global `tracing` subscriber from this configuration.
    /// Intended for examples and integration tests; library code never
    /// installs a subscriber on the host's behalf.
    pub fn init_tracing(&self) {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_new(&self.logging.filter)
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
        if self.logging.json {
            let _ = subscriber.json().try_init();
        } else {
            let _ = subscriber.try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sequential_and_info() {
        let cfg = EngineConfig::default();
        assert!(cfg.default_parallel.is_none());
        assert_eq!(cfg.logging.filter, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn round_trips_through_toml() {
        let mut cfg = EngineConfig::default();
        cfg.default_parallel = Some(ParallelOptions::new(32, 8));
        cfg.logging.json = true;

        let toml_str = toml::to_string(&cfg).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_parallel, cfg.default_parallel);
        assert_eq!(parsed.logging.json, cfg.logging.json);
    }
}
