//! Configuration management for the simulation core
//!
//! Loads configuration from sim.toml at startup.
//! All values are configurable to avoid hardcoded constants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Simulation core configuration
///
/// Loaded from sim.toml at startup. Contains the tunable defaults the
/// subsystems fall back to when callers do not pass explicit options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SimConfig {
    /// Buffer pool settings
    #[serde(default)]
    pub buffers: BufferConfig,

    /// Object pool defaults
    #[serde(default)]
    pub pools: PoolConfig,

    /// Event emitter defaults
    #[serde(default)]
    pub emitter: EmitterConfig,
}

/// Buffer pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Number of power-of-two buckets (sizes 32 · 2^i)
    #[serde(default = "default_bucket_count")]
    pub bucket_count: usize,

    /// Slabs preallocated per bucket
    #[serde(default = "default_bucket_capacity")]
    pub bucket_capacity: usize,
}

/// Object pool defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Default initial slot count
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// Default slot ceiling
    #[serde(default = "default_max_capacity")]
    pub max_capacity: usize,

    /// Allocated/total ratio above which expansion is preferred
    #[serde(default = "default_high_watermark")]
    pub high_watermark_ratio: f64,

    /// Allocated/total ratio below which compaction trims free slots
    #[serde(default = "default_low_watermark")]
    pub low_watermark_ratio: f64,
}

/// Event emitter defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmitterConfig {
    /// Soft cap on listeners per event before a warning is logged
    #[serde(default = "default_max_listeners")]
    pub max_listeners: usize,

    /// Total bound on queued events while paused
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Sweep interval for dead weak handlers, in milliseconds
    #[serde(default = "default_gc_interval_ms")]
    pub gc_interval_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            bucket_count: default_bucket_count(),
            bucket_capacity: default_bucket_capacity(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            max_capacity: default_max_capacity(),
            high_watermark_ratio: default_high_watermark(),
            low_watermark_ratio: default_low_watermark(),
        }
    }
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            max_listeners: default_max_listeners(),
            buffer_size: default_buffer_size(),
            gc_interval_ms: default_gc_interval_ms(),
        }
    }
}

fn default_bucket_count() -> usize {
    16 // largest bucket 32 * 2^15 = 1 MiB
}

fn default_bucket_capacity() -> usize {
    32
}

fn default_initial_capacity() -> usize {
    16
}

fn default_max_capacity() -> usize {
    4096
}

fn default_high_watermark() -> f64 {
    0.85
}

fn default_low_watermark() -> f64 {
    0.25
}

fn default_max_listeners() -> usize {
    10
}

fn default_buffer_size() -> usize {
    1000
}

fn default_gc_interval_ms() -> u64 {
    60_000
}

/// Fallback path when `SIM_CONFIG_PATH` is unset
const DEFAULT_CONFIG_PATH: &str = "sim.toml";

impl SimConfig {
    /// Resolve the tunables for this process
    ///
    /// Reads the file named by `SIM_CONFIG_PATH` (or `sim.toml`). An
    /// absent file is not an error: every tunable has a default, so a
    /// bare deployment runs unconfigured.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("SIM_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Resolve tunables from an explicit path
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Unreadable {
                    path: path.to_string(),
                    source,
                })
            }
        };
        toml::from_str(&raw).map_err(|e| ConfigError::Malformed {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Configuration loading errors; both variants name the offending file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file '{path}' is unreadable: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file '{path}' is malformed: {reason}")]
    Malformed { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert_eq!(config.buffers.bucket_count, 16);
        assert_eq!(config.emitter.max_listeners, 10);
        assert_eq!(config.emitter.buffer_size, 1000);
        assert!(config.pools.high_watermark_ratio > config.pools.low_watermark_ratio);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            [emitter]
            buffer_size = 64
        "#;
        let config: SimConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.emitter.buffer_size, 64);
        // Unspecified sections fall back to defaults
        assert_eq!(config.emitter.max_listeners, 10);
        assert_eq!(config.buffers.bucket_capacity, 32);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result: Result<SimConfig, _> = toml::from_str("buffers = 12");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = SimConfig::load_from("definitely/not/here.toml").unwrap();
        assert_eq!(config.buffers.bucket_count, 16);
    }

    #[test]
    fn test_malformed_file_names_the_path() {
        let dir = std::env::temp_dir().join("sim-core-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.toml");
        std::fs::write(&path, "pools = \"not a table\"").unwrap();

        let err = SimConfig::load_from(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
        assert!(err.to_string().contains("broken.toml"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
