//! Runtime configuration.
//!
//! Sections mirror the tunable components: the buffer's lookahead, the
//! sink's chunk size, the cache's staleness threshold. Everything has a
//! default, so a config file only needs the values it changes.

use crate::error::{MediaBusError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub buffer: BufferConfig,
    pub sink: SinkConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| MediaBusError::Config(e.to_string()))
    }
}

/// MediaBuffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Number of media packets held ahead of the consumer.
    pub lookahead: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            lookahead: crate::bus::nodes::buffer::DEFAULT_LOOKAHEAD,
        }
    }
}

/// MediaSink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Bytes read from input and written to output at a time.
    pub chunk_size: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::bus::nodes::sink::DEFAULT_CHUNK_SIZE,
        }
    }
}

/// DbCache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds before the snapshot is considered stale.
    pub staleness_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            staleness_secs: crate::collection::cache::DEFAULT_STALENESS.as_secs(),
        }
    }
}
