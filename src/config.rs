//! Tunables for indexing and filtering.
//!
//! Every knob has a sensible default; loading from a TOML file is available
//! behind the `config` feature.

use crate::error::{LogscanError, Result};
#[cfg(feature = "config")]
use std::path::{Path, PathBuf};

/// Default block size read per scanner iteration (1 MiB)
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Default tab stop used when measuring line lengths
pub const DEFAULT_TAB_WIDTH: u32 = 8;

/// Default size of the header and tail windows used for change detection (64 KiB)
pub const DEFAULT_DIGEST_WINDOW: u64 = 64 * 1024;

/// Default number of lines handed to one filtering shard
pub const DEFAULT_SEARCH_CHUNK_LINES: usize = 5000;

/// Indexing and search configuration.
///
/// The block size trades syscall overhead against peak memory and
/// cancellation latency: an interrupt is honored after at most one block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct IndexingConfig {
    /// Bytes read from the file per block
    pub block_size: usize,

    /// Tab stop for the line length measurement
    pub tab_width: u32,

    /// Bytes at the start of the file covered by the header digest
    pub header_digest_size: u64,

    /// Bytes at the end of the indexed data covered by the tail digest
    pub tail_digest_size: u64,

    /// Lines per filtering shard
    pub search_chunk_lines: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            tab_width: DEFAULT_TAB_WIDTH,
            header_digest_size: DEFAULT_DIGEST_WINDOW,
            tail_digest_size: DEFAULT_DIGEST_WINDOW,
            search_chunk_lines: DEFAULT_SEARCH_CHUNK_LINES,
        }
    }
}

impl IndexingConfig {
    /// Check that the values can drive the scanner and the filter
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(LogscanError::config("block_size must be greater than zero"));
        }
        if self.tab_width == 0 {
            return Err(LogscanError::config("tab_width must be greater than zero"));
        }
        if self.search_chunk_lines == 0 {
            return Err(LogscanError::config(
                "search_chunk_lines must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Parse a configuration from TOML text; missing keys keep their defaults
    #[cfg(feature = "config")]
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| LogscanError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    #[cfg(feature = "config")]
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LogscanError::file_error(format!("Failed to read config: {}", path.display()), e)
        })?;
        Self::from_toml_str(&text)
    }

    /// Location of the per-user configuration file, if the platform has one
    #[cfg(feature = "config")]
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("logscan").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = IndexingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.tab_width, 8);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let config = IndexingConfig {
            block_size: 0,
            ..IndexingConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LogscanError::ConfigError { .. })
        ));
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = IndexingConfig::from_toml_str("tab_width = 4\n").unwrap();
        assert_eq!(config.tab_width, 4);
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_invalid_toml_value_rejected() {
        assert!(IndexingConfig::from_toml_str("block_size = 0\n").is_err());
    }
}
