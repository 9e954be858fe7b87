use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tilefield_common::Dimensions;

/// Largest accepted `range`, in tiles.
pub const MAX_RANGE: u32 = 1 << 16;

/// Errors from building or loading a [`TileConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("tile_size must be positive and finite, got {0}")]
    InvalidTileSize(f32),
    #[error("at least one dimension must be enabled")]
    NoDimensions,
    #[error("range {range} is too large for {dimensions} dimension(s)")]
    RangeTooLarge { range: u32, dimensions: u32 },
    #[error("eviction_ratio must be finite and greater than 1, got {0}")]
    InvalidEvictionRatio(f32),
    #[error("batch_eviction_factor must be positive and finite, got {0}")]
    InvalidBatchEvictionFactor(f32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tile manager configuration.
///
/// Every field has a default, so a JSON file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    /// Edge length of one tile in world units.
    pub tile_size: f32,
    /// Radius, in tiles, of the window kept live around the center.
    pub range: u32,
    /// Axes that take part in tiling.
    pub dimensions: Dimensions,
    /// Grid distance the center must move past before tiles are reshuffled.
    pub threshold: u32,
    /// Minimum time between the starts of two compression passes.
    pub compression_cooldown_ms: u64,
    /// Time after which a compression pass stops starting new groups.
    pub max_compression_time_ms: u64,
    /// Groups with fewer vertices in total are not compressed.
    pub min_vertex_count: usize,
    /// Groups with fewer tiles are not compressed.
    pub min_group_size: usize,
    /// Passes a batch may absorb before a new batch is started for its material.
    pub max_compositions: u32,
    /// Store size over expected size above which inactive tiles are purged.
    pub eviction_ratio: f32,
    /// Batches farther than `batch_eviction_factor * range * tile_size` are dropped.
    pub batch_eviction_factor: f32,
    pub evict_distant_batches: bool,
    /// Run a compression pass at the end of every reposition that moved the center.
    pub compress_on_reposition: bool,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            tile_size: 10.0,
            range: 4,
            dimensions: Dimensions::planar(),
            threshold: 1,
            compression_cooldown_ms: 200,
            max_compression_time_ms: 100,
            min_vertex_count: 30,
            min_group_size: 2,
            max_compositions: 10,
            eviction_ratio: 1.2,
            batch_eviction_factor: 3.0,
            evict_distant_batches: true,
            compress_on_reposition: false,
        }
    }
}

impl TileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tile_size.is_finite() && self.tile_size > 0.0) {
            return Err(ConfigError::InvalidTileSize(self.tile_size));
        }
        if self.dimensions.count() == 0 {
            return Err(ConfigError::NoDimensions);
        }
        if self.range > MAX_RANGE || self.window_tile_count().is_none() {
            return Err(ConfigError::RangeTooLarge {
                range: self.range,
                dimensions: self.dimensions.count(),
            });
        }
        if !(self.eviction_ratio.is_finite() && self.eviction_ratio > 1.0) {
            return Err(ConfigError::InvalidEvictionRatio(self.eviction_ratio));
        }
        if !(self.batch_eviction_factor.is_finite() && self.batch_eviction_factor > 0.0) {
            return Err(ConfigError::InvalidBatchEvictionFactor(
                self.batch_eviction_factor,
            ));
        }
        Ok(())
    }

    /// Tiles in a full window: `(2 * range + 1) ^ dimensions`. `None` on overflow.
    pub fn window_tile_count(&self) -> Option<usize> {
        let side = 2 * u64::from(self.range) + 1;
        let count = side.checked_pow(self.dimensions.count())?;
        usize::try_from(count).ok()
    }

    pub fn compression_cooldown(&self) -> Duration {
        Duration::from_millis(self.compression_cooldown_ms)
    }

    pub fn max_compression_time(&self) -> Duration {
        Duration::from_millis(self.max_compression_time_ms)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }
}
