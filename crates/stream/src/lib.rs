//! Infinite terrain: a window of tiles that follows a moving center.
//!
//! # Invariants
//! - At most one tile per grid coordinate.
//! - Active tiles are attached to the render graph; inactive ones are not.
//! - Compressed tiles stay active until their batch is evicted.
//!
//! [`TileManager`] maps world positions to grid cells, walks the window with a
//! [`GridRange`], and keeps tile state in a [`TileStore`]. Tiles leaving the
//! window are deactivated rather than destroyed; a compactor purges them once
//! the store grows well past the window size. [`CompressionEngine`] merges
//! active tiles of one material into batches under a time budget.

mod compress;
mod config;
mod hooks;
mod iter;
mod manager;
mod store;
mod timing;

pub use compress::{
    CompressError, CompressReport, CompressionBatch, CompressionEngine, CompressionGroup,
    CompressionSettings,
};
pub use config::{ConfigError, MAX_RANGE, TileConfig};
pub use hooks::{DEFAULT_TILE_MATERIAL, DefaultTileHooks, FnHooks, TileHooks};
pub use iter::{Bound, GridIter, GridRange};
pub use manager::{CenterState, RepositionStats, TileError, TileManager};
pub use store::{SideTable, Tile, TileStore};
pub use timing::PassTimer;

pub fn crate_info() -> &'static str {
    "tilefield-stream v0.1.0"
}
