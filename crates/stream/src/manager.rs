use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;
use tilefield_assets::Geometry;
use tilefield_common::{Dimensions, GridCoord, grid_to_world, to_grid};
use tilefield_render::{RenderError, RenderGraph};

use crate::compress::{CompressReport, CompressionBatch, CompressionEngine, CompressionSettings};
use crate::config::{ConfigError, TileConfig};
use crate::hooks::{DefaultTileHooks, TileHooks};
use crate::iter::GridRange;
use crate::store::{Tile, TileStore};
use crate::timing::PassTimer;

/// Errors from [`TileManager`] operations.
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("invalid center {0}: every component must be finite")]
    InvalidCenter(Vec3),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

/// Where the window is anchored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CenterState {
    /// No reposition yet, or reset since.
    #[default]
    Uninitialized,
    Tracking { center: GridCoord },
}

impl CenterState {
    pub fn center(&self) -> Option<GridCoord> {
        match self {
            CenterState::Uninitialized => None,
            CenterState::Tracking { center } => Some(*center),
        }
    }
}

/// What one reposition did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositionStats {
    pub center: GridCoord,
    /// The center moved and the window was rebuilt.
    pub moved: bool,
    /// Grid distance between the requested and the previous center.
    pub distance: u64,
    pub created: usize,
    pub reactivated: usize,
    pub deactivated: usize,
    pub detached: usize,
    /// Inactive tiles dropped by the compactor.
    pub evicted: usize,
    pub batches_evicted: usize,
    pub compressed: usize,
    pub elapsed: Duration,
}

/// Keeps a window of tiles alive around a moving center.
///
/// Tiles leaving the window are deactivated and detached but kept, so moving
/// back reuses them. When the store grows past `eviction_ratio` times the
/// window size, inactive tiles are destroyed.
///
/// The manager owns tile state; the [`RenderGraph`] passed to each call owns
/// the nodes.
#[derive(Debug)]
pub struct TileManager<H: TileHooks = DefaultTileHooks> {
    config: TileConfig,
    hooks: H,
    store: TileStore,
    state: CenterState,
    compression: CompressionEngine,
    cube: Option<Arc<Geometry>>,
    stats: RepositionStats,
    timer: PassTimer,
}

impl TileManager<DefaultTileHooks> {
    pub fn new(config: TileConfig) -> Result<Self, ConfigError> {
        Self::with_hooks(config, DefaultTileHooks)
    }
}

impl<H: TileHooks> TileManager<H> {
    pub fn with_hooks(config: TileConfig, hooks: H) -> Result<Self, ConfigError> {
        config.validate()?;
        let compression = CompressionEngine::new(CompressionSettings::from(&config));
        Ok(Self {
            config,
            hooks,
            store: TileStore::new(),
            state: CenterState::Uninitialized,
            compression,
            cube: None,
            stats: RepositionStats::default(),
            timer: PassTimer::default(),
        })
    }

    pub fn config(&self) -> &TileConfig {
        &self.config
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn store(&self) -> &TileStore {
        &self.store
    }

    pub fn state(&self) -> CenterState {
        self.state
    }

    pub fn center(&self) -> Option<GridCoord> {
        self.state.center()
    }

    pub fn is_initialized(&self) -> bool {
        self.state != CenterState::Uninitialized
    }

    /// Stats from the last [`reposition`](Self::reposition).
    pub fn stats(&self) -> &RepositionStats {
        &self.stats
    }

    /// Durations of recent repositions.
    pub fn timer(&self) -> &PassTimer {
        &self.timer
    }

    pub fn compression(&self) -> &CompressionEngine {
        &self.compression
    }

    pub fn batches(&self) -> &[CompressionBatch] {
        self.compression.batches()
    }

    pub fn tile(&self, coord: GridCoord) -> Option<&Tile> {
        self.store.find(coord)
    }

    pub fn active_tiles(&self) -> Vec<&Tile> {
        self.store.active_tiles()
    }

    pub fn inactive_tiles(&self) -> Vec<&Tile> {
        self.store.inactive_tiles()
    }

    pub fn uncompressed_tiles(&self) -> Vec<&Tile> {
        self.store.uncompressed_tiles()
    }

    /// Tiles in a full window for the current range and dimensions.
    pub fn expected_tile_count(&self) -> usize {
        // validated on every config change, so this never saturates in practice
        self.config.window_tile_count().unwrap_or(usize::MAX)
    }

    /// Change the window radius. Takes effect on the next center change.
    pub fn set_range(&mut self, range: u32) -> Result<(), ConfigError> {
        self.update_config(TileConfig {
            range,
            ..self.config.clone()
        })
    }

    /// Change the tiled axes. Takes effect on the next center change.
    pub fn set_dimensions(&mut self, dimensions: Dimensions) -> Result<(), ConfigError> {
        self.update_config(TileConfig {
            dimensions,
            ..self.config.clone()
        })
    }

    pub fn set_threshold(&mut self, threshold: u32) {
        self.config.threshold = threshold;
    }

    fn update_config(&mut self, config: TileConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.compression
            .set_settings(CompressionSettings::from(&config));
        self.config = config;
        Ok(())
    }

    /// Move the window to the tile containing `point`.
    ///
    /// The first call builds the whole window. Later calls do nothing until
    /// the grid distance to the current center exceeds `threshold`.
    pub fn reposition<R: RenderGraph + ?Sized>(
        &mut self,
        point: Vec3,
        graph: &mut R,
    ) -> Result<RepositionStats, TileError> {
        if !point.is_finite() {
            return Err(TileError::InvalidCenter(point));
        }
        let coord = to_grid(point, self.config.tile_size, self.config.dimensions);
        self.recenter(coord, graph)
    }

    /// Like [`reposition`](Self::reposition) with a grid coordinate.
    /// Components on disabled axes are ignored.
    pub fn recenter<R: RenderGraph + ?Sized>(
        &mut self,
        coord: GridCoord,
        graph: &mut R,
    ) -> Result<RepositionStats, TileError> {
        let _span = tracing::info_span!("reposition", %coord).entered();
        let start = Instant::now();
        let coord = self.mask(coord);

        let mut stats = match self.state {
            CenterState::Uninitialized => self.initialize(coord, graph)?,
            CenterState::Tracking { center } => self.update(center, coord, graph)?,
        };
        if stats.moved && self.config.compress_on_reposition {
            stats.compressed = self.compress(graph).tiles_compressed;
        }

        stats.elapsed = start.elapsed();
        self.timer.record(stats.elapsed);
        tracing::trace!(
            moved = stats.moved,
            created = stats.created,
            reactivated = stats.reactivated,
            deactivated = stats.deactivated,
            total = self.store.len(),
            "reposition complete"
        );
        self.stats = stats.clone();
        Ok(stats)
    }

    fn mask(&self, coord: GridCoord) -> GridCoord {
        let dims = self.config.dimensions;
        GridCoord::new(
            if dims.x { coord.i } else { 0 },
            if dims.y { coord.j } else { 0 },
            if dims.z { coord.k } else { 0 },
        )
    }

    fn initialize<R: RenderGraph + ?Sized>(
        &mut self,
        center: GridCoord,
        graph: &mut R,
    ) -> Result<RepositionStats, TileError> {
        tracing::debug!(%center, "initializing tiles");
        self.state = CenterState::Tracking { center };
        let mut stats = RepositionStats {
            center,
            moved: true,
            ..RepositionStats::default()
        };
        self.fill_window(center, graph, &mut stats)?;
        Ok(stats)
    }

    fn update<R: RenderGraph + ?Sized>(
        &mut self,
        old: GridCoord,
        center: GridCoord,
        graph: &mut R,
    ) -> Result<RepositionStats, TileError> {
        let distance = center.manhattan_distance(&old, self.config.dimensions);
        if distance <= u64::from(self.config.threshold) {
            return Ok(RepositionStats {
                center: old,
                distance,
                ..RepositionStats::default()
            });
        }
        self.state = CenterState::Tracking { center };
        let mut stats = self.on_change_center(graph)?;
        stats.distance = distance;
        Ok(stats)
    }

    /// Rebuild the window around the current center: retire distant tiles
    /// and batches, fill the window, then run the compactor.
    ///
    /// Batch eviction removes member tiles, some of which may still lie in
    /// the window, so it runs before the fill recreates them.
    fn on_change_center<R: RenderGraph + ?Sized>(
        &mut self,
        graph: &mut R,
    ) -> Result<RepositionStats, TileError> {
        let center = self.state.center().unwrap_or_default();
        let mut stats = RepositionStats {
            center,
            moved: true,
            ..RepositionStats::default()
        };
        stats.deactivated = self.deactivate_distant();
        stats.detached = self.detach_inactive(graph);
        if self.config.evict_distant_batches {
            stats.batches_evicted = self.evict_distant_batches(graph);
        }
        self.fill_window(center, graph, &mut stats)?;
        stats.evicted = self.safety_cleanup(graph);
        Ok(stats)
    }

    fn fill_window<R: RenderGraph + ?Sized>(
        &mut self,
        center: GridCoord,
        graph: &mut R,
        stats: &mut RepositionStats,
    ) -> Result<(), TileError> {
        let window = GridRange::around(center, self.config.range, self.config.dimensions);
        for coord in &window {
            if !self.hooks.has_tile(coord) {
                continue;
            }
            match self.store.find(coord).map(|t| t.active) {
                None => {
                    self.create_tile(coord, graph)?;
                    stats.created += 1;
                }
                Some(false) => {
                    self.activate(coord, graph);
                    stats.reactivated += 1;
                }
                Some(true) => {}
            }
        }
        Ok(())
    }

    fn shared_cube(&mut self) -> Arc<Geometry> {
        let size = self.config.tile_size;
        Arc::clone(
            self.cube
                .get_or_insert_with(|| Arc::new(Geometry::cuboid(size, size, size))),
        )
    }

    fn create_tile<R: RenderGraph + ?Sized>(
        &mut self,
        coord: GridCoord,
        graph: &mut R,
    ) -> Result<(), TileError> {
        let size = self.config.tile_size;
        let material = self.hooks.tile_material(coord);
        let geometry = match self.hooks.tile_geometry(coord, size) {
            Some(geometry) => geometry,
            None => self.shared_cube(),
        };
        let position = self.hooks.locate_tile(coord, size);

        let node = graph.create_tile(coord, &material, Arc::clone(&geometry))?;
        graph.set_transform(node, position);
        graph.attach(node);

        let mut tile = Tile::new(coord, node, material, geometry, position);
        tile.attached = true;
        if let Some(old) = self.store.upsert(tile) {
            graph.destroy(old.node);
        }
        Ok(())
    }

    fn activate<R: RenderGraph + ?Sized>(&mut self, coord: GridCoord, graph: &mut R) {
        if let Some(tile) = self.store.find_mut(coord) {
            tile.active = true;
            graph.attach(tile.node);
            graph.set_visible(tile.node, true);
            tile.attached = true;
        }
    }

    /// Mark active tiles outside the window around the current center as
    /// inactive. Compressed tiles are left alone. Returns how many changed.
    pub fn deactivate_distant(&mut self) -> usize {
        let Some(center) = self.state.center() else {
            return 0;
        };
        let range = u64::from(self.config.range);
        let dims = self.config.dimensions;
        let mut changed = 0;
        for tile in self.store.iter_mut() {
            if tile.active
                && !tile.compressed
                && tile.coord.chebyshev_distance(&center, dims) > range
            {
                tile.active = false;
                changed += 1;
            }
        }
        changed
    }

    fn detach_inactive<R: RenderGraph + ?Sized>(&mut self, graph: &mut R) -> usize {
        let mut detached = 0;
        for tile in self.store.iter_mut().filter(|t| !t.active && t.attached) {
            graph.detach(tile.node);
            tile.attached = false;
            detached += 1;
        }
        detached
    }

    /// Destroy every inactive tile once the store holds more than
    /// `eviction_ratio` times the window size. Returns how many were evicted.
    pub fn safety_cleanup<R: RenderGraph + ?Sized>(&mut self, graph: &mut R) -> usize {
        let expected = self.expected_tile_count();
        let ratio = self.store.len() as f64 / expected as f64;
        if ratio <= f64::from(self.config.eviction_ratio) {
            return 0;
        }
        let evicted = self.store.retain(|t| t.active);
        for tile in &evicted {
            graph.destroy(tile.node);
        }
        if !evicted.is_empty() {
            tracing::debug!(
                evicted = evicted.len(),
                remaining = self.store.len(),
                expected,
                "safety cleanup"
            );
        }
        evicted.len()
    }

    /// Merge active tiles into per-material batches. See [`CompressionEngine`].
    pub fn compress<R: RenderGraph + ?Sized>(&mut self, graph: &mut R) -> CompressReport {
        self.compression.compress(&mut self.store, graph)
    }

    /// Drop batches farther than `batch_eviction_factor * range * tile_size`
    /// from the center, together with their tiles.
    pub fn evict_distant_batches<R: RenderGraph + ?Sized>(&mut self, graph: &mut R) -> usize {
        let Some(center) = self.state.center() else {
            return 0;
        };
        let size = self.config.tile_size;
        let limit = self.config.batch_eviction_factor * self.config.range as f32 * size;
        self.compression.evict_distant(
            grid_to_world(center, size),
            limit,
            self.config.dimensions,
            &mut self.store,
            graph,
        )
    }

    /// Destroy every tile and batch and forget the center. Returns how many
    /// tiles were destroyed.
    pub fn reset<R: RenderGraph + ?Sized>(&mut self, graph: &mut R) -> usize {
        let tiles = self.store.clear();
        for tile in &tiles {
            graph.destroy(tile.node);
        }
        let batches = self.compression.clear(graph);
        self.state = CenterState::Uninitialized;
        self.stats = RepositionStats::default();
        self.timer.clear();
        tracing::debug!(tiles = tiles.len(), batches, "tile manager reset");
        tiles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{DEFAULT_TILE_MATERIAL, FnHooks};
    use tilefield_assets::MaterialParams;
    use tilefield_common::Axis;
    use tilefield_render::SceneGraph;

    fn scene() -> SceneGraph {
        let mut scene = SceneGraph::new();
        scene
            .define_material(DEFAULT_TILE_MATERIAL, MaterialParams::new())
            .unwrap();
        scene
    }

    fn manager() -> TileManager {
        TileManager::new(TileConfig::default()).unwrap()
    }

    #[test]
    fn first_reposition_builds_window() {
        let mut scene = scene();
        let mut tiles = manager();
        let stats = tiles.reposition(Vec3::ZERO, &mut scene).unwrap();

        assert!(stats.moved);
        assert_eq!(stats.created, 81);
        assert_eq!(tiles.store().len(), 81);
        assert_eq!(tiles.active_tiles().len(), 81);
        assert_eq!(tiles.center(), Some(GridCoord::ORIGIN));
        assert_eq!(scene.update_pass().tiles, 81);
    }

    #[test]
    fn moving_one_row_swaps_nine_tiles() {
        let mut scene = scene();
        let mut tiles = manager();
        tiles.reposition(Vec3::ZERO, &mut scene).unwrap();

        if let CenterState::Tracking { center } = &mut tiles.state {
            center.k += 1;
        }
        assert_eq!(tiles.deactivate_distant(), 9);
        assert_eq!(tiles.active_tiles().len(), 72);
        assert_eq!(tiles.inactive_tiles().len(), 9);
        assert!(tiles.inactive_tiles().iter().all(|t| t.coord.k == -4));
    }

    #[test]
    fn center_change_fills_new_row() {
        let mut scene = scene();
        let mut tiles = manager();
        tiles.reposition(Vec3::ZERO, &mut scene).unwrap();

        tiles.state = CenterState::Tracking {
            center: GridCoord::new(0, 0, 1),
        };
        let stats = tiles.on_change_center(&mut scene).unwrap();
        assert_eq!(stats.deactivated, 9);
        assert_eq!(stats.detached, 9);
        assert_eq!(stats.created, 9);
        assert_eq!(stats.evicted, 0);
        assert_eq!(tiles.store().len(), 90);
        assert_eq!(tiles.active_tiles().len(), 81);
        for t in tiles.inactive_tiles() {
            assert!(!t.is_attached());
            assert!(!scene.is_attached(t.node));
        }
    }

    #[test]
    fn small_moves_stay_under_threshold() {
        let mut scene = scene();
        let mut tiles = manager();
        tiles.reposition(Vec3::ZERO, &mut scene).unwrap();

        // one tile over is within the default threshold of 1
        let stats = tiles.reposition(Vec3::new(10.0, 0.0, 0.0), &mut scene).unwrap();
        assert!(!stats.moved);
        assert_eq!(stats.distance, 1);
        assert_eq!(tiles.center(), Some(GridCoord::ORIGIN));

        let stats = tiles.reposition(Vec3::new(10.0, 0.0, 10.0), &mut scene).unwrap();
        assert!(stats.moved);
        assert_eq!(stats.distance, 2);
        assert_eq!(tiles.center(), Some(GridCoord::new(1, 0, 1)));
    }

    #[test]
    fn moving_back_reactivates() {
        let mut scene = scene();
        let mut tiles = manager();
        tiles.set_threshold(0);
        tiles.reposition(Vec3::ZERO, &mut scene).unwrap();
        tiles.reposition(Vec3::new(0.0, 0.0, 10.0), &mut scene).unwrap();

        let stats = tiles.reposition(Vec3::ZERO, &mut scene).unwrap();
        assert_eq!(stats.reactivated, 9);
        assert_eq!(stats.created, 0);
        assert_eq!(tiles.active_tiles().len(), 81);
        assert_eq!(tiles.store().len(), 90);
    }

    #[test]
    fn long_jump_triggers_compactor() {
        let mut scene = scene();
        let mut tiles = manager();
        tiles.reposition(Vec3::ZERO, &mut scene).unwrap();

        let stats = tiles
            .reposition(Vec3::new(1000.0, 0.0, 0.0), &mut scene)
            .unwrap();
        assert_eq!(stats.created, 81);
        assert_eq!(stats.evicted, 81);
        assert_eq!(tiles.store().len(), 81);
        assert!(tiles.inactive_tiles().is_empty());
        assert_eq!(scene.node_count(), 81);
    }

    #[test]
    fn has_tile_blocks_creation_and_reactivation() {
        let mut scene = scene();
        let hooks = FnHooks::new().has_tile(|c| c.i % 4 != 0 && c.k % 4 != 0);
        let mut tiles = TileManager::with_hooks(TileConfig::default(), hooks).unwrap();
        tiles.reposition(Vec3::ZERO, &mut scene).unwrap();
        // 9 columns minus those at -4, 0, 4 on each axis
        assert_eq!(tiles.store().len(), 36);
        assert!(tiles.tile(GridCoord::ORIGIN).is_none());
        assert!(tiles.tile(GridCoord::new(1, 0, 1)).is_some());
    }

    #[test]
    fn unknown_material_is_fatal() {
        let mut scene = SceneGraph::new();
        let mut tiles = manager();
        let err = tiles.reposition(Vec3::ZERO, &mut scene).unwrap_err();
        assert!(matches!(err, TileError::Render(_)));
    }

    #[test]
    fn rejects_non_finite_center() {
        let mut scene = scene();
        let mut tiles = manager();
        let err = tiles
            .reposition(Vec3::new(f32::NAN, 0.0, 0.0), &mut scene)
            .unwrap_err();
        assert!(matches!(err, TileError::InvalidCenter(_)));
        assert!(!tiles.is_initialized());
    }

    #[test]
    fn disabled_axes_are_ignored() {
        let mut scene = scene();
        let mut tiles = manager();
        tiles
            .reposition(Vec3::new(0.0, 500.0, 0.0), &mut scene)
            .unwrap();
        assert_eq!(tiles.center(), Some(GridCoord::ORIGIN));
        assert!(tiles.store().iter().all(|t| t.coord.j == 0));

        let stats = tiles.recenter(GridCoord::new(0, 99, 0), &mut scene).unwrap();
        assert!(!stats.moved);
    }

    #[test]
    fn range_and_dimension_changes_apply_on_next_move() {
        let mut scene = scene();
        let mut tiles = manager();
        tiles.set_range(1).unwrap();
        tiles.set_dimensions(Dimensions::only(Axis::X)).unwrap();
        assert_eq!(tiles.expected_tile_count(), 3);
        tiles.reposition(Vec3::ZERO, &mut scene).unwrap();
        assert_eq!(tiles.store().len(), 3);

        assert!(tiles.set_range(u32::MAX).is_err());
        assert_eq!(tiles.config().range, 1);
    }

    #[test]
    fn compress_then_reset() {
        let mut scene = scene();
        let mut tiles = manager();
        tiles.reposition(Vec3::ZERO, &mut scene).unwrap();
        let report = tiles.compress(&mut scene);
        assert_eq!(report.tiles_compressed, 81);
        assert_eq!(tiles.batches().len(), 1);
        assert!(tiles.uncompressed_tiles().is_empty());
        assert_eq!(scene.update_pass().draw_calls, 1);

        assert_eq!(tiles.reset(&mut scene), 81);
        assert!(!tiles.is_initialized());
        assert!(tiles.batches().is_empty());
        assert_eq!(scene.node_count(), 0);
    }

    #[test]
    fn evicted_batch_members_in_window_are_recreated() {
        let mut scene = scene();
        let config = TileConfig {
            threshold: 0,
            compress_on_reposition: true,
            compression_cooldown_ms: 0,
            ..TileConfig::default()
        };
        let mut tiles = TileManager::new(config.clone()).unwrap();

        // one batch absorbs every pass, so its origin trails the center
        let mut evictions = 0;
        for step in 0..12 {
            let point = Vec3::new(step as f32 * 50.0, 0.0, 0.0);
            let stats = tiles.reposition(point, &mut scene).unwrap();
            evictions += stats.batches_evicted;

            let center = tiles.center().unwrap();
            let window = GridRange::around(center, config.range, config.dimensions);
            for coord in &window {
                assert!(tiles.tile(coord).is_some(), "step {step}: hole at {coord}");
            }
        }
        assert!(evictions > 0);
    }

    #[test]
    fn compressed_tiles_are_never_deactivated() {
        let mut scene = scene();
        let mut tiles = manager();
        tiles.reposition(Vec3::ZERO, &mut scene).unwrap();
        tiles.compress(&mut scene);

        tiles.state = CenterState::Tracking {
            center: GridCoord::new(0, 0, 2),
        };
        assert_eq!(tiles.deactivate_distant(), 0);
    }
}
