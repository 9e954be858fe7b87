use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Mat4, Vec3};
use tilefield_assets::{Geometry, GeometryError};
use tilefield_common::{Dimensions, GridCoord, NodeId};
use tilefield_render::{RenderError, RenderGraph};

use crate::config::TileConfig;
use crate::store::TileStore;
use crate::timing::PassTimer;

/// Errors that fail a single group. A pass logs them and moves on.
#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),
    #[error("render error: {0}")]
    Render(#[from] RenderError),
    #[error("tile {0} vanished from the store")]
    MissingTile(GridCoord),
}

/// Knobs for [`CompressionEngine`], taken from [`TileConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionSettings {
    pub cooldown: Duration,
    pub budget: Duration,
    pub min_group_size: usize,
    pub min_vertex_count: usize,
    pub max_compositions: u32,
}

impl From<&TileConfig> for CompressionSettings {
    fn from(config: &TileConfig) -> Self {
        Self {
            cooldown: config.compression_cooldown(),
            budget: config.max_compression_time(),
            min_group_size: config.min_group_size,
            min_vertex_count: config.min_vertex_count,
            max_compositions: config.max_compositions,
        }
    }
}

/// Merged geometry standing in for many tiles of one material.
#[derive(Debug, Clone)]
pub struct CompressionBatch {
    pub node: NodeId,
    pub material: String,
    /// Geometry centered on `origin`.
    pub geometry: Arc<Geometry>,
    /// Compression passes folded into this batch.
    pub composition_count: u32,
    pub origin: Vec3,
    /// Coordinates of every tile merged in.
    pub tiles: Vec<GridCoord>,
    pub created_at: Instant,
}

/// Active, uncompressed tiles sharing a material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionGroup {
    pub material: String,
    pub tiles: Vec<GridCoord>,
    pub vertex_count: usize,
    /// Composition count of the live batch this group would land in.
    pub prior_compositions: u32,
}

impl CompressionGroup {
    /// Lighter groups go first: fewer prior compositions, then fewer vertices.
    pub fn weight(&self) -> (u32, usize) {
        (self.prior_compositions, self.vertex_count)
    }
}

/// Outcome of one [`CompressionEngine::compress`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressReport {
    /// The cooldown had not elapsed; nothing was done.
    pub throttled: bool,
    pub groups_compressed: usize,
    pub tiles_compressed: usize,
    /// Below the size or vertex thresholds.
    pub groups_skipped: usize,
    pub groups_failed: usize,
    /// Left for a later pass because the time budget ran out.
    pub groups_deferred: usize,
    /// The pass took longer than the time budget.
    pub over_budget: bool,
    pub elapsed: Duration,
}

/// Merges uncompressed tiles into per-material batches to cut draw calls.
#[derive(Debug)]
pub struct CompressionEngine {
    settings: CompressionSettings,
    batches: Vec<CompressionBatch>,
    last_run: Option<Instant>,
    timer: PassTimer,
}

impl CompressionEngine {
    pub fn new(settings: CompressionSettings) -> Self {
        let timer = PassTimer::default().with_budget(settings.budget);
        Self {
            settings,
            batches: Vec::new(),
            last_run: None,
            timer,
        }
    }

    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: CompressionSettings) {
        self.timer.set_budget(Some(settings.budget));
        self.settings = settings;
    }

    pub fn batches(&self) -> &[CompressionBatch] {
        &self.batches
    }

    /// Pass durations, with overruns counted against the time budget.
    pub fn timer(&self) -> &PassTimer {
        &self.timer
    }

    fn live_batch(&self, material: &str) -> Option<usize> {
        let max = self.settings.max_compositions;
        self.batches
            .iter()
            .rposition(|b| b.material == material && b.composition_count < max)
    }

    /// Most recent batch for `material` that can still absorb tiles.
    pub fn batch_for(&self, material: &str) -> Option<&CompressionBatch> {
        self.live_batch(material).map(|idx| &self.batches[idx])
    }

    /// Group active, uncompressed tiles by material, lightest first.
    pub fn groups(&self, store: &TileStore) -> Vec<CompressionGroup> {
        let mut by_material: BTreeMap<&str, CompressionGroup> = BTreeMap::new();
        for tile in store.iter().filter(|t| t.active && !t.compressed) {
            let group = by_material
                .entry(tile.material.as_str())
                .or_insert_with(|| CompressionGroup {
                    material: tile.material.clone(),
                    tiles: Vec::new(),
                    vertex_count: 0,
                    prior_compositions: self
                        .batch_for(&tile.material)
                        .map_or(0, |b| b.composition_count),
                });
            group.tiles.push(tile.coord);
            group.vertex_count += tile.vertex_count();
        }
        let mut groups: Vec<CompressionGroup> = by_material.into_values().collect();
        groups.sort_by_key(CompressionGroup::weight);
        groups
    }

    /// Run one pass unless the cooldown since the last pass's start has not
    /// elapsed. Groups are taken lightest first; once the time budget is used
    /// up, the remaining groups wait for a later pass.
    pub fn compress<R: RenderGraph + ?Sized>(
        &mut self,
        store: &mut TileStore,
        graph: &mut R,
    ) -> CompressReport {
        let start = Instant::now();
        if self
            .last_run
            .is_some_and(|last| start.duration_since(last) < self.settings.cooldown)
        {
            return CompressReport {
                throttled: true,
                ..CompressReport::default()
            };
        }
        self.last_run = Some(start);
        let _span = tracing::info_span!("compress").entered();

        let mut report = CompressReport::default();
        let groups = self.groups(store);
        let total = groups.len();
        for (done, group) in groups.into_iter().enumerate() {
            if done > 0 && start.elapsed() >= self.settings.budget {
                report.groups_deferred = total - done;
                tracing::debug!(deferred = report.groups_deferred, "compression budget spent");
                break;
            }
            if group.tiles.len() < self.settings.min_group_size
                || group.vertex_count < self.settings.min_vertex_count
            {
                report.groups_skipped += 1;
                continue;
            }
            match self.compress_group(&group, store, graph) {
                Ok(tiles) => {
                    report.groups_compressed += 1;
                    report.tiles_compressed += tiles;
                }
                Err(err) => {
                    tracing::warn!(material = %group.material, %err, "compression group failed");
                    report.groups_failed += 1;
                }
            }
        }

        report.elapsed = start.elapsed();
        report.over_budget = self.timer.record(report.elapsed);
        if report.over_budget {
            tracing::debug!(
                elapsed = ?report.elapsed,
                budget = ?self.settings.budget,
                overruns = self.timer.overruns(),
                "compression pass over budget"
            );
        }
        tracing::debug!(
            groups = report.groups_compressed,
            tiles = report.tiles_compressed,
            batches = self.batches.len(),
            elapsed = ?report.elapsed,
            "compression pass complete"
        );
        report
    }

    /// Merge one group, absorbing the material's live batch if it has room.
    /// Tiles are only marked once the new batch node exists.
    fn compress_group<R: RenderGraph + ?Sized>(
        &mut self,
        group: &CompressionGroup,
        store: &mut TileStore,
        graph: &mut R,
    ) -> Result<usize, CompressError> {
        let absorbed = self.live_batch(&group.material);

        let mut merged = Geometry::new();
        let mut members = Vec::with_capacity(group.tiles.len());
        let mut composition_count = 1;
        if let Some(idx) = absorbed {
            let batch = &self.batches[idx];
            merged.merge(&batch.geometry, Some(Mat4::from_translation(batch.origin)), 0);
            members.extend_from_slice(&batch.tiles);
            composition_count = batch.composition_count + 1;
        }
        for &coord in &group.tiles {
            let tile = store.find(coord).ok_or(CompressError::MissingTile(coord))?;
            merged.merge(&tile.geometry, Some(Mat4::from_translation(tile.position)), 0);
            members.push(coord);
        }

        let origin = merged.recenter()?;
        let geometry = Arc::new(merged);
        let node = graph.create_batch(&group.material, Arc::clone(&geometry), origin)?;
        graph.attach(node);

        if let Some(idx) = absorbed {
            let old = self.batches.remove(idx);
            graph.destroy(old.node);
        }
        for &coord in &group.tiles {
            if let Some(tile) = store.find_mut(coord) {
                tile.compressed = true;
                graph.set_visible(tile.node, false);
                if tile.attached {
                    graph.detach(tile.node);
                    tile.attached = false;
                }
            }
        }

        tracing::debug!(
            material = %group.material,
            tiles = group.tiles.len(),
            composition_count,
            "batch created"
        );
        self.batches.push(CompressionBatch {
            node,
            material: group.material.clone(),
            geometry,
            composition_count,
            origin,
            tiles: members,
            created_at: Instant::now(),
        });
        Ok(group.tiles.len())
    }

    /// Destroy batches whose origin is farther than `limit` from `center`
    /// (Manhattan distance over enabled axes), along with their member tiles.
    pub fn evict_distant<R: RenderGraph + ?Sized>(
        &mut self,
        center: Vec3,
        limit: f32,
        dims: Dimensions,
        store: &mut TileStore,
        graph: &mut R,
    ) -> usize {
        let (far, near): (Vec<CompressionBatch>, Vec<CompressionBatch>) =
            std::mem::take(&mut self.batches).into_iter().partition(|b| {
                let distance: f32 = dims
                    .enabled()
                    .map(|axis| (axis.component(b.origin) - axis.component(center)).abs())
                    .sum();
                distance > limit
            });
        self.batches = near;

        for batch in &far {
            graph.destroy(batch.node);
            for &coord in &batch.tiles {
                if let Some(tile) = store.remove(coord) {
                    graph.destroy(tile.node);
                }
            }
            tracing::debug!(
                material = %batch.material,
                tiles = batch.tiles.len(),
                "distant batch evicted"
            );
        }
        far.len()
    }

    /// Destroy every batch node and forget the cooldown.
    pub fn clear<R: RenderGraph + ?Sized>(&mut self, graph: &mut R) -> usize {
        let count = self.batches.len();
        for batch in self.batches.drain(..) {
            graph.destroy(batch.node);
        }
        self.last_run = None;
        count
    }
}
