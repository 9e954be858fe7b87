use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use tilefield_assets::Geometry;
use tilefield_common::{GridCoord, NodeId};

/// One managed cell of the grid.
#[derive(Debug, Clone)]
pub struct Tile {
    pub coord: GridCoord,
    /// Render node holding this tile's geometry.
    pub node: NodeId,
    /// Inside the current window. Inactive tiles are kept detached for reuse.
    pub active: bool,
    /// Merged into a batch; the tile's own node is hidden and detached.
    pub compressed: bool,
    pub material: String,
    pub geometry: Arc<Geometry>,
    /// World position the geometry was placed at.
    pub position: Vec3,
    pub created_at: Instant,
    pub(crate) attached: bool,
}

impl Tile {
    pub fn new(
        coord: GridCoord,
        node: NodeId,
        material: impl Into<String>,
        geometry: Arc<Geometry>,
        position: Vec3,
    ) -> Self {
        Self {
            coord,
            node,
            active: true,
            compressed: false,
            material: material.into(),
            geometry,
            position,
            created_at: Instant::now(),
            attached: false,
        }
    }

    /// Whether the tile's node is currently in the scene.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn vertex_count(&self) -> usize {
        self.geometry.vertex_count()
    }
}

/// Every tile ever created and not yet evicted, at most one per coordinate.
///
/// Tiles live in a dense vector in creation order with a coordinate index
/// beside it, so scans stay cache friendly and lookups stay O(1).
#[derive(Debug, Default)]
pub struct TileStore {
    tiles: Vec<Tile>,
    index: HashMap<GridCoord, usize>,
}

impl TileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `tile`, replacing and returning any tile already at its coordinate.
    pub fn upsert(&mut self, tile: Tile) -> Option<Tile> {
        match self.index.get(&tile.coord) {
            Some(&slot) => Some(std::mem::replace(&mut self.tiles[slot], tile)),
            None => {
                self.index.insert(tile.coord, self.tiles.len());
                self.tiles.push(tile);
                None
            }
        }
    }

    pub fn find(&self, coord: GridCoord) -> Option<&Tile> {
        self.index.get(&coord).map(|&slot| &self.tiles[slot])
    }

    pub(crate) fn find_mut(&mut self, coord: GridCoord) -> Option<&mut Tile> {
        self.index.get(&coord).map(|&slot| &mut self.tiles[slot])
    }

    pub fn contains(&self, coord: GridCoord) -> bool {
        self.index.contains_key(&coord)
    }

    pub fn remove(&mut self, coord: GridCoord) -> Option<Tile> {
        let slot = self.index.remove(&coord)?;
        let removed = self.tiles.swap_remove(slot);
        if let Some(moved) = self.tiles.get(slot) {
            self.index.insert(moved.coord, slot);
        }
        Some(removed)
    }

    /// Keep the tiles `keep` accepts and return the rest, in store order.
    pub fn retain(&mut self, mut keep: impl FnMut(&Tile) -> bool) -> Vec<Tile> {
        let (kept, dropped): (Vec<Tile>, Vec<Tile>) =
            std::mem::take(&mut self.tiles).into_iter().partition(|t| keep(t));
        self.tiles = kept;
        self.reindex();
        dropped
    }

    /// Remove and return every tile.
    pub fn clear(&mut self) -> Vec<Tile> {
        self.index.clear();
        std::mem::take(&mut self.tiles)
    }

    fn reindex(&mut self) {
        self.index.clear();
        self.index
            .extend(self.tiles.iter().enumerate().map(|(slot, t)| (t.coord, slot)));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tile> {
        self.tiles.iter_mut()
    }

    pub fn active_tiles(&self) -> Vec<&Tile> {
        self.tiles.iter().filter(|t| t.active).collect()
    }

    pub fn inactive_tiles(&self) -> Vec<&Tile> {
        self.tiles.iter().filter(|t| !t.active).collect()
    }

    /// Active tiles not yet merged into a batch.
    pub fn uncompressed_tiles(&self) -> Vec<&Tile> {
        self.tiles
            .iter()
            .filter(|t| t.active && !t.compressed)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.active).count()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Per-coordinate user data kept beside the tile store.
///
/// Callers that attach extra state to tiles (terrain heights, spawn flags)
/// keep it here and [`prune`](Self::prune) after evictions.
#[derive(Debug, Clone)]
pub struct SideTable<T> {
    cells: HashMap<GridCoord, T>,
}

impl<T> Default for SideTable<T> {
    fn default() -> Self {
        Self {
            cells: HashMap::new(),
        }
    }
}

impl<T> SideTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coord: GridCoord, value: T) -> Option<T> {
        self.cells.insert(coord, value)
    }

    pub fn get(&self, coord: GridCoord) -> Option<&T> {
        self.cells.get(&coord)
    }

    pub fn get_mut(&mut self, coord: GridCoord) -> Option<&mut T> {
        self.cells.get_mut(&coord)
    }

    pub fn get_or_insert_with(&mut self, coord: GridCoord, f: impl FnOnce() -> T) -> &mut T {
        self.cells.entry(coord).or_insert_with(f)
    }

    pub fn remove(&mut self, coord: GridCoord) -> Option<T> {
        self.cells.remove(&coord)
    }

    /// Drop entries whose coordinate no longer has a tile. Returns how many.
    pub fn prune(&mut self, store: &TileStore) -> usize {
        let before = self.cells.len();
        self.cells.retain(|coord, _| store.contains(*coord));
        before - self.cells.len()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
