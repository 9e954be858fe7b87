use std::sync::Arc;

use glam::Vec3;
use tilefield_assets::Geometry;
use tilefield_common::{GridCoord, grid_to_world};

/// Material key used when no hook picks one.
pub const DEFAULT_TILE_MATERIAL: &str = "infinite cube";

/// Customization points consulted while the window is walked.
///
/// Every method has a default, so implementors override only what they need.
pub trait TileHooks {
    /// Whether a tile may exist at `coord`. Returning `false` prevents both
    /// creation and reactivation there.
    fn has_tile(&self, _coord: GridCoord) -> bool {
        true
    }

    fn tile_material(&self, _coord: GridCoord) -> String {
        DEFAULT_TILE_MATERIAL.to_string()
    }

    /// Geometry for a new tile. `None` uses the manager's shared cube of
    /// edge `tile_size`.
    fn tile_geometry(&self, _coord: GridCoord, _tile_size: f32) -> Option<Arc<Geometry>> {
        None
    }

    /// World position a new tile's node is placed at.
    fn locate_tile(&self, coord: GridCoord, tile_size: f32) -> Vec3 {
        grid_to_world(coord, tile_size)
    }
}

/// Uses every default: a cube on every cell.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTileHooks;

impl TileHooks for DefaultTileHooks {}

impl<T: TileHooks + ?Sized> TileHooks for Box<T> {
    fn has_tile(&self, coord: GridCoord) -> bool {
        (**self).has_tile(coord)
    }

    fn tile_material(&self, coord: GridCoord) -> String {
        (**self).tile_material(coord)
    }

    fn tile_geometry(&self, coord: GridCoord, tile_size: f32) -> Option<Arc<Geometry>> {
        (**self).tile_geometry(coord, tile_size)
    }

    fn locate_tile(&self, coord: GridCoord, tile_size: f32) -> Vec3 {
        (**self).locate_tile(coord, tile_size)
    }
}

type HasTileFn = Box<dyn Fn(GridCoord) -> bool>;
type MaterialFn = Box<dyn Fn(GridCoord) -> String>;
type GeometryFn = Box<dyn Fn(GridCoord, f32) -> Arc<Geometry>>;
type LocateFn = Box<dyn Fn(GridCoord, f32) -> Vec3>;

/// Hooks assembled from closures.
///
/// ```
/// use tilefield_stream::FnHooks;
///
/// // leave every fourth row and column empty
/// let hooks = FnHooks::new().has_tile(|c| c.i % 4 != 0 && c.k % 4 != 0);
/// ```
#[derive(Default)]
pub struct FnHooks {
    has_tile: Option<HasTileFn>,
    material: Option<MaterialFn>,
    geometry: Option<GeometryFn>,
    locate: Option<LocateFn>,
}

impl FnHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_tile(mut self, f: impl Fn(GridCoord) -> bool + 'static) -> Self {
        self.has_tile = Some(Box::new(f));
        self
    }

    pub fn material(mut self, f: impl Fn(GridCoord) -> String + 'static) -> Self {
        self.material = Some(Box::new(f));
        self
    }

    pub fn geometry(mut self, f: impl Fn(GridCoord, f32) -> Arc<Geometry> + 'static) -> Self {
        self.geometry = Some(Box::new(f));
        self
    }

    pub fn locate(mut self, f: impl Fn(GridCoord, f32) -> Vec3 + 'static) -> Self {
        self.locate = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for FnHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHooks")
            .field("has_tile", &self.has_tile.is_some())
            .field("material", &self.material.is_some())
            .field("geometry", &self.geometry.is_some())
            .field("locate", &self.locate.is_some())
            .finish()
    }
}

impl TileHooks for FnHooks {
    fn has_tile(&self, coord: GridCoord) -> bool {
        self.has_tile.as_ref().is_none_or(|f| f(coord))
    }

    fn tile_material(&self, coord: GridCoord) -> String {
        match &self.material {
            Some(f) => f(coord),
            None => DEFAULT_TILE_MATERIAL.to_string(),
        }
    }

    fn tile_geometry(&self, coord: GridCoord, tile_size: f32) -> Option<Arc<Geometry>> {
        self.geometry.as_ref().map(|f| f(coord, tile_size))
    }

    fn locate_tile(&self, coord: GridCoord, tile_size: f32) -> Vec3 {
        match &self.locate {
            Some(f) => f(coord, tile_size),
            None => grid_to_world(coord, tile_size),
        }
    }
}
