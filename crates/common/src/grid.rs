use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A world axis. Grid components are named i, j, k for x, y, z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Name of the grid component for this axis.
    pub fn grid_name(self) -> char {
        match self {
            Axis::X => 'i',
            Axis::Y => 'j',
            Axis::Z => 'k',
        }
    }

    #[inline]
    pub fn component(self, v: Vec3) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

/// Which axes take part in tiling. Defaults to the x/z ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Dimensions {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::planar()
    }
}

impl Dimensions {
    /// x and z enabled, y disabled.
    pub const fn planar() -> Self {
        Self {
            x: true,
            y: false,
            z: true,
        }
    }

    pub const fn all() -> Self {
        Self {
            x: true,
            y: true,
            z: true,
        }
    }

    pub const fn only(axis: Axis) -> Self {
        Self {
            x: matches!(axis, Axis::X),
            y: matches!(axis, Axis::Y),
            z: matches!(axis, Axis::Z),
        }
    }

    pub fn is_enabled(&self, axis: Axis) -> bool {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Enabled axes in x, y, z order.
    pub fn enabled(&self) -> impl Iterator<Item = Axis> + '_ {
        Axis::ALL.into_iter().filter(|a| self.is_enabled(*a))
    }

    pub fn count(&self) -> u32 {
        self.enabled().count() as u32
    }
}

/// Integer address of a tile. Components of disabled axes stay 0.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GridCoord {
    pub i: i32,
    pub j: i32,
    pub k: i32,
}

impl GridCoord {
    pub const ORIGIN: GridCoord = GridCoord { i: 0, j: 0, k: 0 };

    #[inline]
    pub const fn new(i: i32, j: i32, k: i32) -> Self {
        Self { i, j, k }
    }

    #[inline]
    pub fn get(&self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.i,
            Axis::Y => self.j,
            Axis::Z => self.k,
        }
    }

    #[inline]
    pub fn set(&mut self, axis: Axis, value: i32) {
        match axis {
            Axis::X => self.i = value,
            Axis::Y => self.j = value,
            Axis::Z => self.k = value,
        }
    }

    #[inline]
    pub fn with(mut self, axis: Axis, value: i32) -> Self {
        self.set(axis, value);
        self
    }

    #[inline]
    pub fn offset(self, di: i32, dj: i32, dk: i32) -> Self {
        Self {
            i: self.i + di,
            j: self.j + dj,
            k: self.k + dk,
        }
    }

    /// Sum of absolute component differences over the enabled axes.
    pub fn manhattan_distance(&self, other: &GridCoord, dims: Dimensions) -> u64 {
        dims.enabled()
            .map(|a| axis_delta(self.get(a), other.get(a)))
            .sum()
    }

    /// Largest absolute component difference over the enabled axes.
    pub fn chebyshev_distance(&self, other: &GridCoord, dims: Dimensions) -> u64 {
        dims.enabled()
            .map(|a| axis_delta(self.get(a), other.get(a)))
            .max()
            .unwrap_or(0)
    }
}

#[inline]
fn axis_delta(a: i32, b: i32) -> u64 {
    (i64::from(a) - i64::from(b)).unsigned_abs()
}

impl fmt::Display for GridCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.i, self.j, self.k)
    }
}

impl From<(i32, i32, i32)> for GridCoord {
    fn from(value: (i32, i32, i32)) -> Self {
        Self::new(value.0, value.1, value.2)
    }
}

impl From<GridCoord> for (i32, i32, i32) {
    fn from(value: GridCoord) -> Self {
        (value.i, value.j, value.k)
    }
}

/// Round to the nearest integer, with halves going toward positive infinity.
///
/// `v - v.floor()` is exact, so values just below a half never round up.
#[inline]
pub fn round_half_up(v: f64) -> f64 {
    let floor = v.floor();
    if v - floor >= 0.5 { floor + 1.0 } else { floor }
}

/// Map a world position to the grid cell whose center is nearest to it.
pub fn to_grid(point: Vec3, tile_size: f32, dims: Dimensions) -> GridCoord {
    let mut coord = GridCoord::ORIGIN;
    for axis in dims.enabled() {
        let cells = f64::from(axis.component(point)) / f64::from(tile_size);
        coord.set(axis, round_half_up(cells) as i32);
    }
    coord
}

/// World position of a grid cell's center.
pub fn grid_to_world(coord: GridCoord, tile_size: f32) -> Vec3 {
    Vec3::new(
        coord.i as f32 * tile_size,
        coord.j as f32 * tile_size,
        coord.k as f32 * tile_size,
    )
}
