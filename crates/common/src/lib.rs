//! Shared types: grid coordinates, enabled axes, node ids and transforms.
//!
//! # Invariants
//! - Disabled axes always map to grid component 0.
//! - Grid mapping is a pure function of the point, tile size and axes.

mod grid;
mod types;

pub use grid::{Axis, Dimensions, GridCoord, grid_to_world, round_half_up, to_grid};
pub use types::{NodeId, Transform};

pub fn crate_info() -> &'static str {
    "tilefield-common v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("common"));
    }
}
