//! Geometry and material data consumed by the render graph.
//!
//! Geometry is plain indexed triangles that can be merged without loss and
//! recentered about their bounds. Materials are named partial definitions that
//! inherit from a parent and from a shared base library.
//!
//! # Invariants
//! - Merging never drops vertices, faces, normals, colors or UVs.
//! - Resolving an undefined material is an error, never a silent fallback.

mod geometry;
mod material;

use std::path::Path;

pub use geometry::{Color, Face, FlatGeometry, Geometry, GeometryError};
pub use material::{Material, MaterialError, MaterialLibrary, MaterialParams, Shading};

/// Errors from loading and saving asset data.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MaterialLibrary {
    /// Save the local definitions to a JSON file. The base library is not written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AssetError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Load definitions from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let file = std::fs::File::open(path)?;
        let library: Self = serde_json::from_reader(file)?;
        Ok(library)
    }
}

impl FlatGeometry {
    /// Write as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AssetError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(file, self)?;
        Ok(())
    }
}

pub fn crate_info() -> &'static str {
    "tilefield-assets v0.1.0"
}
