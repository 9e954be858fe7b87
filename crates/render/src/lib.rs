//! Rendering collaborator: the graph interface the tile manager drives, plus
//! an in-memory scene graph, a display context and a debug text renderer.
//!
//! # Invariants
//! - Detached nodes keep their data; only `destroy` drops it.
//! - Material resolution failures surface as errors, never as fallbacks.
//! - Renderers read the graph and never mutate it.

mod context;
mod graph;
mod renderer;

pub use context::DisplayContext;
pub use graph::{
    MaterialHandle, NodeKind, RenderError, RenderGraph, SceneEvent, SceneGraph, SceneNode,
    SceneWalk, UpdateReport, WalkStep,
};
pub use renderer::{DebugTextRenderer, Renderer};

pub fn crate_info() -> &'static str {
    "tilefield-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
