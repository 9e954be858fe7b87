use crate::graph::{NodeKind, SceneGraph};

/// Renderer-agnostic interface. All renderers implement this trait.
///
/// A renderer reads the scene graph and produces output. It never mutates the
/// graph; the tile manager and its callers own every structural change.
pub trait Renderer {
    /// The output type produced by this renderer.
    type Output;

    /// Render one frame from the given scene.
    fn render(&self, scene: &SceneGraph) -> Self::Output;
}

/// Produces a human-readable outline of the live scene.
///
/// Useful for CLI output, logging, and testing the render interface.
#[derive(Debug, Default)]
pub struct DebugTextRenderer {
    /// Stop listing nodes after this many lines; totals are always printed.
    pub max_nodes: Option<usize>,
}

impl DebugTextRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_nodes: usize) -> Self {
        Self {
            max_nodes: Some(max_nodes),
        }
    }
}

impl Renderer for DebugTextRenderer {
    type Output = String;

    fn render(&self, scene: &SceneGraph) -> String {
        let report = scene.update_pass();
        let mut out = String::new();
        out.push_str(&format!(
            "=== Scene (nodes={}, live={}) ===\n",
            scene.node_count(),
            report.visited
        ));
        out.push_str(&format!(
            "Tiles: {}  Batches: {}  Draw calls: {}  Vertices: {}\n",
            report.tiles, report.batches, report.draw_calls, report.vertices
        ));

        let limit = self.max_nodes.unwrap_or(usize::MAX);
        for (listed, step) in scene.walk().enumerate() {
            if listed == limit {
                out.push_str(&format!("  ... {} more\n", report.visited - listed));
                break;
            }
            let p = step.node.transform.position;
            let kind = match step.node.kind {
                NodeKind::Tile(coord) => format!("tile {coord}"),
                NodeKind::Batch => "batch".to_string(),
                NodeKind::Group => "group".to_string(),
            };
            let material = step
                .node
                .material
                .and_then(|h| scene.material(h))
                .map_or("-", |m| m.name.as_str());
            out.push_str(&format!(
                "{:indent$}[{}] {} mat={} pos=({:.1}, {:.1}, {:.1}){}\n",
                "",
                step.id.short(),
                kind,
                material,
                p.x,
                p.y,
                p.z,
                if step.visible { "" } else { " hidden" },
                indent = 2 + step.depth * 2,
            ));
        }

        out
    }
}
