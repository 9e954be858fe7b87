use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;
use tilefield_assets::{Geometry, GeometryError, Material, MaterialError, MaterialLibrary, MaterialParams};
use tilefield_common::{GridCoord, NodeId, Transform};

/// Index of a resolved material inside one scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(pub u32);

/// Errors surfaced by a render graph.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("material error: {0}")]
    Material(#[from] MaterialError),
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),
}

/// The rendering collaborator the tile manager drives.
///
/// Nodes start out detached. Detaching keeps a node's data so it can be
/// attached again; destroying drops it. Operations on unknown nodes return
/// `false` and change nothing.
pub trait RenderGraph {
    /// Create a detached node for a single tile.
    fn create_tile(
        &mut self,
        coord: GridCoord,
        material: &str,
        geometry: Arc<Geometry>,
    ) -> Result<NodeId, RenderError>;

    /// Create a detached node for merged geometry placed at `origin`.
    fn create_batch(
        &mut self,
        material: &str,
        geometry: Arc<Geometry>,
        origin: Vec3,
    ) -> Result<NodeId, RenderError>;

    fn attach(&mut self, node: NodeId) -> bool;

    fn detach(&mut self, node: NodeId) -> bool;

    fn destroy(&mut self, node: NodeId) -> bool;

    fn set_visible(&mut self, node: NodeId, visible: bool) -> bool;

    fn set_transform(&mut self, node: NodeId, position: Vec3) -> bool;

    /// Resolve a material key, failing for undefined materials.
    fn material_for(&mut self, key: &str) -> Result<MaterialHandle, RenderError>;
}

/// What a scene node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Tile(GridCoord),
    Batch,
    Group,
}

/// A node in the scene graph.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub kind: NodeKind,
    pub material: Option<MaterialHandle>,
    pub geometry: Option<Arc<Geometry>>,
    pub transform: Transform,
    pub visible: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl SceneNode {
    fn new(name: String, kind: NodeKind) -> Self {
        Self {
            name,
            kind,
            material: None,
            geometry: None,
            transform: Transform::default(),
            visible: true,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn vertex_count(&self) -> usize {
        self.geometry.as_ref().map_or(0, |g| g.vertex_count())
    }
}

/// A record of every structural change to the scene graph.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    Created { id: NodeId, kind: NodeKind },
    Attached { id: NodeId },
    Detached { id: NodeId },
    Destroyed { id: NodeId },
    Moved { id: NodeId, old: Vec3, new: Vec3 },
    VisibilityChanged { id: NodeId, visible: bool },
}

/// Totals gathered by one update pass over the live graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Live nodes visited.
    pub visited: usize,
    /// Live nodes visible along their whole ancestor chain.
    pub visible: usize,
    pub tiles: usize,
    pub batches: usize,
    /// Visible nodes that carry geometry.
    pub draw_calls: usize,
    pub vertices: usize,
}

/// In-memory render graph.
///
/// Owns its nodes, a root list that defines what is live, a material library
/// and an append-only event log. The log grows with every change until the
/// caller takes it with [`drain_events`](Self::drain_events), so long-running
/// callers should drain it once per step.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: BTreeMap<NodeId, SceneNode>,
    roots: Vec<NodeId>,
    materials: MaterialLibrary,
    material_handles: BTreeMap<String, MaterialHandle>,
    resolved: Vec<Material>,
    event_log: Vec<SceneEvent>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_materials(materials: MaterialLibrary) -> Self {
        Self {
            materials,
            ..Self::default()
        }
    }

    pub fn materials(&self) -> &MaterialLibrary {
        &self.materials
    }

    /// Define or overlay a material and refresh every material already resolved,
    /// so children of a changed parent pick up the change.
    pub fn define_material(
        &mut self,
        name: impl Into<String>,
        params: MaterialParams,
    ) -> Result<(), RenderError> {
        self.materials.define(name, params);
        self.refresh_materials()
    }

    /// Swap the shared base library and refresh resolved materials.
    pub fn rebase_materials(&mut self, base: Arc<MaterialLibrary>) -> Result<(), RenderError> {
        let mut rebased = MaterialLibrary::with_base(base);
        for name in self.materials.names() {
            if let Some(params) = self.materials.get(name) {
                rebased.replace(name, params.clone());
            }
        }
        self.materials = rebased;
        self.refresh_materials()
    }

    fn refresh_materials(&mut self) -> Result<(), RenderError> {
        for (name, handle) in &self.material_handles {
            self.resolved[handle.0 as usize] = self.materials.resolve(name)?;
        }
        Ok(())
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.resolved.get(handle.0 as usize)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Whether the node is reachable from the root list.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            let Some(node) = self.nodes.get(&current) else {
                return false;
            };
            match node.parent {
                Some(parent) => current = parent,
                None => return self.roots.contains(&current),
            }
        }
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[SceneEvent] {
        &self.event_log
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Create a detached group node with no geometry.
    pub fn create_group(&mut self, name: impl Into<String>) -> NodeId {
        self.insert(SceneNode::new(name.into(), NodeKind::Group))
    }

    /// Move `child` under `parent`, detaching it from wherever it was.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if parent == child
            || !self.nodes.contains_key(&parent)
            || !self.nodes.contains_key(&child)
            || self.is_ancestor(child, parent)
        {
            return false;
        }
        self.unlink(child);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
        self.event_log.push(SceneEvent::Attached { id: child });
        true
    }

    fn is_ancestor(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        while let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent) {
            if parent == ancestor {
                return true;
            }
            id = parent;
        }
        false
    }

    /// Depth-first walk over live nodes, roots in attach order.
    pub fn walk(&self) -> SceneWalk<'_> {
        SceneWalk {
            graph: self,
            stack: self.roots.iter().rev().map(|id| (*id, 0, true)).collect(),
        }
    }

    /// Visit every live node once and aggregate what would be drawn.
    pub fn update_pass(&self) -> UpdateReport {
        let mut report = UpdateReport::default();
        for step in self.walk() {
            report.visited += 1;
            match step.node.kind {
                NodeKind::Tile(_) => report.tiles += 1,
                NodeKind::Batch => report.batches += 1,
                NodeKind::Group => {}
            }
            if step.visible {
                report.visible += 1;
                if let Some(geo) = &step.node.geometry {
                    report.draw_calls += 1;
                    report.vertices += geo.vertex_count();
                }
            }
        }
        report
    }

    fn insert(&mut self, node: SceneNode) -> NodeId {
        let id = NodeId::new();
        self.event_log.push(SceneEvent::Created {
            id,
            kind: node.kind,
        });
        self.nodes.insert(id, node);
        id
    }

    /// Remove the node from the root list or its parent's children.
    fn unlink(&mut self, id: NodeId) -> bool {
        let parent = self.nodes.get(&id).and_then(|n| n.parent);
        match parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.children.retain(|c| *c != id);
                }
                if let Some(n) = self.nodes.get_mut(&id) {
                    n.parent = None;
                }
                true
            }
            None => {
                let before = self.roots.len();
                self.roots.retain(|r| *r != id);
                before != self.roots.len()
            }
        }
    }

    fn create_node(
        &mut self,
        name: String,
        kind: NodeKind,
        material: &str,
        geometry: Arc<Geometry>,
    ) -> Result<NodeId, RenderError> {
        let handle = self.material_for(material)?;
        let mut node = SceneNode::new(name, kind);
        node.material = Some(handle);
        node.geometry = Some(geometry);
        Ok(self.insert(node))
    }
}

impl RenderGraph for SceneGraph {
    fn create_tile(
        &mut self,
        coord: GridCoord,
        material: &str,
        geometry: Arc<Geometry>,
    ) -> Result<NodeId, RenderError> {
        self.create_node(format!("tile {coord}"), NodeKind::Tile(coord), material, geometry)
    }

    fn create_batch(
        &mut self,
        material: &str,
        geometry: Arc<Geometry>,
        origin: Vec3,
    ) -> Result<NodeId, RenderError> {
        geometry.validate()?;
        let id = self.create_node(format!("batch {material}"), NodeKind::Batch, material, geometry)?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.transform.position = origin;
        }
        Ok(id)
    }

    fn attach(&mut self, node: NodeId) -> bool {
        if !self.nodes.contains_key(&node) {
            return false;
        }
        if self.is_attached(node) && self.roots.contains(&node) {
            return true;
        }
        self.unlink(node);
        self.roots.push(node);
        self.event_log.push(SceneEvent::Attached { id: node });
        true
    }

    fn detach(&mut self, node: NodeId) -> bool {
        if !self.nodes.contains_key(&node) {
            return false;
        }
        if self.unlink(node) {
            self.event_log.push(SceneEvent::Detached { id: node });
        }
        true
    }

    fn destroy(&mut self, node: NodeId) -> bool {
        if !self.nodes.contains_key(&node) {
            return false;
        }
        self.unlink(node);
        let mut pending = vec![node];
        while let Some(id) = pending.pop() {
            if let Some(removed) = self.nodes.remove(&id) {
                pending.extend(removed.children);
                self.event_log.push(SceneEvent::Destroyed { id });
            }
        }
        true
    }

    fn set_visible(&mut self, node: NodeId, visible: bool) -> bool {
        let Some(n) = self.nodes.get_mut(&node) else {
            return false;
        };
        if n.visible != visible {
            n.visible = visible;
            self.event_log
                .push(SceneEvent::VisibilityChanged { id: node, visible });
        }
        true
    }

    fn set_transform(&mut self, node: NodeId, position: Vec3) -> bool {
        let Some(n) = self.nodes.get_mut(&node) else {
            return false;
        };
        let old = n.transform.position;
        n.transform.position = position;
        self.event_log.push(SceneEvent::Moved {
            id: node,
            old,
            new: position,
        });
        true
    }

    fn material_for(&mut self, key: &str) -> Result<MaterialHandle, RenderError> {
        if let Some(handle) = self.material_handles.get(key) {
            return Ok(*handle);
        }
        let material = self.materials.resolve(key)?;
        let handle = MaterialHandle(self.resolved.len() as u32);
        self.resolved.push(material);
        self.material_handles.insert(key.to_string(), handle);
        Ok(handle)
    }
}

/// One step of a [`SceneGraph::walk`].
#[derive(Debug, Clone, Copy)]
pub struct WalkStep<'a> {
    pub id: NodeId,
    pub node: &'a SceneNode,
    pub depth: usize,
    /// Visible itself and through every ancestor.
    pub visible: bool,
}

/// Depth-first iterator over the live part of a scene graph.
pub struct SceneWalk<'a> {
    graph: &'a SceneGraph,
    stack: Vec<(NodeId, usize, bool)>,
}

impl<'a> Iterator for SceneWalk<'a> {
    type Item = WalkStep<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (id, depth, parent_visible) = self.stack.pop()?;
            let Some(node) = self.graph.nodes.get(&id) else {
                continue;
            };
            let visible = parent_visible && node.visible;
            for child in node.children.iter().rev() {
                self.stack.push((*child, depth + 1, visible));
            }
            return Some(WalkStep {
                id,
                node,
                depth,
                visible,
            });
        }
    }
}
