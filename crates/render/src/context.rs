use std::collections::BTreeMap;
use std::sync::Arc;

use tilefield_assets::{MaterialLibrary, MaterialParams};

use crate::graph::{RenderError, SceneGraph};

/// Owns the default materials and every named display.
///
/// Each display gets its own material library layered over a snapshot of the
/// defaults; changing a default re-bases every display so the change reaches
/// materials they already resolved.
#[derive(Debug, Default)]
pub struct DisplayContext {
    defaults: Arc<MaterialLibrary>,
    displays: BTreeMap<String, SceneGraph>,
}

impl DisplayContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: MaterialLibrary) -> Self {
        Self {
            defaults: Arc::new(defaults),
            displays: BTreeMap::new(),
        }
    }

    pub fn defaults(&self) -> &MaterialLibrary {
        &self.defaults
    }

    /// Define or overlay a shared default material.
    pub fn define_default(
        &mut self,
        name: impl Into<String>,
        params: MaterialParams,
    ) -> Result<(), RenderError> {
        let mut defaults = (*self.defaults).clone();
        defaults.define(name, params);
        self.defaults = Arc::new(defaults);
        for (name, display) in &mut self.displays {
            tracing::debug!(display = %name, "rebasing display materials");
            display.rebase_materials(Arc::clone(&self.defaults))?;
        }
        Ok(())
    }

    /// Get the named display, creating it if needed.
    pub fn create(&mut self, name: impl Into<String>) -> &mut SceneGraph {
        let name = name.into();
        let defaults = &self.defaults;
        self.displays.entry(name).or_insert_with_key(|name| {
            tracing::debug!(display = %name, "creating display");
            SceneGraph::with_materials(MaterialLibrary::with_base(Arc::clone(defaults)))
        })
    }

    pub fn get(&self, name: &str) -> Option<&SceneGraph> {
        self.displays.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SceneGraph> {
        self.displays.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<SceneGraph> {
        self.displays.remove(name)
    }

    /// Drop every display. Defaults are kept. Returns how many were dropped.
    pub fn reset(&mut self) -> usize {
        let count = self.displays.len();
        self.displays.clear();
        tracing::debug!(count, "display context reset");
        count
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.displays.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.displays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.displays.is_empty()
    }
}
