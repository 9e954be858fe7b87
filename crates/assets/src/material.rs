use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::Color;

/// Shading family of a material. Only a label at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shading {
    #[default]
    Basic,
    Lambert,
    Phong,
    Normal,
    Depth,
    Face,
}

/// Errors from material resolution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MaterialError {
    #[error("unknown material: {0}")]
    Unknown(String),
    #[error("circular parent chain through material {0}")]
    Cycle(String),
}

/// Partial material definition. Unset fields are inherited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialParams {
    pub parent: Option<String>,
    pub shading: Option<Shading>,
    pub color: Option<Color>,
    pub opacity: Option<f32>,
    pub wireframe: Option<bool>,
}

impl MaterialParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn shading(mut self, shading: Shading) -> Self {
        self.shading = Some(shading);
        self
    }

    pub fn color(mut self, r: f32, g: f32, b: f32) -> Self {
        self.color = Some([r, g, b]);
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn wireframe(mut self, wireframe: bool) -> Self {
        self.wireframe = Some(wireframe);
        self
    }

    /// Copy every field that is set in `other` over this one.
    pub fn overlay(&mut self, other: &MaterialParams) {
        if other.parent.is_some() {
            self.parent.clone_from(&other.parent);
        }
        if other.shading.is_some() {
            self.shading = other.shading;
        }
        if other.color.is_some() {
            self.color = other.color;
        }
        if other.opacity.is_some() {
            self.opacity = other.opacity;
        }
        if other.wireframe.is_some() {
            self.wireframe = other.wireframe;
        }
    }
}

/// A fully resolved material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub shading: Shading,
    pub color: Color,
    pub opacity: f32,
    pub wireframe: bool,
}

impl Material {
    fn from_params(name: &str, params: &MaterialParams) -> Self {
        let defaults = Material::default();
        Self {
            name: name.to_string(),
            shading: params.shading.unwrap_or(defaults.shading),
            color: params.color.unwrap_or(defaults.color),
            opacity: params.opacity.unwrap_or(defaults.opacity),
            wireframe: params.wireframe.unwrap_or(defaults.wireframe),
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".into(),
            shading: Shading::Basic,
            color: [1.0, 1.0, 1.0],
            opacity: 1.0,
            wireframe: false,
        }
    }
}

/// Named material definitions with parent inheritance.
///
/// A library may sit on top of a shared base library. Resolving a name layers,
/// from weakest to strongest: built-in defaults, the resolved parent, the base
/// library's definition of the same name, then the local definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialLibrary {
    defs: BTreeMap<String, MaterialParams>,
    #[serde(skip)]
    base: Option<Arc<MaterialLibrary>>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty library that falls back to `base` for names and defaults.
    pub fn with_base(base: Arc<MaterialLibrary>) -> Self {
        Self {
            defs: BTreeMap::new(),
            base: Some(base),
        }
    }

    pub fn base(&self) -> Option<&Arc<MaterialLibrary>> {
        self.base.as_ref()
    }

    /// Define a material, or overlay `params` onto an existing local definition.
    pub fn define(&mut self, name: impl Into<String>, params: MaterialParams) -> &mut Self {
        self.defs
            .entry(name.into())
            .and_modify(|existing| existing.overlay(&params))
            .or_insert(params);
        self
    }

    /// Replace a local definition outright.
    pub fn replace(&mut self, name: impl Into<String>, params: MaterialParams) -> Option<MaterialParams> {
        self.defs.insert(name.into(), params)
    }

    pub fn remove(&mut self, name: &str) -> Option<MaterialParams> {
        self.defs.remove(name)
    }

    /// Local definition only.
    pub fn get(&self, name: &str) -> Option<&MaterialParams> {
        self.defs.get(name)
    }

    /// Whether `name` is defined here or in the base chain.
    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name) || self.base.as_ref().is_some_and(|b| b.contains(name))
    }

    /// Local names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    /// Names whose local definition names `parent` as parent.
    pub fn children_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.defs
            .iter()
            .filter(move |(_, p)| p.parent.as_deref() == Some(parent))
            .map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Resolve `name` through its parent chain and base library.
    pub fn resolve(&self, name: &str) -> Result<Material, MaterialError> {
        let mut visiting = Vec::new();
        let params = self.resolve_params(name, &mut visiting)?;
        Ok(Material::from_params(name, &params))
    }

    fn resolve_params(
        &self,
        name: &str,
        visiting: &mut Vec<String>,
    ) -> Result<MaterialParams, MaterialError> {
        if visiting.iter().any(|n| n == name) {
            return Err(MaterialError::Cycle(name.to_string()));
        }

        let local = self.defs.get(name);
        let from_base = match &self.base {
            Some(base) if base.contains(name) => Some(base.resolve_params(name, &mut Vec::new())?),
            _ => None,
        };
        if local.is_none() && from_base.is_none() {
            return Err(MaterialError::Unknown(name.to_string()));
        }

        let mut out = MaterialParams::default();
        if let Some(parent) = local.and_then(|l| l.parent.as_deref()) {
            visiting.push(name.to_string());
            let inherited = self.resolve_params(parent, visiting)?;
            visiting.pop();
            out.overlay(&inherited);
        }
        if let Some(base) = &from_base {
            out.overlay(base);
        }
        if let Some(local) = local {
            out.overlay(local);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city() -> MaterialLibrary {
        let mut lib = MaterialLibrary::new();
        lib.define(
            "building",
            MaterialParams::new().shading(Shading::Phong).color(0.8, 0.8, 1.0),
        );
        lib.define("house", MaterialParams::new().parent("building").color(1.0, 0.0, 0.0));
        lib.define("road", MaterialParams::new().shading(Shading::Lambert));
        lib
    }

    #[test]
    fn resolves_defaults() {
        let lib = city();
        let road = lib.resolve("road").unwrap();
        assert_eq!(road.name, "road");
        assert_eq!(road.shading, Shading::Lambert);
        assert_eq!(road.color, [1.0, 1.0, 1.0]);
        assert_eq!(road.opacity, 1.0);
    }

    #[test]
    fn child_inherits_from_parent() {
        let lib = city();
        let house = lib.resolve("house").unwrap();
        assert_eq!(house.shading, Shading::Phong);
        assert_eq!(house.color, [1.0, 0.0, 0.0]);
        let children: Vec<&str> = lib.children_of("building").collect();
        assert_eq!(children, vec!["house"]);
    }

    #[test]
    fn unknown_material_is_an_error() {
        let lib = city();
        assert_eq!(
            lib.resolve("castle"),
            Err(MaterialError::Unknown("castle".into()))
        );
    }

    #[test]
    fn missing_parent_is_an_error() {
        let mut lib = MaterialLibrary::new();
        lib.define("orphan", MaterialParams::new().parent("nobody"));
        assert_eq!(
            lib.resolve("orphan"),
            Err(MaterialError::Unknown("nobody".into()))
        );
    }

    #[test]
    fn cycles_are_detected() {
        let mut lib = MaterialLibrary::new();
        lib.define("a", MaterialParams::new().parent("b"));
        lib.define("b", MaterialParams::new().parent("a"));
        assert!(matches!(lib.resolve("a"), Err(MaterialError::Cycle(_))));

        lib.define("self", MaterialParams::new().parent("self"));
        assert_eq!(lib.resolve("self"), Err(MaterialError::Cycle("self".into())));
    }

    #[test]
    fn define_overlays_existing() {
        let mut lib = city();
        lib.define("road", MaterialParams::new().opacity(0.5));
        let road = lib.resolve("road").unwrap();
        assert_eq!(road.shading, Shading::Lambert);
        assert_eq!(road.opacity, 0.5);
    }

    #[test]
    fn base_library_supplies_shared_defaults() {
        let base = Arc::new(city());
        let mut display = MaterialLibrary::with_base(base);
        assert!(display.contains("house"));
        assert!(display.is_empty());

        // local definition wins over the base, base wins over inherited parent values
        display.define("house", MaterialParams::new().wireframe(true));
        let house = display.resolve("house").unwrap();
        assert_eq!(house.color, [1.0, 0.0, 0.0]);
        assert!(house.wireframe);

        display.define("shed", MaterialParams::new().parent("house").opacity(0.25));
        let shed = display.resolve("shed").unwrap();
        assert_eq!(shed.shading, Shading::Phong);
        assert!(shed.wireframe);
        assert_eq!(shed.opacity, 0.25);
    }

    #[test]
    fn library_round_trips_through_json() {
        let lib = city();
        let json = serde_json::to_string(&lib).unwrap();
        let loaded: MaterialLibrary = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.resolve("house"), lib.resolve("house"));
    }
}
