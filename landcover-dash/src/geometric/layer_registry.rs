use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{DashResult, DashboardError};
use crate::geometric::land_cover::{ClassCode, Rgb};

/// Key a layer is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum LayerKey {
    /// Full land cover classification
    Full,
    /// Region outline
    Boundary,
    /// Single-class masked classification
    Class(ClassCode),
}

impl LayerKey {
    /// Stable identifier handed to map surfaces
    pub fn layer_id(self) -> String {
        match self {
            LayerKey::Full => "full".to_string(),
            LayerKey::Boundary => "boundary".to_string(),
            LayerKey::Class(code) => format!("class-{}", code),
        }
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKey::Full => f.write_str("full"),
            LayerKey::Boundary => f.write_str("boundary"),
            LayerKey::Class(code) => write!(f, "class:{}", code),
        }
    }
}

/// What a map surface needs to draw a layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerSource {
    /// XYZ raster tiles
    Tiles {
        url_template: String,
        attribution: Option<String>,
        opacity: f32,
    },
    /// Vector outline drawn from a GeoJSON geometry
    Vector {
        geometry: geojson::Geometry,
        stroke: Rgb,
    },
}

/// Opaque reference to one renderable overlay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerHandle {
    id: String,
    name: String,
    source: LayerSource,
}

impl LayerHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>, source: LayerSource) -> Self {
        LayerHandle {
            id: id.into(),
            name: name.into(),
            source,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name for layer controls
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &LayerSource {
        &self.source
    }
}

/// Rendering surface the registry drives (a web map, a headless recorder, ...)
pub trait MapSurface {
    fn add_layer(&mut self, handle: &LayerHandle);
    fn remove_layer(&mut self, handle: &LayerHandle);
    fn is_visible(&self, handle: &LayerHandle) -> bool;
}

/// Headless surface keeping the visible layer stack in memory.
/// Counts add/remove calls so callers can check for redundant updates.
#[derive(Debug, Clone, Default)]
pub struct MemorySurface {
    visible: Vec<String>,
    add_calls: usize,
    remove_calls: usize,
}

impl MemorySurface {
    pub fn new() -> Self {
        MemorySurface::default()
    }

    /// Layer ids in stacking order, bottom first
    pub fn visible_ids(&self) -> &[String] {
        &self.visible
    }

    pub fn add_calls(&self) -> usize {
        self.add_calls
    }

    pub fn remove_calls(&self) -> usize {
        self.remove_calls
    }

    pub fn reset_counters(&mut self) {
        self.add_calls = 0;
        self.remove_calls = 0;
    }
}

impl MapSurface for MemorySurface {
    fn add_layer(&mut self, handle: &LayerHandle) {
        self.add_calls += 1;
        if !self.visible.iter().any(|id| id == handle.id()) {
            self.visible.push(handle.id().to_string());
        }
    }

    fn remove_layer(&mut self, handle: &LayerHandle) {
        self.remove_calls += 1;
        self.visible.retain(|id| id != handle.id());
    }

    fn is_visible(&self, handle: &LayerHandle) -> bool {
        self.visible.iter().any(|id| id == handle.id())
    }
}

/// Owns the key → handle mapping and is the only component that touches
/// layer visibility on the surface.
///
/// Visibility is read back from the surface rather than cached, so layers
/// the user toggled through the map's own controls are accounted for.
pub struct LayerRegistry<M: MapSurface> {
    surface: M,
    layers: BTreeMap<LayerKey, LayerHandle>,
}

impl<M: MapSurface> LayerRegistry<M> {
    pub fn new(surface: M) -> Self {
        LayerRegistry {
            surface,
            layers: BTreeMap::new(),
        }
    }

    pub fn register_full(&mut self, handle: LayerHandle) -> DashResult<()> {
        self.register(LayerKey::Full, handle)
    }

    pub fn register_boundary(&mut self, handle: LayerHandle) -> DashResult<()> {
        self.register(LayerKey::Boundary, handle)
    }

    pub fn register_class(&mut self, code: ClassCode, handle: LayerHandle) -> DashResult<()> {
        self.register(LayerKey::Class(code), handle)
    }

    fn register(&mut self, key: LayerKey, handle: LayerHandle) -> DashResult<()> {
        if self.layers.contains_key(&key) {
            return Err(DashboardError::DuplicateRegistration(key));
        }
        tracing::debug!(%key, id = handle.id(), "layer registered");
        self.layers.insert(key, handle);
        Ok(())
    }

    pub fn contains(&self, key: LayerKey) -> bool {
        self.layers.contains_key(&key)
    }

    pub fn handle(&self, key: LayerKey) -> Option<&LayerHandle> {
        self.layers.get(&key)
    }

    /// Registered class codes, ascending
    pub fn class_codes(&self) -> impl Iterator<Item = ClassCode> + '_ {
        self.layers.keys().filter_map(|key| match key {
            LayerKey::Class(code) => Some(*code),
            _ => None,
        })
    }

    pub fn is_visible(&self, key: LayerKey) -> bool {
        self.layers
            .get(&key)
            .map(|handle| self.surface.is_visible(handle))
            .unwrap_or(false)
    }

    pub fn visible_keys(&self) -> BTreeSet<LayerKey> {
        self.layers
            .iter()
            .filter(|(_, handle)| self.surface.is_visible(handle))
            .map(|(key, _)| *key)
            .collect()
    }

    /// Show a layer. Already visible is a no-op.
    pub fn show(&mut self, key: LayerKey) -> DashResult<()> {
        let handle = self
            .layers
            .get(&key)
            .ok_or(DashboardError::UnregisteredLayer(key))?;
        if !self.surface.is_visible(handle) {
            self.surface.add_layer(handle);
        }
        Ok(())
    }

    /// Hide a layer. Already hidden is a no-op.
    pub fn hide(&mut self, key: LayerKey) -> DashResult<()> {
        let handle = self
            .layers
            .get(&key)
            .ok_or(DashboardError::UnregisteredLayer(key))?;
        if self.surface.is_visible(handle) {
            self.surface.remove_layer(handle);
        }
        Ok(())
    }

    /// Make `keys` exactly the visible set.
    ///
    /// Only the delta is touched, and new layers are added before stale ones
    /// are removed, so the map never goes blank between the two steps. The
    /// surface repaints after control returns to the event loop, which hides
    /// the brief overlap. Unregistered keys fail before anything changes.
    pub fn show_only(&mut self, keys: &BTreeSet<LayerKey>) -> DashResult<()> {
        if let Some(missing) = keys.iter().find(|key| !self.layers.contains_key(key)) {
            return Err(DashboardError::UnregisteredLayer(*missing));
        }

        let mut shown = 0usize;
        for key in keys {
            let handle = &self.layers[key];
            if !self.surface.is_visible(handle) {
                self.surface.add_layer(handle);
                shown += 1;
            }
        }

        let mut hidden = 0usize;
        for (key, handle) in &self.layers {
            if !keys.contains(key) && self.surface.is_visible(handle) {
                self.surface.remove_layer(handle);
                hidden += 1;
            }
        }

        tracing::trace!(shown, hidden, "visibility updated");
        Ok(())
    }

    pub fn surface(&self) -> &M {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut M {
        &mut self.surface
    }

    pub fn into_surface(self) -> M {
        self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiles(id: &str) -> LayerHandle {
        LayerHandle::new(
            id,
            id,
            LayerSource::Tiles {
                url_template: format!("https://tiles.example.org/{}/{{z}}/{{x}}/{{y}}.png", id),
                attribution: None,
                opacity: 1.0,
            },
        )
    }

    fn registry() -> LayerRegistry<MemorySurface> {
        let mut registry = LayerRegistry::new(MemorySurface::new());
        registry.register_full(tiles("full")).unwrap();
        for code in [10u16, 20, 30, 40, 50] {
            registry
                .register_class(ClassCode(code), tiles(&format!("class-{}", code)))
                .unwrap();
        }
        registry
    }

    fn set(keys: &[LayerKey]) -> BTreeSet<LayerKey> {
        keys.iter().copied().collect()
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = registry();
        assert_eq!(
            registry.register_full(tiles("full-2")),
            Err(DashboardError::DuplicateRegistration(LayerKey::Full))
        );
        assert_eq!(
            registry.register_class(ClassCode(10), tiles("again")),
            Err(DashboardError::DuplicateRegistration(LayerKey::Class(ClassCode(10))))
        );
    }

    #[test]
    fn test_show_hide_idempotent() {
        let mut registry = registry();
        registry.show(LayerKey::Full).unwrap();
        registry.show(LayerKey::Full).unwrap();
        assert_eq!(registry.surface().add_calls(), 1);
        assert!(registry.is_visible(LayerKey::Full));

        registry.hide(LayerKey::Full).unwrap();
        registry.hide(LayerKey::Full).unwrap();
        assert_eq!(registry.surface().remove_calls(), 1);
        assert!(!registry.is_visible(LayerKey::Full));
    }

    #[test]
    fn test_show_unregistered() {
        let mut registry = registry();
        assert_eq!(
            registry.show(LayerKey::Boundary),
            Err(DashboardError::UnregisteredLayer(LayerKey::Boundary))
        );
    }

    #[test]
    fn test_show_only_switches_layers() {
        let mut registry = registry();
        registry.show_only(&set(&[LayerKey::Full])).unwrap();
        registry
            .show_only(&set(&[LayerKey::Class(ClassCode(20))]))
            .unwrap();
        assert_eq!(
            registry.visible_keys(),
            set(&[LayerKey::Class(ClassCode(20))])
        );
        assert_eq!(registry.surface().visible_ids(), ["class-20".to_string()]);
    }

    #[test]
    fn test_show_only_no_redundant_calls() {
        let mut registry = registry();
        let keys = set(&[LayerKey::Class(ClassCode(30))]);
        registry.show_only(&keys).unwrap();
        let adds = registry.surface().add_calls();
        let removes = registry.surface().remove_calls();

        registry.show_only(&keys).unwrap();
        assert_eq!(registry.surface().add_calls(), adds);
        assert_eq!(registry.surface().remove_calls(), removes);
        assert_eq!(registry.visible_keys(), keys);
    }

    #[test]
    fn test_show_only_touches_only_delta() {
        let mut registry = registry();
        registry.show_only(&set(&[LayerKey::Full])).unwrap();
        registry.surface_mut().reset_counters();

        registry
            .show_only(&set(&[LayerKey::Full, LayerKey::Class(ClassCode(10))]))
            .unwrap();
        assert_eq!(registry.surface().add_calls(), 1);
        assert_eq!(registry.surface().remove_calls(), 0);
    }

    #[test]
    fn test_show_only_adds_before_removing() {
        let mut registry = registry();
        registry
            .show_only(&set(&[LayerKey::Class(ClassCode(10))]))
            .unwrap();
        registry
            .show_only(&set(&[LayerKey::Class(ClassCode(50))]))
            .unwrap();
        // The new layer was stacked before the old one was removed, so the
        // surface was never empty.
        assert_eq!(registry.surface().visible_ids(), ["class-50".to_string()]);
        assert_eq!(registry.surface().add_calls(), 2);
        assert_eq!(registry.surface().remove_calls(), 1);
    }

    #[test]
    fn test_show_only_rejects_unregistered_without_side_effects() {
        let mut registry = registry();
        registry.show_only(&set(&[LayerKey::Full])).unwrap();
        registry.surface_mut().reset_counters();

        let result = registry.show_only(&set(&[
            LayerKey::Class(ClassCode(10)),
            LayerKey::Class(ClassCode(999)),
        ]));
        assert_eq!(
            result,
            Err(DashboardError::UnregisteredLayer(LayerKey::Class(ClassCode(999))))
        );
        assert_eq!(registry.surface().add_calls(), 0);
        assert_eq!(registry.visible_keys(), set(&[LayerKey::Full]));
    }

    #[test]
    fn test_user_toggled_layer_is_respected() {
        let mut registry = registry();
        registry.show_only(&set(&[LayerKey::Full])).unwrap();

        // Layer removed through the map's own layer control
        let handle = registry.handle(LayerKey::Full).unwrap().clone();
        registry.surface_mut().remove_layer(&handle);
        registry.surface_mut().reset_counters();

        registry.show_only(&set(&[LayerKey::Full])).unwrap();
        assert_eq!(registry.surface().add_calls(), 1);
        assert!(registry.is_visible(LayerKey::Full));
    }

    #[test]
    fn test_class_codes() {
        let registry = registry();
        let codes: Vec<u16> = registry.class_codes().map(ClassCode::value).collect();
        assert_eq!(codes, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_layer_ids() {
        assert_eq!(LayerKey::Full.layer_id(), "full");
        assert_eq!(LayerKey::Class(ClassCode(95)).layer_id(), "class-95");
    }
}
