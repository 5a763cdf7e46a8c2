use anyhow::{Context, Result};

use crate::collect::region_stats::RegionStatsSource;
use crate::commons::export::ExportSink;
use crate::config::DashboardConfig;
use crate::geo_core::{Basemap, BoundingBox, GeoCore, MapView};
use crate::geometric::filter_controller::FilterController;
use crate::geometric::land_cover::ClassTable;
use crate::geometric::layer_registry::{LayerRegistry, MapSurface};
use crate::geometric::stats_renderer::StatsRenderer;
use crate::geometric::stats_store::StatsStore;
use crate::geometric::tile_source::{boundary_layer, TileSource, XyzTileSource};

/// A bootstrapped dashboard session
pub struct Dashboard<M: MapSurface> {
    pub controller: FilterController<M>,
    pub geo_core: GeoCore,
    pub view: MapView,
    pub basemap: Basemap,
    region_id: String,
}

impl<M: MapSurface> Dashboard<M> {
    pub fn region_id(&self) -> &str {
        &self.region_id
    }

    /// Hand the current statistics to an export sink
    pub fn export_stats<E: ExportSink>(&self, sink: &mut E) -> Result<()> {
        let store = self.controller.store();
        if !store.is_available() {
            anyhow::bail!("No statistics available for {}", self.region_id);
        }
        let label = format!("{}_SDG15_LULC", self.region_id);
        sink.export(&store.group_result(), &label)
            .context(format!("Failed to export statistics for {}", self.region_id))
    }
}

/// Wires a session together: boundary, layers, statistics, controller
pub struct BootstrapLoader<T: TileSource> {
    region_id: String,
    classes: ClassTable,
    tiles: T,
    geo_core: GeoCore,
    zoom: u8,
    basemap: Basemap,
}

impl BootstrapLoader<XyzTileSource> {
    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        config.validate()?;
        let mut loader = BootstrapLoader::new(
            config.region_id.clone(),
            config.class_table()?,
            config.tile_source()?,
        );
        loader.geo_core.set_epsg(config.epsg);
        loader.geo_core.set_output_path(config.output_path.clone());
        loader.zoom = config.zoom;
        loader.basemap = config.basemap();
        Ok(loader)
    }
}

impl<T: TileSource> BootstrapLoader<T> {
    pub fn new(region_id: impl Into<String>, classes: ClassTable, tiles: T) -> Self {
        BootstrapLoader {
            region_id: region_id.into(),
            classes,
            tiles,
            geo_core: GeoCore::default(),
            zoom: crate::collect::global_variables::DEFAULT_ZOOM,
            basemap: Basemap::default(),
        }
    }

    /// Register the full layer, the boundary (when known) and one layer per
    /// class. Nothing is added to the surface yet.
    pub fn build_registry<M: MapSurface>(
        &self,
        surface: M,
        boundary: Option<geojson::Geometry>,
    ) -> Result<LayerRegistry<M>> {
        let mut registry = LayerRegistry::new(surface);

        let full = self
            .tiles
            .full_layer(&self.classes)
            .context("Failed to build full classification layer")?;
        registry.register_full(full)?;

        if let Some(geometry) = boundary {
            registry.register_boundary(boundary_layer(&self.region_id, geometry))?;
        }

        for class in self.classes.iter() {
            let layer = self
                .tiles
                .class_layer(class)
                .context(format!("Failed to build layer for class {}", class.code))?;
            registry.register_class(class.code, layer)?;
        }

        Ok(registry)
    }

    /// Fetch the region once (boundary and statistics) and return a session in the
    /// `Unfiltered` state. Data errors leave the statistics unavailable;
    /// only layer construction errors are fatal.
    pub async fn load<M, S>(mut self, surface: M, source: &S) -> Result<Dashboard<M>>
    where
        M: MapSurface,
        S: RegionStatsSource,
    {
        tracing::info!(region_id = %self.region_id, "bootstrapping dashboard");

        // One fetch serves both the boundary and the first statistics load
        let (boundary, groups) = match source.fetch_region(&self.region_id).await {
            Ok(region) => (region.geometry, Ok(region.groups)),
            Err(err) => {
                tracing::warn!(error = %err, "region data unavailable");
                (None, Err(err))
            }
        };

        if let Some(geometry) = &boundary {
            match BoundingBox::from_geojson_geometry(geometry) {
                Ok(bbox) => self.geo_core.set_bbox(Some(bbox)),
                Err(err) => tracing::warn!(error = %err, "could not compute region extent"),
            }
        }

        let registry = self.build_registry(surface, boundary)?;
        let renderer = StatsRenderer::new(self.classes.clone());
        let mut controller = FilterController::new(registry, StatsStore::new(), renderer);
        controller
            .reset()
            .context("Failed to show default layers")?;

        let token = controller.begin_reload();
        controller.complete_reload(token, groups);

        let view = self.geo_core.map_view(self.zoom);
        Ok(Dashboard {
            controller,
            geo_core: self.geo_core,
            view,
            basemap: self.basemap,
            region_id: self.region_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::region_stats::{RegionFeature, StaticFileSource};
    use crate::error::{DashResult, DashboardError};
    use crate::geometric::filter_controller::FilterState;
    use crate::geometric::land_cover::{ClassCode, ClassInfo};
    use crate::geometric::layer_registry::{LayerHandle, LayerKey, LayerSource, MemorySurface};
    use crate::geometric::stats_store::{AreaAggregate, GroupResult};
    use futures::executor::block_on;
    use std::cell::Cell;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn data_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data")
    }

    fn loader() -> BootstrapLoader<XyzTileSource> {
        BootstrapLoader::from_config(&DashboardConfig::default()).unwrap()
    }

    #[test]
    fn test_bootstrap_from_static_file() {
        let source = StaticFileSource::new(data_dir());
        let dashboard = block_on(loader().load(MemorySurface::new(), &source)).unwrap();

        let controller = &dashboard.controller;
        assert_eq!(controller.state(), FilterState::Unfiltered);
        assert!(controller.store().is_available());
        assert_eq!(controller.payload().view().unwrap().lines.len(), 11);

        let expected: BTreeSet<LayerKey> = [LayerKey::Full, LayerKey::Boundary].into_iter().collect();
        assert_eq!(controller.registry().visible_keys(), expected);
        assert_eq!(controller.registry().class_codes().count(), 11);

        assert!(dashboard.geo_core.get_bbox().is_some());
        assert!(dashboard.view.center_lat > 8.0 && dashboard.view.center_lat < 36.0);
        assert_eq!(dashboard.view.zoom, 5);
    }

    #[test]
    fn test_bootstrap_with_missing_data() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticFileSource::new(dir.path());
        let dashboard = block_on(loader().load(MemorySurface::new(), &source)).unwrap();

        let controller = &dashboard.controller;
        assert!(controller.payload().is_unavailable());
        // No boundary either: only the full layer is shown
        let expected: BTreeSet<LayerKey> = std::iter::once(LayerKey::Full).collect();
        assert_eq!(controller.registry().visible_keys(), expected);
        assert_eq!(
            (dashboard.view.center_lat, dashboard.view.center_lon),
            crate::collect::global_variables::DEFAULT_CENTER
        );
    }

    /// Tile source without per-class tiles
    struct FullOnlyTiles;

    impl TileSource for FullOnlyTiles {
        fn full_layer(&self, _classes: &ClassTable) -> Result<LayerHandle> {
            Ok(LayerHandle::new(
                "full",
                "full",
                LayerSource::Tiles {
                    url_template: "https://t.example.org/{z}/{x}/{y}".into(),
                    attribution: None,
                    opacity: 1.0,
                },
            ))
        }

        fn class_layer(&self, class: &ClassInfo) -> Result<LayerHandle> {
            anyhow::bail!("no tiles for class {}", class.code)
        }
    }

    #[test]
    fn test_layer_construction_errors_are_fatal() {
        let loader = BootstrapLoader::new("India", ClassTable::worldcover(), FullOnlyTiles);
        let source = StaticFileSource::new(data_dir());
        assert!(block_on(loader.load(MemorySurface::new(), &source)).is_err());
    }

    /// Counts every kind of fetch
    #[derive(Default)]
    struct CountingSource {
        group_fetches: Cell<usize>,
        boundary_fetches: Cell<usize>,
        region_fetches: Cell<usize>,
    }

    impl RegionStatsSource for CountingSource {
        async fn fetch_group_result(&self, region_id: &str) -> DashResult<GroupResult> {
            self.group_fetches.set(self.group_fetches.get() + 1);
            Ok(self.fetch_region(region_id).await?.groups)
        }

        async fn fetch_boundary(&self, _region_id: &str) -> DashResult<Option<geojson::Geometry>> {
            self.boundary_fetches.set(self.boundary_fetches.get() + 1);
            Ok(None)
        }

        async fn fetch_region(&self, _region_id: &str) -> DashResult<RegionFeature> {
            self.region_fetches.set(self.region_fetches.get() + 1);
            Ok(RegionFeature {
                groups: GroupResult::new(vec![AreaAggregate::new(10, 1_000_000.0)]),
                geometry: None,
            })
        }
    }

    #[test]
    fn test_bootstrap_fetches_region_once() {
        let source = CountingSource::default();
        let dashboard = block_on(loader().load(MemorySurface::new(), &source)).unwrap();
        assert!(dashboard.controller.store().is_available());
        assert_eq!(source.region_fetches.get(), 1);
        assert_eq!(source.group_fetches.get(), 0);
        assert_eq!(source.boundary_fetches.get(), 0);
    }

    #[test]
    fn test_basemap_from_config() {
        let config = DashboardConfig {
            basemap_url: "https://tiles.example.org/{z}/{x}/{y}.png".to_string(),
            basemap_attribution: "Example".to_string(),
            ..DashboardConfig::default()
        };
        let loader = BootstrapLoader::from_config(&config).unwrap();
        let dashboard = block_on(loader.load(MemorySurface::new(), &EmptySource)).unwrap();
        assert_eq!(dashboard.basemap, config.basemap());
        // The basemap never goes through the layer registry
        assert!(!dashboard
            .controller
            .registry()
            .surface()
            .visible_ids()
            .iter()
            .any(|id| id.contains("basemap")));
    }

    struct EmptySource;

    impl RegionStatsSource for EmptySource {
        async fn fetch_group_result(&self, _region_id: &str) -> DashResult<GroupResult> {
            Err(DashboardError::SourceUnavailable("no network".into()))
        }
    }

    #[test]
    fn test_export_requires_data() {
        struct NullSink;
        impl ExportSink for NullSink {
            fn export(&mut self, _groups: &GroupResult, _label: &str) -> Result<()> {
                Ok(())
            }
        }

        let dashboard = block_on(loader().load(MemorySurface::new(), &EmptySource)).unwrap();
        assert!(dashboard.export_stats(&mut NullSink).is_err());
        assert_eq!(dashboard.region_id(), "India");

        let mut dashboard = block_on(loader().load(
            MemorySurface::new(),
            &StaticFileSource::new(data_dir()),
        ))
        .unwrap();
        dashboard.controller.select_class(ClassCode(10)).unwrap();
        assert!(dashboard.export_stats(&mut NullSink).is_ok());
    }
}
