use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::collect::global_variables::{
    get_data_path, region_file_name, validate_region_id, CLASS_TILES_TEMPLATE, DEFAULT_EPSG,
    DEFAULT_REGION, DEFAULT_ZOOM, FULL_TILES_TEMPLATE, REGION_FILE_TEMPLATE, TILES_ATTRIBUTION,
};
use crate::geo_core::Basemap;
use crate::geometric::land_cover::{ClassInfo, ClassTable};
use crate::geometric::tile_source::XyzTileSource;

/// Dashboard settings, read from a JSON file. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    /// Region id, also the display name of the boundary layer
    pub region_id: String,
    pub data_dir: PathBuf,
    pub region_file_template: String,
    pub full_tiles_template: String,
    pub class_tiles_template: String,
    pub tiles_attribution: Option<String>,
    pub basemap_url: String,
    pub basemap_attribution: String,
    pub zoom: u8,
    pub epsg: i32,
    /// Custom class table; the WorldCover legend when absent
    pub classes: Option<Vec<ClassInfo>>,
    /// Directory for exported tables
    pub output_path: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let basemap = Basemap::default();
        DashboardConfig {
            region_id: DEFAULT_REGION.to_string(),
            data_dir: get_data_path(),
            region_file_template: REGION_FILE_TEMPLATE.to_string(),
            full_tiles_template: FULL_TILES_TEMPLATE.to_string(),
            class_tiles_template: CLASS_TILES_TEMPLATE.to_string(),
            tiles_attribution: Some(TILES_ATTRIBUTION.to_string()),
            basemap_url: basemap.url_template,
            basemap_attribution: basemap.attribution,
            zoom: DEFAULT_ZOOM,
            epsg: DEFAULT_EPSG,
            classes: None,
            output_path: None,
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DashboardConfig =
            serde_json::from_str(json).context("Failed to parse dashboard configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {:?}", path))?;
        Self::from_json_str(&text).context(format!("Invalid configuration file: {:?}", path))
    }

    pub fn validate(&self) -> Result<()> {
        validate_region_id(&self.region_id).context("Invalid region_id")?;
        if self.basemap_url.trim().is_empty() {
            anyhow::bail!("basemap_url must not be empty");
        }
        if !self.region_file_template.contains("{region}") {
            anyhow::bail!(
                "region_file_template must contain {{region}}: {}",
                self.region_file_template
            );
        }
        self.class_table()?;
        self.tile_source()?;
        Ok(())
    }

    pub fn class_table(&self) -> Result<ClassTable> {
        match &self.classes {
            Some(entries) => ClassTable::new(entries.clone()),
            None => Ok(ClassTable::worldcover()),
        }
    }

    pub fn tile_source(&self) -> Result<XyzTileSource> {
        XyzTileSource::new(
            self.full_tiles_template.clone(),
            self.class_tiles_template.clone(),
            self.tiles_attribution.clone(),
        )
    }

    pub fn basemap(&self) -> Basemap {
        Basemap {
            url_template: self.basemap_url.clone(),
            attribution: self.basemap_attribution.clone(),
        }
    }

    pub fn region_file_path(&self) -> PathBuf {
        self.data_dir
            .join(region_file_name(&self.region_file_template, &self.region_id))
    }
}
