use anyhow::Result;
use std::path::PathBuf;

pub const DATA_PATH: &str = "./data";

pub const DEFAULT_REGION: &str = "India";

/// Static statistics file per region; `{region}` is replaced by the region id
pub const REGION_FILE_TEMPLATE: &str = "{region}_SDG15_LULC_FINAL.geojson";

pub const WORLDCOVER_DATASET: &str = "ESA/WorldCover/v200/2021";
pub const WORLDCOVER_BAND: &str = "Map";
pub const BOUNDARY_DATASET: &str = "USDOS/LSIB_SIMPLE/2017";
pub const BOUNDARY_NAME_FIELD: &str = "country_na";

/// Zonal statistics parameters (metres, pixels)
pub const DEFAULT_SCALE_M: f64 = 500.0;
pub const DEFAULT_MAX_PIXELS: f64 = 1e13;
pub const DEFAULT_TILE_SCALE: u32 = 8;
/// Douglas-Peucker tolerance applied to the boundary before reduction, metres
pub const BOUNDARY_SIMPLIFY_M: f64 = 1000.0;

pub const DEFAULT_EPSG: i32 = 4326;
pub const DEFAULT_ZOOM: u8 = 5;
/// Map centre when no boundary is available (lat, lon)
pub const DEFAULT_CENTER: (f64, f64) = (22.5, 78.9);

pub const BASEMAP_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const BASEMAP_ATTRIBUTION: &str = "&copy; OpenStreetMap contributors";

pub const FULL_TILES_TEMPLATE: &str =
    "http://localhost:8080/worldcover/{z}/{x}/{y}.png?palette={palette}";
pub const CLASS_TILES_TEMPLATE: &str =
    "http://localhost:8080/worldcover/{z}/{x}/{y}.png?class={class}&color={color}";
pub const TILES_ATTRIBUTION: &str = "ESA WorldCover 2021";

pub fn get_data_path() -> PathBuf {
    PathBuf::from(DATA_PATH)
}

/// Region ids end up in file names: no separators, no parent references
pub fn validate_region_id(region_id: &str) -> Result<()> {
    if region_id.trim().is_empty() {
        anyhow::bail!("region id must not be empty");
    }
    if region_id.contains(['/', '\\', '\0']) || region_id.contains("..") {
        anyhow::bail!("invalid region id: {:?}", region_id);
    }
    Ok(())
}

/// File name of a region's statistics file
pub fn region_file_name(template: &str, region_id: &str) -> String {
    template.replace("{region}", region_id)
}
