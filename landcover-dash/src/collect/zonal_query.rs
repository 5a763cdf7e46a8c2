use serde::{Deserialize, Serialize};

use crate::collect::global_variables::{
    BOUNDARY_DATASET, BOUNDARY_NAME_FIELD, BOUNDARY_SIMPLIFY_M, DEFAULT_EPSG, DEFAULT_MAX_PIXELS,
    DEFAULT_SCALE_M, DEFAULT_TILE_SCALE, WORLDCOVER_BAND, WORLDCOVER_DATASET,
};
use crate::geometric::stats_store::GroupResult;

/// Grouped reducer: sum band 0 (pixel area), grouped on band `group_field`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedReducer {
    pub reducer: String,
    pub group_field: u32,
    pub group_name: String,
}

/// Region the reduction runs over: one feature of a boundary collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSelector {
    pub collection: String,
    pub name_field: String,
    pub name: String,
    pub simplify_m: f64,
}

/// Declarative description of the area-by-class reduction the engine runs.
///
/// The core never computes zonal statistics; it only describes the query and
/// consumes the `groups` it produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZonalStatsQuery {
    pub dataset: String,
    pub band: String,
    pub crs: String,
    pub region: RegionSelector,
    pub reducer: GroupedReducer,
    pub scale: f64,
    pub max_pixels: f64,
    pub tile_scale: u32,
}

impl ZonalStatsQuery {
    /// WorldCover pixel-area sum grouped by class over a country boundary
    pub fn worldcover(region_name: &str) -> Self {
        ZonalStatsQuery {
            dataset: WORLDCOVER_DATASET.to_string(),
            band: WORLDCOVER_BAND.to_string(),
            crs: format!("EPSG:{}", DEFAULT_EPSG),
            region: RegionSelector {
                collection: BOUNDARY_DATASET.to_string(),
                name_field: BOUNDARY_NAME_FIELD.to_string(),
                name: region_name.to_string(),
                simplify_m: BOUNDARY_SIMPLIFY_M,
            },
            reducer: GroupedReducer {
                reducer: "sum".to_string(),
                group_field: 1,
                group_name: "class".to_string(),
            },
            scale: DEFAULT_SCALE_M,
            max_pixels: DEFAULT_MAX_PIXELS,
            tile_scale: DEFAULT_TILE_SCALE,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

/// Engine reply: the reduction dictionary, of which only `groups` is used
#[derive(Debug, Clone, Deserialize)]
pub struct ZonalStatsResponse {
    pub groups: Option<GroupResult>,
}
