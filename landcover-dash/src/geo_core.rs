use anyhow::{Context, Result};
use geo::{BoundingRect, Geometry as GeoGeometry, Point};
use serde::Serialize;

use crate::collect::global_variables::{
    BASEMAP_ATTRIBUTION, BASEMAP_URL, DEFAULT_CENTER, DEFAULT_EPSG,
};

/// Base struct for geospatial context of a dashboard session
/// Handles CRS (Coordinate Reference System), region extent and export path
#[derive(Clone, Debug)]
pub struct GeoCore {
    /// EPSG code of coordinates handed to the map
    pub epsg: i32,
    /// Region extent
    pub bbox: Option<BoundingBox>,
    /// Directory for exported tables
    pub output_path: Option<String>,
}

impl GeoCore {
    /// Create a new GeoCore with EPSG
    pub fn new(epsg: i32) -> Self {
        GeoCore {
            epsg,
            bbox: None,
            output_path: None,
        }
    }

    /// Get EPSG code
    pub fn get_epsg(&self) -> i32 {
        self.epsg
    }

    /// Set EPSG code
    pub fn set_epsg(&mut self, epsg: i32) {
        self.epsg = epsg;
    }

    /// Get bounding box
    pub fn get_bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    /// Set bounding box
    pub fn set_bbox(&mut self, bbox: Option<BoundingBox>) {
        self.bbox = bbox;
    }

    /// Get output path
    pub fn get_output_path(&self) -> Option<&String> {
        self.output_path.as_ref()
    }

    /// Set output path
    pub fn set_output_path(&mut self, output_path: Option<String>) {
        self.output_path = output_path;
    }

    /// Map view centred on the region extent, or on the default centre when
    /// no extent is known
    pub fn map_view(&self, zoom: u8) -> MapView {
        match self.bbox {
            Some(bbox) => {
                let center = bbox.center();
                MapView {
                    center_lat: center.y(),
                    center_lon: center.x(),
                    zoom,
                    epsg: self.epsg,
                }
            }
            None => MapView {
                center_lat: DEFAULT_CENTER.0,
                center_lon: DEFAULT_CENTER.1,
                zoom,
                epsg: self.epsg,
            },
        }
    }
}

impl Default for GeoCore {
    /// Default to EPSG:4326 (WGS84), the CRS web maps take
    fn default() -> Self {
        GeoCore::new(DEFAULT_EPSG)
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Extent of a GeoJSON geometry
    pub fn from_geojson_geometry(geometry: &geojson::Geometry) -> Result<Self> {
        let geo_geom: GeoGeometry<f64> = geometry
            .try_into()
            .context("Failed to convert GeoJSON geometry to geo geometry")?;
        let rect = geo_geom
            .bounding_rect()
            .context("Geometry has no extent")?;
        Ok(BoundingBox::new(
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y,
        ))
    }

    pub fn center(&self) -> Point<f64> {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

/// Initial map position
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapView {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: u8,
    /// CRS of the centre and of the boundary coordinates
    pub epsg: i32,
}

/// Background tiles under the overlays. Not a registry layer: class filters
/// never hide it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Basemap {
    pub url_template: String,
    pub attribution: String,
}

impl Default for Basemap {
    /// OpenStreetMap
    fn default() -> Self {
        Basemap {
            url_template: BASEMAP_URL.to_string(),
            attribution: BASEMAP_ATTRIBUTION.to_string(),
        }
    }
}
