use anyhow::{Context, Result};
use url::Url;

use crate::geometric::land_cover::{ClassInfo, ClassTable, Rgb};
use crate::geometric::layer_registry::{LayerHandle, LayerKey, LayerSource};

/// Produces renderable layers for the full classification or one class
pub trait TileSource {
    fn full_layer(&self, classes: &ClassTable) -> Result<LayerHandle>;
    fn class_layer(&self, class: &ClassInfo) -> Result<LayerHandle>;
}

/// XYZ tile templates.
///
/// Supported placeholders:
/// - `{z}`, `{x}`, `{y}`, `{s}`: left for the map client
/// - `{class}`: class code (class template only)
/// - `{color}`: class color as `rrggbb` (class template only)
/// - `{palette}`: comma separated full palette (full template only)
/// - `{name}`: url-encoded class name (class template only)
#[derive(Debug, Clone)]
pub struct XyzTileSource {
    full_template: String,
    class_template: String,
    attribution: Option<String>,
}

impl XyzTileSource {
    pub fn new(
        full_template: impl Into<String>,
        class_template: impl Into<String>,
        attribution: Option<String>,
    ) -> Result<Self> {
        let full_template = full_template.into();
        let class_template = class_template.into();
        validate_template(&full_template).context("Invalid full classification tile template")?;
        validate_template(&class_template).context("Invalid class tile template")?;
        Ok(XyzTileSource {
            full_template,
            class_template,
            attribution,
        })
    }

    fn tiles(&self, url_template: String) -> LayerSource {
        LayerSource::Tiles {
            url_template,
            attribution: self.attribution.clone(),
            opacity: 1.0,
        }
    }
}

impl TileSource for XyzTileSource {
    fn full_layer(&self, classes: &ClassTable) -> Result<LayerHandle> {
        let palette = classes.palette();
        let url_template = self
            .full_template
            .replace("{palette}", &palette.to_query_value());
        Ok(LayerHandle::new(
            LayerKey::Full.layer_id(),
            "ESA WorldCover 2021",
            self.tiles(url_template),
        ))
    }

    fn class_layer(&self, class: &ClassInfo) -> Result<LayerHandle> {
        let url_template = self
            .class_template
            .replace("{class}", &class.code.to_string())
            .replace("{color}", class.color.to_hex().trim_start_matches('#'))
            .replace("{name}", &urlencoding::encode(&class.name));
        Ok(LayerHandle::new(
            LayerKey::Class(class.code).layer_id(),
            class.name.clone(),
            self.tiles(url_template),
        ))
    }
}

/// Boundary outline layer from a region geometry
pub fn boundary_layer(name: &str, geometry: geojson::Geometry) -> LayerHandle {
    LayerHandle::new(
        LayerKey::Boundary.layer_id(),
        format!("{} Boundary", name),
        LayerSource::Vector {
            geometry,
            stroke: Rgb::new(0, 0, 0),
        },
    )
}

/// Substitute every placeholder with a sample value and check that the
/// result parses as an http(s) URL.
fn validate_template(template: &str) -> Result<()> {
    let sample = template
        .replace("{z}", "5")
        .replace("{x}", "23")
        .replace("{y}", "14")
        .replace("{s}", "a")
        .replace("{class}", "10")
        .replace("{color}", "006400")
        .replace("{palette}", "006400")
        .replace("{name}", "Tree%20cover");
    if sample.contains('{') || sample.contains('}') {
        anyhow::bail!("Unknown placeholder in tile template: {}", template);
    }
    let url = Url::parse(&sample).context(format!("Failed to parse tile URL: {}", template))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => anyhow::bail!("Unsupported tile URL scheme: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::land_cover::WorldCoverClass;

    fn source() -> XyzTileSource {
        XyzTileSource::new(
            "https://tiles.example.org/worldcover/{z}/{x}/{y}.png?palette={palette}",
            "https://tiles.example.org/worldcover/{z}/{x}/{y}.png?class={class}&color={color}",
            Some("ESA WorldCover".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_class_layer_template() {
        let layer = source()
            .class_layer(&ClassInfo::from(WorldCoverClass::BuiltUp))
            .unwrap();
        assert_eq!(layer.id(), "class-50");
        assert_eq!(layer.name(), "Built-up");
        match layer.source() {
            LayerSource::Tiles { url_template, .. } => {
                assert!(url_template.ends_with("?class=50&color=fa0000"));
                assert!(url_template.contains("{z}/{x}/{y}"));
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_full_layer_palette() {
        let layer = source().full_layer(&ClassTable::worldcover()).unwrap();
        assert_eq!(layer.id(), "full");
        match layer.source() {
            LayerSource::Tiles {
                url_template,
                attribution,
                ..
            } => {
                assert!(url_template.contains("palette=006400,ffbb22"));
                assert_eq!(attribution.as_deref(), Some("ESA WorldCover"));
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_class_name_is_encoded() {
        let source = XyzTileSource::new(
            "https://tiles.example.org/{z}/{x}/{y}.png",
            "https://tiles.example.org/{z}/{x}/{y}.png?label={name}",
            None,
        )
        .unwrap();
        let layer = source
            .class_layer(&ClassInfo::from(WorldCoverClass::SnowIce))
            .unwrap();
        match layer.source() {
            LayerSource::Tiles { url_template, .. } => {
                assert!(url_template.ends_with("label=Snow%20%26%20ice"));
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_invalid_templates() {
        assert!(XyzTileSource::new("not a url/{z}", "https://a.b/{z}", None).is_err());
        assert!(XyzTileSource::new("https://a.b/{z}/{w}", "https://a.b/{z}", None).is_err());
        assert!(XyzTileSource::new("ftp://a.b/{z}", "https://a.b/{z}", None).is_err());
    }

    #[test]
    fn test_boundary_layer() {
        let geometry = geojson::Geometry::new(geojson::Value::Point(vec![78.9, 22.5]));
        let layer = boundary_layer("India", geometry);
        assert_eq!(layer.id(), LayerKey::Boundary.layer_id());
        assert_eq!(layer.name(), "India Boundary");
    }
}
