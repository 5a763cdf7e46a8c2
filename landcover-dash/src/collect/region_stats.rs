use anyhow::{Context, Result};
use geojson::{Feature, GeoJson};
use std::path::{Path, PathBuf};

use crate::collect::global_variables::{region_file_name, validate_region_id, REGION_FILE_TEMPLATE};
use crate::error::{DashResult, DashboardError};
use crate::geometric::stats_store::GroupResult;

/// Supplies precomputed per-class area sums for a region.
///
/// Implementations are consumed on a single-threaded event loop, so the
/// futures are not required to be `Send`.
#[allow(async_fn_in_trait)]
pub trait RegionStatsSource {
    async fn fetch_group_result(&self, region_id: &str) -> DashResult<GroupResult>;

    /// Region outline, when the source carries one
    async fn fetch_boundary(&self, region_id: &str) -> DashResult<Option<geojson::Geometry>> {
        let _ = region_id;
        Ok(None)
    }

    /// Statistics and outline together. Sources backed by a single file
    /// override this to read it once.
    async fn fetch_region(&self, region_id: &str) -> DashResult<RegionFeature> {
        let groups = self.fetch_group_result(region_id).await?;
        let geometry = match self.fetch_boundary(region_id).await {
            Ok(geometry) => geometry,
            Err(err) => {
                tracing::warn!(region_id, error = %err, "boundary unavailable");
                None
            }
        };
        Ok(RegionFeature { groups, geometry })
    }
}

/// One region feature of a statistics file
#[derive(Debug, Clone)]
pub struct RegionFeature {
    pub groups: GroupResult,
    pub geometry: Option<geojson::Geometry>,
}

/// Parse a statistics file: a GeoJSON Feature (or the first feature of a
/// FeatureCollection) whose properties hold a `groups` array of
/// `{class, sum}` records. Table exports that stringify the array are
/// accepted too.
pub fn parse_region_geojson(text: &str) -> Result<RegionFeature> {
    let geojson: GeoJson = text.parse().context("Invalid GeoJSON")?;

    let feature: Feature = match geojson {
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .next()
            .context("FeatureCollection has no features")?,
        GeoJson::Feature(f) => f,
        GeoJson::Geometry(_) => anyhow::bail!("Expected a Feature or FeatureCollection"),
    };

    let groups_value = feature
        .property("groups")
        .context("Feature has no 'groups' property")?;

    let groups: GroupResult = match groups_value {
        serde_json::Value::String(encoded) => {
            serde_json::from_str(encoded).context("Failed to parse stringified 'groups'")?
        }
        value => serde_json::from_value(value.clone()).context("Failed to parse 'groups'")?,
    };

    Ok(RegionFeature {
        groups,
        geometry: feature.geometry,
    })
}

/// Reads `<data_dir>/<region>_SDG15_LULC_FINAL.geojson`
#[derive(Debug, Clone)]
pub struct StaticFileSource {
    data_dir: PathBuf,
    file_template: String,
}

impl StaticFileSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        StaticFileSource {
            data_dir: data_dir.into(),
            file_template: REGION_FILE_TEMPLATE.to_string(),
        }
    }

    pub fn with_file_template(mut self, template: impl Into<String>) -> Self {
        self.file_template = template.into();
        self
    }

    /// Path of a region's file; ids that would leave `data_dir` are rejected
    pub fn path_for(&self, region_id: &str) -> Result<PathBuf> {
        validate_region_id(region_id)?;
        Ok(self
            .data_dir
            .join(region_file_name(&self.file_template, region_id)))
    }

    pub fn read_region(&self, region_id: &str) -> Result<RegionFeature> {
        let path = self.path_for(region_id)?;
        read_region_file(&path)
    }
}

pub fn read_region_file(path: &Path) -> Result<RegionFeature> {
    let text = std::fs::read_to_string(path)
        .context(format!("Failed to read statistics file: {:?}", path))?;
    parse_region_geojson(&text).context(format!("Failed to parse statistics file: {:?}", path))
}

/// Source errors become `SourceUnavailable` when the file or host cannot be
/// reached, `Parse` when the payload is malformed.
fn classify(err: anyhow::Error) -> DashboardError {
    let message = format!("{:#}", err);
    if err.chain().any(|cause| cause.is::<std::io::Error>()) {
        DashboardError::SourceUnavailable(message)
    } else {
        DashboardError::Parse(message)
    }
}

impl RegionStatsSource for StaticFileSource {
    async fn fetch_group_result(&self, region_id: &str) -> DashResult<GroupResult> {
        let region = self.read_region(region_id).map_err(classify)?;
        tracing::info!(region_id, classes = region.groups.len(), "statistics file read");
        Ok(region.groups)
    }

    async fn fetch_boundary(&self, region_id: &str) -> DashResult<Option<geojson::Geometry>> {
        let region = self.read_region(region_id).map_err(classify)?;
        Ok(region.geometry)
    }

    async fn fetch_region(&self, region_id: &str) -> DashResult<RegionFeature> {
        self.read_region(region_id).map_err(classify)
    }
}

#[cfg(feature = "reqwest")]
pub use self::http::{EngineStatsSource, HttpGeoJsonSource};

#[cfg(feature = "reqwest")]
mod http {
    use anyhow::Context;
    use url::Url;

    use super::{parse_region_geojson, RegionFeature, RegionStatsSource};
    use crate::collect::global_variables::{region_file_name, REGION_FILE_TEMPLATE};
    use crate::collect::zonal_query::{ZonalStatsQuery, ZonalStatsResponse};
    use crate::error::{DashResult, DashboardError};
    use crate::geometric::stats_store::GroupResult;

    fn unavailable(err: reqwest::Error) -> DashboardError {
        DashboardError::SourceUnavailable(err.to_string())
    }

    /// Statistics files served over HTTP: `<base_url>/<region>_SDG15_LULC_FINAL.geojson`
    #[derive(Debug, Clone)]
    pub struct HttpGeoJsonSource {
        client: reqwest::Client,
        base_url: Url,
        file_template: String,
    }

    impl HttpGeoJsonSource {
        pub fn new(base_url: &str) -> anyhow::Result<Self> {
            let mut base_url =
                Url::parse(base_url).context(format!("Invalid statistics base URL: {}", base_url))?;
            if !base_url.path().ends_with('/') {
                let path = format!("{}/", base_url.path());
                base_url.set_path(&path);
            }
            Ok(HttpGeoJsonSource {
                client: reqwest::Client::new(),
                base_url,
                file_template: REGION_FILE_TEMPLATE.to_string(),
            })
        }

        pub fn url_for(&self, region_id: &str) -> DashResult<Url> {
            let encoded = urlencoding::encode(region_id);
            self.base_url
                .join(&region_file_name(&self.file_template, &encoded))
                .map_err(|e| DashboardError::SourceUnavailable(e.to_string()))
        }

        async fn fetch_text(&self, region_id: &str) -> DashResult<String> {
            let url = self.url_for(region_id)?;
            tracing::debug!(%url, "fetching statistics");
            self.client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(unavailable)?
                .text()
                .await
                .map_err(unavailable)
        }
    }

    impl RegionStatsSource for HttpGeoJsonSource {
        async fn fetch_group_result(&self, region_id: &str) -> DashResult<GroupResult> {
            Ok(self.fetch_region(region_id).await?.groups)
        }

        async fn fetch_boundary(&self, region_id: &str) -> DashResult<Option<geojson::Geometry>> {
            Ok(self.fetch_region(region_id).await?.geometry)
        }

        async fn fetch_region(&self, region_id: &str) -> DashResult<RegionFeature> {
            let text = self.fetch_text(region_id).await?;
            parse_region_geojson(&text).map_err(|e| DashboardError::Parse(format!("{:#}", e)))
        }
    }

    /// Engine endpoint that runs a `ZonalStatsQuery` and answers `{"groups": [...]}`
    #[derive(Debug, Clone)]
    pub struct EngineStatsSource {
        client: reqwest::Client,
        endpoint: Url,
        scale: f64,
    }

    impl EngineStatsSource {
        pub fn new(endpoint: &str, scale: f64) -> anyhow::Result<Self> {
            let endpoint =
                Url::parse(endpoint).context(format!("Invalid engine endpoint: {}", endpoint))?;
            Ok(EngineStatsSource {
                client: reqwest::Client::new(),
                endpoint,
                scale,
            })
        }
    }

    impl RegionStatsSource for EngineStatsSource {
        async fn fetch_group_result(&self, region_id: &str) -> DashResult<GroupResult> {
            let query = ZonalStatsQuery::worldcover(region_id).with_scale(self.scale);
            tracing::info!(endpoint = %self.endpoint, region_id, "submitting zonal statistics query");
            let response: ZonalStatsResponse = self
                .client
                .post(self.endpoint.clone())
                .json(&query)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(unavailable)?
                .json()
                .await
                .map_err(|e| DashboardError::Parse(e.to_string()))?;
            response.groups.ok_or(DashboardError::EmptyData)
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::land_cover::ClassCode;
    use futures::executor::block_on;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "Polygon", "coordinates": [[[68.0, 8.0], [97.0, 8.0], [97.0, 37.0], [68.0, 37.0], [68.0, 8.0]]]},
            "properties": {
                "country_na": "India",
                "groups": [{"class": 10, "sum": 5000000.0}, {"class": 50, "sum": 15000000.0}]
            }
        }]
    }"#;

    #[test]
    fn test_parse_feature_collection() {
        let region = parse_region_geojson(SAMPLE).unwrap();
        assert_eq!(region.groups.len(), 2);
        assert_eq!(region.groups.0[1].code, ClassCode(50));
        assert!(region.geometry.is_some());
    }

    #[test]
    fn test_parse_single_feature_with_stringified_groups() {
        let text = r#"{
            "type": "Feature",
            "geometry": null,
            "properties": {"groups": "[{\"class\": 30, \"sum\": 2.0}]"}
        }"#;
        let region = parse_region_geojson(text).unwrap();
        assert_eq!(region.groups.0[0].code, ClassCode(30));
        assert!(region.geometry.is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_region_geojson("{}").is_err());
        assert!(parse_region_geojson(r#"{"type": "FeatureCollection", "features": []}"#).is_err());
        let no_groups = r#"{"type": "Feature", "geometry": null, "properties": {"name": "x"}}"#;
        assert!(parse_region_geojson(no_groups).is_err());
        let point = r#"{"type": "Point", "coordinates": [0.0, 0.0]}"#;
        assert!(parse_region_geojson(point).is_err());
    }

    #[test]
    fn test_static_file_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("India_SDG15_LULC_FINAL.geojson"), SAMPLE).unwrap();

        let source = StaticFileSource::new(dir.path());
        let groups = block_on(source.fetch_group_result("India")).unwrap();
        assert_eq!(groups.len(), 2);
        let boundary = block_on(source.fetch_boundary("India")).unwrap();
        assert!(boundary.is_some());
    }

    #[test]
    fn test_static_file_source_reads_region_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("India_SDG15_LULC_FINAL.geojson"), SAMPLE).unwrap();

        let region = block_on(StaticFileSource::new(dir.path()).fetch_region("India")).unwrap();
        assert_eq!(region.groups.len(), 2);
        assert!(region.geometry.is_some());
    }

    #[test]
    fn test_region_id_cannot_leave_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir(&data_dir).unwrap();
        std::fs::write(dir.path().join("secret_SDG15_LULC_FINAL.geojson"), SAMPLE).unwrap();

        let source = StaticFileSource::new(&data_dir);
        assert!(source.path_for("../secret").is_err());
        assert!(source.path_for("India").is_ok());
        assert!(block_on(source.fetch_group_result("../secret")).is_err());
        assert!(block_on(source.fetch_region("../secret")).is_err());
    }

    #[test]
    fn test_static_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticFileSource::new(dir.path());
        let err = block_on(source.fetch_group_result("Atlantis")).unwrap_err();
        assert!(matches!(err, DashboardError::SourceUnavailable(_)));
    }

    #[test]
    fn test_static_file_source_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Nepal.json"), "{not json").unwrap();
        let source = StaticFileSource::new(dir.path()).with_file_template("{region}.json");
        let err = block_on(source.fetch_group_result("Nepal")).unwrap_err();
        assert!(matches!(err, DashboardError::Parse(_)));
    }

    #[test]
    fn test_bundled_india_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("data")
            .join("India_SDG15_LULC_FINAL.geojson");
        let region = read_region_file(&path).unwrap();
        assert_eq!(region.groups.len(), 11);
    }
}
