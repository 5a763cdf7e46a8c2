use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use js_sys::Function;
use landcover_dash::collect::global_variables::region_file_name;
use landcover_dash::collect::region_stats::{parse_region_geojson, RegionFeature, RegionStatsSource};
use landcover_dash::config::DashboardConfig;
use landcover_dash::error::{DashResult, DashboardError};
use landcover_dash::geo_core::{Basemap, MapView};
use landcover_dash::geometric::filter_controller::{reload_shared, FilterController};
use landcover_dash::geometric::land_cover::ClassCode;
use landcover_dash::geometric::layer_registry::{LayerHandle, MapSurface};
use landcover_dash::geometric::stats_renderer::DisplayPayload;
use landcover_dash::geometric::stats_store::GroupResult;
use landcover_dash::BootstrapLoader;
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Initialize the WASM module with panic hook
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}

fn warn(message: &str) {
    web_sys::console::warn_1(&JsValue::from_str(message));
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|e| JsValue::from_str(&format!("Serialization failed: {}", e)))
}

/// Map surface backed by three JS callbacks.
///
/// `add(layer)` and `remove(layer)` receive the serialized layer handle
/// (`{id, name, source}`); `isVisible(id)` must answer from the map's own
/// state so that layers toggled in the map's layer control are seen.
pub struct JsMapSurface {
    add: Function,
    remove: Function,
    is_visible: Function,
}

impl JsMapSurface {
    pub fn new(add: Function, remove: Function, is_visible: Function) -> Self {
        JsMapSurface {
            add,
            remove,
            is_visible,
        }
    }

    fn call_with_layer(callback: &Function, handle: &LayerHandle) {
        let layer = match to_js(handle) {
            Ok(layer) => layer,
            Err(e) => {
                warn(&format!("Layer {} not serializable: {:?}", handle.id(), e));
                return;
            }
        };
        if let Err(e) = callback.call1(&JsValue::NULL, &layer) {
            warn(&format!("Map callback failed for layer {}: {:?}", handle.id(), e));
        }
    }
}

impl MapSurface for JsMapSurface {
    fn add_layer(&mut self, handle: &LayerHandle) {
        Self::call_with_layer(&self.add, handle);
    }

    fn remove_layer(&mut self, handle: &LayerHandle) {
        Self::call_with_layer(&self.remove, handle);
    }

    fn is_visible(&self, handle: &LayerHandle) -> bool {
        self.is_visible
            .call1(&JsValue::NULL, &JsValue::from_str(handle.id()))
            .map(|answer| answer.as_bool().unwrap_or(false))
            .unwrap_or(false)
    }
}

/// Statistics files served next to the page, fetched with `window.fetch`
pub struct FetchStatsSource {
    base_url: String,
    file_template: String,
}

impl FetchStatsSource {
    pub fn new(base_url: &str, file_template: &str) -> Self {
        FetchStatsSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            file_template: file_template.to_string(),
        }
    }

    pub fn url_for(&self, region_id: &str) -> String {
        let file_name = region_file_name(&self.file_template, region_id);
        format!("{}/{}", self.base_url, urlencoding::encode(&file_name))
    }

    async fn fetch_text(&self, url: &str) -> Result<String, JsValue> {
        use wasm_bindgen_futures::JsFuture;
        use web_sys::{Request, RequestInit, RequestMode};

        let opts = RequestInit::new();
        opts.set_method("GET");
        opts.set_mode(RequestMode::Cors);

        let request = Request::new_with_str_and_init(url, &opts)
            .map_err(|e| JsValue::from_str(&format!("Failed to create request: {:?}", e)))?;
        request
            .headers()
            .set("Accept", "application/geo+json, application/json")
            .map_err(|e| JsValue::from_str(&format!("Failed to set headers: {:?}", e)))?;

        let window =
            web_sys::window().ok_or_else(|| JsValue::from_str("No window object available"))?;

        let resp_value = JsFuture::from(window.fetch_with_request(&request))
            .await
            .map_err(|e| JsValue::from_str(&format!("Network request failed: {:?}", e)))?;

        let resp: web_sys::Response = resp_value
            .dyn_into()
            .map_err(|_| JsValue::from_str("Invalid response type"))?;

        if !resp.ok() {
            return Err(JsValue::from_str(&format!(
                "Statistics request error {}: {}",
                resp.status(),
                resp.status_text()
            )));
        }

        let text_promise = resp
            .text()
            .map_err(|e| JsValue::from_str(&format!("Failed to get response text: {:?}", e)))?;

        let text = JsFuture::from(text_promise)
            .await
            .map_err(|e| JsValue::from_str(&format!("Failed to read response: {:?}", e)))?;

        text.as_string()
            .ok_or_else(|| JsValue::from_str("Response is not a valid string"))
    }
}

impl RegionStatsSource for FetchStatsSource {
    async fn fetch_group_result(&self, region_id: &str) -> DashResult<GroupResult> {
        let region = self.fetch_region(region_id).await?;
        log(&format!(
            "Statistics loaded for {}: {} classes",
            region_id,
            region.groups.len()
        ));
        Ok(region.groups)
    }

    async fn fetch_boundary(&self, region_id: &str) -> DashResult<Option<geojson::Geometry>> {
        Ok(self.fetch_region(region_id).await?.geometry)
    }

    async fn fetch_region(&self, region_id: &str) -> DashResult<RegionFeature> {
        let url = self.url_for(region_id);
        let text = self
            .fetch_text(&url)
            .await
            .map_err(|e| DashboardError::SourceUnavailable(format!("{}: {:?}", url, e)))?;
        parse_region_geojson(&text).map_err(|e| DashboardError::Parse(format!("{:#}", e)))
    }
}

fn busy() -> JsValue {
    JsValue::from_str(&DashboardError::Busy.to_string())
}

/// Dashboard session for the browser.
///
/// Map callbacks run while the session is being updated; calls they make
/// back into the session fail with a "busy" error instead of panicking.
#[wasm_bindgen]
pub struct WasmDashboard {
    controller: Rc<RefCell<FilterController<JsMapSurface>>>,
    source: Rc<FetchStatsSource>,
    region_id: String,
    view: MapView,
    basemap: Basemap,
    stats_element_id: Option<String>,
}

impl WasmDashboard {
    pub fn from_controller(
        controller: FilterController<JsMapSurface>,
        source: FetchStatsSource,
        region_id: String,
        view: MapView,
        basemap: Basemap,
    ) -> Self {
        WasmDashboard {
            controller: Rc::new(RefCell::new(controller)),
            source: Rc::new(source),
            region_id,
            view,
            basemap,
            stats_element_id: None,
        }
    }

    fn controller(&self) -> Result<Ref<'_, FilterController<JsMapSurface>>, JsValue> {
        self.controller.try_borrow().map_err(|_| busy())
    }

    fn controller_mut(&self) -> Result<RefMut<'_, FilterController<JsMapSurface>>, JsValue> {
        self.controller.try_borrow_mut().map_err(|_| busy())
    }
}

#[wasm_bindgen]
impl WasmDashboard {
    /// Bootstrap a session
    ///
    /// # Arguments
    /// * `config_json` - Dashboard configuration as JSON (empty string for defaults)
    /// * `data_url` - Base URL the statistics files are served from
    /// * `add`, `remove`, `is_visible` - Map callbacks, see `JsMapSurface`
    ///
    /// # Errors
    /// Returns JsValue error if the configuration is invalid or the layers
    /// cannot be built. Missing statistics are not an error: the panel then
    /// shows "Statistics unavailable".
    #[wasm_bindgen]
    pub async fn create(
        config_json: String,
        data_url: String,
        add: Function,
        remove: Function,
        is_visible: Function,
    ) -> Result<WasmDashboard, JsValue> {
        let config = if config_json.trim().is_empty() {
            DashboardConfig::default()
        } else {
            DashboardConfig::from_json_str(&config_json)
                .map_err(|e| JsValue::from_str(&format!("Invalid configuration: {:#}", e)))?
        };

        let source = FetchStatsSource::new(&data_url, &config.region_file_template);

        let loader = BootstrapLoader::from_config(&config)
            .map_err(|e| JsValue::from_str(&format!("Invalid configuration: {:#}", e)))?;
        let surface = JsMapSurface::new(add, remove, is_visible);
        let dashboard = loader
            .load(surface, &source)
            .await
            .map_err(|e| JsValue::from_str(&format!("Bootstrap failed: {:#}", e)))?;

        log(&format!("Dashboard ready for {}", dashboard.region_id()));

        let region_id = dashboard.region_id().to_string();
        Ok(WasmDashboard::from_controller(
            dashboard.controller,
            source,
            region_id,
            dashboard.view,
            dashboard.basemap,
        ))
    }

    /// Write the statistics text into the element with this id after every update
    #[wasm_bindgen]
    pub fn bind_stats_element(&mut self, element_id: String) -> Result<(), JsValue> {
        self.stats_element_id = Some(element_id);
        let payload = self.controller()?.payload().clone();
        render_into(self.stats_element_id.as_deref(), &payload);
        Ok(())
    }

    /// Apply a class selection. Selecting the active class again resets.
    #[wasm_bindgen]
    pub fn select_class(&self, code: u16) -> Result<JsValue, JsValue> {
        let payload = self
            .controller_mut()?
            .select_class(ClassCode(code))
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        render_into(self.stats_element_id.as_deref(), &payload);
        to_js(&payload)
    }

    #[wasm_bindgen]
    pub fn reset(&self) -> Result<JsValue, JsValue> {
        let payload = self
            .controller_mut()?
            .reset()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        render_into(self.stats_element_id.as_deref(), &payload);
        to_js(&payload)
    }

    /// Refetch the statistics. Resolves to the new payload, or to `null`
    /// when a later reload superseded this one.
    #[wasm_bindgen]
    pub fn reload(&self) -> js_sys::Promise {
        let controller = Rc::clone(&self.controller);
        let source = Rc::clone(&self.source);
        let region_id = self.region_id.clone();
        let element_id = self.stats_element_id.clone();

        wasm_bindgen_futures::future_to_promise(async move {
            let outcome = reload_shared(&controller, &*source, &region_id)
                .await
                .map_err(|e| JsValue::from_str(&e.to_string()))?;
            match outcome {
                Some(payload) => {
                    render_into(element_id.as_deref(), &payload);
                    to_js(&payload)
                }
                None => Ok(JsValue::NULL),
            }
        })
    }

    /// Current display payload
    #[wasm_bindgen]
    pub fn payload(&self) -> Result<JsValue, JsValue> {
        to_js(self.controller()?.payload())
    }

    #[wasm_bindgen]
    pub fn stats_text(&self) -> Result<String, JsValue> {
        Ok(self.controller()?.payload().to_text())
    }

    /// Selected class code, `undefined` when unfiltered
    #[wasm_bindgen]
    pub fn selection(&self) -> Result<Option<u16>, JsValue> {
        Ok(self.controller()?.selection().map(|code| code.value()))
    }

    /// Initial map position as `{center_lat, center_lon, zoom, epsg}`
    #[wasm_bindgen]
    pub fn map_view(&self) -> Result<JsValue, JsValue> {
        to_js(&self.view)
    }

    /// Background tiles as `{url_template, attribution}`; add them below the overlays
    #[wasm_bindgen]
    pub fn basemap(&self) -> Result<JsValue, JsValue> {
        to_js(&self.basemap)
    }

    /// Class table as `[{code, name, color}]`
    #[wasm_bindgen]
    pub fn classes(&self) -> Result<JsValue, JsValue> {
        let controller = self.controller()?;
        let classes: Vec<_> = controller.renderer().classes().iter().collect();
        to_js(&classes)
    }

    #[wasm_bindgen]
    pub fn region_id(&self) -> String {
        self.region_id.clone()
    }
}

fn render_into(element_id: Option<&str>, payload: &DisplayPayload) {
    let Some(element_id) = element_id else {
        return;
    };
    let element = web_sys::window()
        .and_then(|window| window.document())
        .and_then(|document| document.get_element_by_id(element_id));
    match element {
        Some(element) => element.set_text_content(Some(&payload.to_text())),
        None => warn(&format!("No element with id {}", element_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landcover_dash::collect::global_variables::REGION_FILE_TEMPLATE;
    use landcover_dash::geo_core::GeoCore;
    use landcover_dash::geometric::land_cover::ClassTable;
    use landcover_dash::geometric::layer_registry::LayerSource;
    use landcover_dash::geometric::stats_renderer::StatsRenderer;
    use landcover_dash::geometric::stats_store::StatsStore;
    use wasm_bindgen_test::*;

    fn handle() -> LayerHandle {
        LayerHandle::new(
            "class-10",
            "Tree cover",
            LayerSource::Tiles {
                url_template: "https://tiles.example.org/10/{z}/{x}/{y}.png".into(),
                attribution: None,
                opacity: 1.0,
            },
        )
    }

    #[wasm_bindgen_test]
    fn test_url_for() {
        let source = FetchStatsSource::new("https://example.org/data/", REGION_FILE_TEMPLATE);
        assert_eq!(
            source.url_for("India"),
            "https://example.org/data/India_SDG15_LULC_FINAL.geojson"
        );
        assert_eq!(
            source.url_for("Sri Lanka"),
            "https://example.org/data/Sri%20Lanka_SDG15_LULC_FINAL.geojson"
        );
    }

    #[wasm_bindgen_test]
    fn test_surface_reads_visibility_from_callback() {
        let noop = Function::new_with_args("layer", "");
        let visible = Function::new_with_args("id", "return id === 'class-10';");
        let surface = JsMapSurface::new(noop.clone(), noop, visible);
        assert!(surface.is_visible(&handle()));
    }

    #[wasm_bindgen_test]
    fn test_surface_tolerates_throwing_callbacks() {
        let throwing = Function::new_with_args("layer", "throw new Error('map gone');");
        let mut surface = JsMapSurface::new(throwing.clone(), throwing.clone(), throwing);
        surface.add_layer(&handle());
        surface.remove_layer(&handle());
        assert!(!surface.is_visible(&handle()));
    }

    fn dashboard_with_add(add: Function) -> WasmDashboard {
        let noop = Function::new_with_args("layer", "");
        let hidden = Function::new_with_args("id", "return false;");
        let surface = JsMapSurface::new(add, noop, hidden);
        let loader = BootstrapLoader::from_config(&DashboardConfig::default()).unwrap();
        let registry = loader.build_registry(surface, None).unwrap();
        let controller = FilterController::new(
            registry,
            StatsStore::new(),
            StatsRenderer::new(ClassTable::worldcover()),
        );
        WasmDashboard::from_controller(
            controller,
            FetchStatsSource::new("https://example.org", REGION_FILE_TEMPLATE),
            "India".to_string(),
            GeoCore::default().map_view(5),
            Basemap::default(),
        )
    }

    #[wasm_bindgen_test]
    fn test_callback_reentering_dashboard_gets_busy_error() {
        let slot: Rc<RefCell<Option<WasmDashboard>>> = Rc::new(RefCell::new(None));
        let answers: Rc<RefCell<Vec<bool>>> = Rc::new(RefCell::new(Vec::new()));

        let add = {
            let slot = Rc::clone(&slot);
            let answers = Rc::clone(&answers);
            Closure::<dyn FnMut(JsValue)>::new(move |_layer: JsValue| {
                if let Some(dashboard) = slot.borrow().as_ref() {
                    let selection_failed = dashboard.selection().is_err();
                    let payload_failed = dashboard.payload().is_err();
                    answers.borrow_mut().push(selection_failed && payload_failed);
                }
            })
        };
        let dashboard = dashboard_with_add(add.as_ref().unchecked_ref::<Function>().clone());
        *slot.borrow_mut() = Some(dashboard);

        let guard = slot.borrow();
        let dashboard = guard.as_ref().unwrap();
        assert!(dashboard.select_class(10).is_ok());
        assert!(!answers.borrow().is_empty());
        assert!(answers.borrow().iter().all(|failed| *failed));

        // Outside the callback the session answers normally again
        assert_eq!(dashboard.selection().unwrap(), Some(10));
        assert!(dashboard.payload().is_ok());
    }

    #[wasm_bindgen_test]
    fn test_basemap_and_view_serialize() {
        let dashboard = dashboard_with_add(Function::new_with_args("layer", ""));

        let basemap = dashboard.basemap().unwrap();
        let url = js_sys::Reflect::get(&basemap, &JsValue::from_str("url_template")).unwrap();
        assert_eq!(url.as_string(), Some(Basemap::default().url_template));
        let attribution =
            js_sys::Reflect::get(&basemap, &JsValue::from_str("attribution")).unwrap();
        assert!(attribution.as_string().is_some());

        let view = dashboard.map_view().unwrap();
        let epsg = js_sys::Reflect::get(&view, &JsValue::from_str("epsg")).unwrap();
        assert_eq!(epsg.as_f64(), Some(4326.0));
    }
}
