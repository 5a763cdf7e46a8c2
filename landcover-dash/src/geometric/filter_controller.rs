use std::cell::RefCell;
use std::collections::BTreeSet;

use crate::collect::region_stats::RegionStatsSource;
use crate::error::{DashResult, DashboardError};
use crate::geometric::land_cover::ClassCode;
use crate::geometric::layer_registry::{LayerKey, LayerRegistry, MapSurface};
use crate::geometric::stats_renderer::{DisplayPayload, RenderScope, StatsRenderer};
use crate::geometric::stats_store::{GroupResult, StatsStore};

/// Controller state: at most one class filter is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Unfiltered,
    FilteredOn(ClassCode),
}

/// Identifies one data reload request. Only the most recently issued token
/// may mutate the statistics store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReloadToken(u64);

/// What map surface callbacks are allowed to emit
#[derive(Debug, Clone)]
pub enum DashboardEvent {
    SelectClass(ClassCode),
    Reset,
    DataReloaded {
        token: ReloadToken,
        result: DashResult<GroupResult>,
    },
}

/// Class filter / layer visibility state machine of one dashboard session.
///
/// Owns the statistics store, the layer registry and the renderer; nothing
/// is shared at process scope.
pub struct FilterController<M: MapSurface> {
    registry: LayerRegistry<M>,
    store: StatsStore,
    renderer: StatsRenderer,
    selection: Option<ClassCode>,
    latest_reload: u64,
    payload: DisplayPayload,
}

impl<M: MapSurface> FilterController<M> {
    pub fn new(registry: LayerRegistry<M>, store: StatsStore, renderer: StatsRenderer) -> Self {
        let payload = renderer.render(&store, RenderScope::AllClasses);
        FilterController {
            registry,
            store,
            renderer,
            selection: None,
            latest_reload: 0,
            payload,
        }
    }

    pub fn state(&self) -> FilterState {
        match self.selection {
            Some(code) => FilterState::FilteredOn(code),
            None => FilterState::Unfiltered,
        }
    }

    pub fn selection(&self) -> Option<ClassCode> {
        self.selection
    }

    /// Last rendered payload
    pub fn payload(&self) -> &DisplayPayload {
        &self.payload
    }

    pub fn store(&self) -> &StatsStore {
        &self.store
    }

    pub fn registry(&self) -> &LayerRegistry<M> {
        &self.registry
    }

    pub fn renderer(&self) -> &StatsRenderer {
        &self.renderer
    }

    fn scope(&self) -> RenderScope {
        match self.selection {
            Some(code) => RenderScope::SingleClass(code),
            None => RenderScope::AllClasses,
        }
    }

    fn rerender(&mut self) -> DisplayPayload {
        self.payload = self.renderer.render(&self.store, self.scope());
        self.payload.clone()
    }

    /// Layers shown in the `Unfiltered` state
    fn default_layers(&self) -> BTreeSet<LayerKey> {
        [LayerKey::Full, LayerKey::Boundary]
            .into_iter()
            .filter(|key| self.registry.contains(*key))
            .collect()
    }

    /// Filter the map to one class. Selecting the active class again resets.
    pub fn select_class(&mut self, code: ClassCode) -> DashResult<DisplayPayload> {
        if !self.registry.contains(LayerKey::Class(code)) {
            tracing::warn!(%code, "selection of unregistered class ignored");
            return Err(DashboardError::UnknownClass(code));
        }

        if self.selection == Some(code) {
            tracing::debug!(%code, "active class selected again, resetting");
            return self.reset();
        }

        let keys: BTreeSet<LayerKey> = std::iter::once(LayerKey::Class(code)).collect();
        self.registry.show_only(&keys)?;
        self.selection = Some(code);
        tracing::info!(%code, "class filter applied");
        Ok(self.rerender())
    }

    /// Back to the full classification and unfiltered statistics
    pub fn reset(&mut self) -> DashResult<DisplayPayload> {
        let keys = self.default_layers();
        self.registry.show_only(&keys)?;
        if self.selection.take().is_some() {
            tracing::info!("class filter cleared");
        }
        Ok(self.rerender())
    }

    /// Replace the statistics and re-render for the current state.
    /// Layer visibility is left alone. Reloads still in flight are
    /// superseded by this data.
    pub fn on_data_reload(&mut self, group_result: &GroupResult) -> DisplayPayload {
        self.latest_reload += 1;
        self.apply_group_result(group_result)
    }

    fn apply_group_result(&mut self, group_result: &GroupResult) -> DisplayPayload {
        if let Err(err) = self.store.load(group_result) {
            tracing::warn!(error = %err, "statistics unavailable after reload");
        }
        self.rerender()
    }

    /// Issue a token for a new reload request; supersedes any in flight
    pub fn begin_reload(&mut self) -> ReloadToken {
        self.latest_reload += 1;
        ReloadToken(self.latest_reload)
    }

    pub fn is_current(&self, token: ReloadToken) -> bool {
        token.0 == self.latest_reload
    }

    /// Apply a finished reload. Results of superseded requests are dropped
    /// and `None` is returned.
    pub fn complete_reload(
        &mut self,
        token: ReloadToken,
        result: DashResult<GroupResult>,
    ) -> Option<DisplayPayload> {
        if !self.is_current(token) {
            tracing::debug!(
                token = token.0,
                latest = self.latest_reload,
                "discarding stale reload"
            );
            return None;
        }

        match result {
            Ok(group_result) => Some(self.apply_group_result(&group_result)),
            Err(err) => {
                tracing::warn!(error = %err, "statistics reload failed");
                self.store.mark_unavailable(err.to_string());
                Some(self.rerender())
            }
        }
    }

    /// Translate a surface event into a transition
    pub fn handle_event(&mut self, event: DashboardEvent) -> DashResult<Option<DisplayPayload>> {
        match event {
            DashboardEvent::SelectClass(code) => self.select_class(code).map(Some),
            DashboardEvent::Reset => self.reset().map(Some),
            DashboardEvent::DataReloaded { token, result } => {
                Ok(self.complete_reload(token, result))
            }
        }
    }
}

/// Reload statistics for a controller shared on a single-threaded event loop.
///
/// The controller is borrowed only to issue the token and to apply the
/// result, never across the fetch, so other events keep being handled while
/// the request is in flight. Returns `None` when a newer reload superseded
/// this one, `Busy` when the controller is borrowed elsewhere at either
/// end of the fetch.
pub async fn reload_shared<M, S>(
    controller: &RefCell<FilterController<M>>,
    source: &S,
    region_id: &str,
) -> DashResult<Option<DisplayPayload>>
where
    M: MapSurface,
    S: RegionStatsSource,
{
    let token = controller
        .try_borrow_mut()
        .map_err(|_| DashboardError::Busy)?
        .begin_reload();
    let result = source.fetch_group_result(region_id).await;
    let mut controller = controller.try_borrow_mut().map_err(|_| DashboardError::Busy)?;
    Ok(controller.complete_reload(token, result))
}
