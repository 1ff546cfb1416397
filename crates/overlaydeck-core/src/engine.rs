//! Per-window engine: store, gestures, overlay, sync and persistence wired
//! together.
//!
//! Nothing here is global. Each window owns one [`OverlayEngine`] with its own
//! transport and a handle to the shared storage, and drives it by calling
//! [`OverlayEngine::pump_at`] from its event loop.

use crate::config::EngineConfig;
use crate::gesture::GestureController;
use crate::layout::{Layout, LayoutId, LayoutImportError};
use crate::overlay::SelectionOverlay;
use crate::storage::{PersistScheduler, Storage};
use crate::store::TransformStore;
use crate::surface::{FrameScheduler, RectSource};
use crate::sync::{BroadcastTransport, WindowId, WindowSync};
use crate::transform::{Viewport, WidgetId};
use kurbo::Point;
use std::sync::Arc;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// What one pump did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Remote updates applied to the store.
    pub applied: usize,
    /// Local updates broadcast to peers.
    pub published: usize,
    /// Whether the store snapshot was written.
    pub saved: bool,
}

/// Everything one window needs to edit and mirror the overlay.
pub struct OverlayEngine {
    config: EngineConfig,
    store: TransformStore,
    gestures: GestureController,
    overlay: SelectionOverlay,
    sync: WindowSync,
    persist: PersistScheduler<dyn Storage>,
}

impl OverlayEngine {
    pub fn new(
        config: EngineConfig,
        viewport: Viewport,
        window: WindowId,
        transport: Box<dyn BroadcastTransport>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let mut persist = PersistScheduler::new(storage.clone(), config.store_key());
        persist.set_debounce(Duration::from_millis(config.persist_debounce_ms));
        Self {
            store: TransformStore::new(viewport),
            gestures: GestureController::new(config.clone()),
            overlay: SelectionOverlay::new(&config),
            sync: WindowSync::new(window, &config, transport, storage),
            persist,
            config,
        }
    }

    /// Load persisted state and ask peers for theirs.
    ///
    /// The store snapshot is restored first; per-widget keys are newer by
    /// construction and override it.
    pub fn start(&mut self) {
        match self.persist.load() {
            Ok(Some(snapshot)) => self.store.restore(snapshot),
            Ok(None) => {}
            Err(e) => log::warn!("Ignoring unreadable store snapshot: {}", e),
        }
        if let Err(e) = self.sync.seed(&mut self.store) {
            log::warn!("Failed to seed widget transforms: {}", e);
        }
        self.sync.request_state();
        log::info!("Window {} started as {:?}", self.sync.window_id(), self.config.role);
    }

    /// Exchange messages with peers and persist, as of `now`.
    pub fn pump_at(&mut self, now: Instant) -> PumpReport {
        let mut report = PumpReport {
            applied: self.sync.receive(&mut self.store, &self.gestures),
            ..PumpReport::default()
        };

        let events = self.store.take_events();
        if !events.is_empty() {
            report.published = self.sync.publish(&events);
            self.persist.mark_dirty_at(now);
        }

        match self.persist.maybe_save_at(now, &self.store) {
            Ok(saved) => report.saved = saved,
            Err(e) => log::warn!("Failed to save store snapshot: {}", e),
        }
        report
    }

    /// Exchange messages with peers and persist.
    pub fn pump(&mut self) -> PumpReport {
        self.pump_at(Instant::now())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn window_id(&self) -> &WindowId {
        self.sync.window_id()
    }

    pub fn store(&self) -> &TransformStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TransformStore {
        &mut self.store
    }

    pub fn gestures(&self) -> &GestureController {
        &self.gestures
    }

    pub fn gestures_mut(&mut self) -> &mut GestureController {
        &mut self.gestures
    }

    pub fn overlay(&self) -> &SelectionOverlay {
        &self.overlay
    }

    pub fn sync(&self) -> &WindowSync {
        &self.sync
    }

    /// Update the viewport after a resize.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.store.set_viewport(viewport);
    }

    /// Replace the selection.
    pub fn select<F: FrameScheduler + ?Sized>(&mut self, selection: Vec<WidgetId>, frames: &mut F) {
        self.overlay.set_selection(selection, frames);
    }

    /// Overlay frame callback.
    pub fn on_frame<R, F>(&mut self, rects: &R, frames: &mut F)
    where
        R: RectSource + ?Sized,
        F: FrameScheduler + ?Sized,
    {
        self.overlay.on_frame(rects, &self.store, self.gestures.live(), frames);
    }

    /// Group the current selection; the selection grows to the full group.
    pub fn group_selection<R, F>(&mut self, rects: &R, frames: &mut F) -> bool
    where
        R: RectSource + ?Sized,
        F: FrameScheduler + ?Sized,
    {
        let mut selection = self.overlay.selection().to_vec();
        let grouped = self.store.group_selected_widgets(&mut selection, rects).is_some();
        if grouped {
            self.overlay.set_selection(selection, frames);
        }
        grouped
    }

    /// Ungroup everything the selection touches.
    pub fn ungroup_selection(&mut self) -> bool {
        let selection = self.overlay.selection().to_vec();
        !self.store.ungroup_selected_widgets(&selection).is_empty()
    }

    /// Reset handle of the selection overlay.
    pub fn reset_selection(&mut self) {
        self.overlay.reset(&mut self.store);
    }

    /// Save the selection as a named layout.
    pub fn save_selection_layout(&mut self, name: &str) -> Option<LayoutId> {
        let selection = self.overlay.selection().to_vec();
        self.store.save_layout(name, &selection)
    }

    /// Start dragging the selection.
    pub fn begin_selection_drag<R: RectSource + ?Sized>(&mut self, rects: &R) -> bool {
        self.overlay.begin_group_drag(&mut self.gestures, &self.store, rects)
    }

    /// Start scaling the selection.
    pub fn begin_selection_scale<R: RectSource + ?Sized>(&mut self, rects: &R) -> bool {
        self.overlay.begin_group_scale(&mut self.gestures, &self.store, rects)
    }

    /// Start rotating the selection around its bounding-box center.
    pub fn begin_selection_rotate<R: RectSource + ?Sized>(&mut self, pointer: Point, rects: &R) -> bool {
        self.overlay.begin_group_rotate(pointer, &mut self.gestures, &self.store, rects)
    }

    /// Finish the active gesture and commit it.
    pub fn end_gesture(&mut self) -> Vec<WidgetId> {
        self.gestures.end(&mut self.store)
    }

    /// Import a layout from its exchange format.
    pub fn import_layout(&mut self, json: &str) -> Result<LayoutId, LayoutImportError> {
        let layout = Layout::from_export_json(json)?;
        log::info!("Imported layout '{}' with {} widgets", layout.name, layout.widgets.len());
        Ok(self.store.add_layout(layout))
    }

    /// Export a saved layout to its exchange format.
    pub fn export_layout(&self, id: &LayoutId) -> Option<Result<String, serde_json::Error>> {
        self.store.layout(id).map(Layout::to_export_json)
    }
}
