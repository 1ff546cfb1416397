//! Selection overlay: the bounding box drawn around selected widgets.
//!
//! The box follows the widgets' live rectangles, so while anything is selected
//! a frame callback stays scheduled and each frame re-reads the rectangles.
//! Emptying the selection cancels the pending callback at once.

use crate::config::EngineConfig;
use crate::gesture::{GestureController, GestureScope, LiveTransforms};
use crate::store::TransformStore;
use crate::surface::{FrameHandle, FrameScheduler, RectSource, union_rect};
use crate::transform::WidgetId;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Screen-space box around the selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionBounds {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    /// Degrees; only a single selected widget rotates the box.
    pub rotation: f64,
}

impl SelectionBounds {
    /// The box as a rectangle (ignoring rotation).
    pub fn rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.left + self.width, self.top + self.height)
    }

    /// Center of the box, used as the rotation pivot.
    pub fn center(&self) -> Point {
        self.rect().center()
    }
}

/// Selection state, bounding box and frame polling.
#[derive(Debug, Clone)]
pub struct SelectionOverlay {
    selection: Vec<WidgetId>,
    bounds: Option<SelectionBounds>,
    pending_frame: Option<FrameHandle>,
    hovered: bool,
    padding: f64,
    handle_bleed: f64,
}

impl Default for SelectionOverlay {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl SelectionOverlay {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            selection: Vec::new(),
            bounds: None,
            pending_frame: None,
            hovered: false,
            padding: config.overlay_padding,
            handle_bleed: config.handle_bleed,
        }
    }

    /// Selected ids (widget or group ids).
    pub fn selection(&self) -> &[WidgetId] {
        &self.selection
    }

    /// Last computed bounding box.
    pub fn bounds(&self) -> Option<SelectionBounds> {
        self.bounds
    }

    pub fn is_hovered(&self) -> bool {
        self.hovered
    }

    /// Check if a frame callback is scheduled.
    pub fn has_pending_frame(&self) -> bool {
        self.pending_frame.is_some()
    }

    /// Replace the selection, starting or stopping frame polling.
    pub fn set_selection<F: FrameScheduler + ?Sized>(&mut self, selection: Vec<WidgetId>, frames: &mut F) {
        self.selection = selection;
        if self.selection.is_empty() {
            if let Some(handle) = self.pending_frame.take() {
                frames.cancel_frame(handle);
            }
            self.bounds = None;
            self.hovered = false;
        } else if self.pending_frame.is_none() {
            self.pending_frame = Some(frames.request_frame());
        }
    }

    /// Clear the selection.
    pub fn clear<F: FrameScheduler + ?Sized>(&mut self, frames: &mut F) {
        self.set_selection(Vec::new(), frames);
    }

    /// Frame callback: recompute the box and schedule the next frame.
    pub fn on_frame<R, F>(&mut self, rects: &R, store: &TransformStore, live: &LiveTransforms, frames: &mut F)
    where
        R: RectSource + ?Sized,
        F: FrameScheduler + ?Sized,
    {
        self.pending_frame = None;
        if self.selection.is_empty() {
            return;
        }
        self.bounds = self.compute_bounds(rects, store, live);
        self.pending_frame = Some(frames.request_frame());
    }

    fn compute_bounds<R: RectSource + ?Sized>(
        &self,
        rects: &R,
        store: &TransformStore,
        live: &LiveTransforms,
    ) -> Option<SelectionBounds> {
        let members = store.expand_selection(&self.selection);
        let rect = union_rect(rects, &members)?.inflate(self.padding, self.padding);
        let rotation = match members.as_slice() {
            [only] => live
                .get(only)
                .map(|t| t.normalized_rotation())
                .unwrap_or_else(|| store.transform(only).normalized_rotation()),
            _ => 0.0,
        };
        Some(SelectionBounds {
            left: rect.x0,
            top: rect.y0,
            width: rect.width(),
            height: rect.height(),
            rotation,
        })
    }

    /// The box plus the handle area below it.
    pub fn hit_region(&self) -> Option<Rect> {
        self.bounds.map(|b| {
            let r = b.rect();
            Rect::new(r.x0, r.y0, r.x1, r.y1 + self.handle_bleed)
        })
    }

    /// Check if a screen point is inside the hit region.
    pub fn hit_test(&self, point: Point) -> bool {
        self.hit_region().is_some_and(|r| r.contains(point))
    }

    /// Update hover state from the pointer. Returns the new state.
    pub fn hover(&mut self, point: Point) -> bool {
        self.hovered = self.hit_test(point);
        self.hovered
    }

    /// Gesture scope for the selection: the group when the selection is
    /// exactly one group, independent widgets otherwise.
    pub fn scope(&self, store: &TransformStore) -> Option<GestureScope> {
        let members = store.expand_selection(&self.selection);
        let first = members.first()?;
        match store.group_of(first) {
            Some(group)
                if group.member_ids.len() == members.len() && members.iter().all(|m| group.contains(m)) =>
            {
                Some(GestureScope::Group(group.id.clone()))
            }
            _ => Some(GestureScope::Widgets(members)),
        }
    }

    /// Start dragging the whole selection.
    pub fn begin_group_drag<R: RectSource + ?Sized>(
        &self,
        gestures: &mut GestureController,
        store: &TransformStore,
        rects: &R,
    ) -> bool {
        match self.scope(store) {
            Some(scope) => gestures.begin_drag(scope, store, rects),
            None => false,
        }
    }

    /// Start scaling the whole selection.
    pub fn begin_group_scale<R: RectSource + ?Sized>(
        &self,
        gestures: &mut GestureController,
        store: &TransformStore,
        rects: &R,
    ) -> bool {
        match self.scope(store) {
            Some(scope) => gestures.begin_scale(scope, store, rects),
            None => false,
        }
    }

    /// Start rotating the selection around the bounding-box center.
    pub fn begin_group_rotate<R: RectSource + ?Sized>(
        &mut self,
        pointer: Point,
        gestures: &mut GestureController,
        store: &TransformStore,
        rects: &R,
    ) -> bool {
        if self.bounds.is_none() {
            self.bounds = self.compute_bounds(rects, store, gestures.live());
        }
        let (Some(bounds), Some(scope)) = (self.bounds, self.scope(store)) else {
            return false;
        };
        gestures.begin_rotate(scope, bounds.center(), pointer, store, rects)
    }

    /// Reset handle: reset every selected widget and group.
    pub fn reset(&self, store: &mut TransformStore) {
        let members = store.expand_selection(&self.selection);
        store.reset_widgets(&members);
    }
}
