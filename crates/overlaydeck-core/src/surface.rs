//! Seams to the rendering layer.
//!
//! The engine never touches the DOM (or whatever renders the widgets). It
//! reads on-screen rectangles, writes live transforms during gestures and
//! asks for animation frames through these traits.

use crate::transform::{WidgetId, WidgetTransform};
use kurbo::Rect;

/// Read access to the rendered rectangles of widgets.
pub trait RectSource {
    /// Current on-screen rectangle of a widget in pixels, if it is rendered.
    ///
    /// Must reflect live in-gesture positions, not only committed state.
    fn widget_rect(&self, id: &WidgetId) -> Option<Rect>;
}

/// Union of the rendered rectangles of `ids`, or `None` if none is rendered.
pub fn union_rect<'a, R: RectSource + ?Sized>(
    source: &R,
    ids: impl IntoIterator<Item = &'a WidgetId>,
) -> Option<Rect> {
    ids.into_iter()
        .filter_map(|id| source.widget_rect(id))
        .reduce(|acc, r| acc.union(r))
}

/// Write access used during gestures to move widgets without touching the
/// store.
pub trait RenderSink {
    /// Render `transform` for `id` immediately.
    fn apply_live(&mut self, id: &WidgetId, transform: &WidgetTransform);
}

/// Handle of a scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Animation-frame scheduling (e.g. `requestAnimationFrame`).
pub trait FrameScheduler {
    /// Ask for one callback on the next frame.
    fn request_frame(&mut self) -> FrameHandle;
    /// Cancel a pending callback.
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// A source with no rendered widgets.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRects;

impl RectSource for NoRects {
    fn widget_rect(&self, _id: &WidgetId) -> Option<Rect> {
        None
    }
}

/// A sink that drops live writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn apply_live(&mut self, _id: &WidgetId, _transform: &WidgetTransform) {}
}
