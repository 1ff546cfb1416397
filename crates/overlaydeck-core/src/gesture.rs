//! Gesture controller: pointer deltas to live transforms to committed state.
//!
//! A gesture snapshots the committed transform and rendered size of every
//! target when it begins and computes each update from that snapshot. Updates
//! only reach the render surface and the [`LiveTransforms`] tier; the store is
//! written once, when the gesture ends.

use crate::config::EngineConfig;
use crate::group::{GroupId, WidgetGroup};
use crate::snap::{pointer_angle, snap_rotation, wrap_delta};
use crate::store::{ChangeOrigin, TransformStore};
use crate::surface::{RectSource, RenderSink};
use crate::transform::{Viewport, WidgetId, WidgetTransform, clamp_scale, normalize_rotation, revolve};
use kurbo::{Point, Size, Vec2};
use std::collections::BTreeMap;

/// What a gesture acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureScope {
    /// Independent widgets; each is transformed on its own.
    Widgets(Vec<WidgetId>),
    /// A group, driven through its anchor.
    Group(GroupId),
}

/// Kind of an active gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureKind {
    Drag,
    Scale,
    Rotate {
        /// Pivot in screen pixels.
        center: Point,
        /// Pointer angle at the previous update.
        last_angle: f64,
        /// Unwrapped pointer rotation since the gesture began.
        accumulated: f64,
    },
}

/// Start state of one gesture target.
#[derive(Debug, Clone, PartialEq)]
struct GestureTarget {
    id: WidgetId,
    start: WidgetTransform,
    /// Rendered size at scale 1, in pixels.
    base_size: Size,
}

impl GestureTarget {
    fn scaled_size(&self, scale: f64) -> Size {
        self.base_size * scale
    }
}

/// An in-progress gesture.
#[derive(Debug, Clone)]
pub struct ActiveGesture {
    kind: GestureKind,
    scope: GestureScope,
    targets: Vec<GestureTarget>,
    /// Group state captured at begin, for group scopes.
    group: Option<WidgetGroup>,
    viewport: Viewport,
}

impl ActiveGesture {
    /// The gesture kind.
    pub fn kind(&self) -> GestureKind {
        self.kind
    }

    /// What the gesture acts on.
    pub fn scope(&self) -> &GestureScope {
        &self.scope
    }

    /// Check if a widget is one of the gesture's targets.
    pub fn targets(&self, id: &WidgetId) -> bool {
        self.targets.iter().any(|t| t.id == *id)
    }

    fn target(&self, id: &WidgetId) -> Option<&GestureTarget> {
        self.targets.iter().find(|t| t.id == *id)
    }
}

/// Controller state.
#[derive(Debug, Clone, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Active(ActiveGesture),
}

/// Transforms rendered during a gesture but not yet committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveTransforms(BTreeMap<WidgetId, WidgetTransform>);

impl LiveTransforms {
    /// Live transform of a widget, if it is being manipulated.
    pub fn get(&self, id: &WidgetId) -> Option<&WidgetTransform> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &WidgetId) -> bool {
        self.0.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WidgetId, &WidgetTransform)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn set(&mut self, id: WidgetId, transform: WidgetTransform) {
        self.0.insert(id, transform);
    }

    fn clear(&mut self) {
        self.0.clear();
    }

    fn drain(&mut self) -> Vec<(WidgetId, WidgetTransform)> {
        std::mem::take(&mut self.0).into_iter().collect()
    }
}

/// Turns pointer input into live and committed transforms.
#[derive(Debug, Clone)]
pub struct GestureController {
    state: GestureState,
    live: LiveTransforms,
    config: EngineConfig,
}

impl Default for GestureController {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl GestureController {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            state: GestureState::Idle,
            live: LiveTransforms::default(),
            config,
        }
    }

    /// Current state.
    pub fn state(&self) -> &GestureState {
        &self.state
    }

    /// Check if a gesture is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self.state, GestureState::Active(_))
    }

    /// Check if a widget is a target of the active gesture.
    pub fn is_manipulating(&self, id: &WidgetId) -> bool {
        match &self.state {
            GestureState::Active(gesture) => gesture.targets(id),
            GestureState::Idle => false,
        }
    }

    /// The uncommitted live tier.
    pub fn live(&self) -> &LiveTransforms {
        &self.live
    }

    /// Begin dragging.
    pub fn begin_drag<R: RectSource + ?Sized>(
        &mut self,
        scope: GestureScope,
        store: &TransformStore,
        rects: &R,
    ) -> bool {
        self.begin(GestureKind::Drag, scope, store, rects)
    }

    /// Begin scaling.
    pub fn begin_scale<R: RectSource + ?Sized>(
        &mut self,
        scope: GestureScope,
        store: &TransformStore,
        rects: &R,
    ) -> bool {
        self.begin(GestureKind::Scale, scope, store, rects)
    }

    /// Begin rotating around `center` (pixels), starting at `pointer`.
    pub fn begin_rotate<R: RectSource + ?Sized>(
        &mut self,
        scope: GestureScope,
        center: Point,
        pointer: Point,
        store: &TransformStore,
        rects: &R,
    ) -> bool {
        let kind = GestureKind::Rotate {
            center,
            last_angle: pointer_angle(center, pointer),
            accumulated: 0.0,
        };
        self.begin(kind, scope, store, rects)
    }

    fn begin<R: RectSource + ?Sized>(
        &mut self,
        kind: GestureKind,
        scope: GestureScope,
        store: &TransformStore,
        rects: &R,
    ) -> bool {
        if let GestureState::Active(previous) = &self.state {
            log::debug!("Superseding {:?} gesture on {:?}", previous.kind, previous.scope);
        }
        self.live.clear();
        self.state = GestureState::Idle;

        let (ids, group) = match &scope {
            GestureScope::Widgets(ids) => {
                let mut unique: Vec<WidgetId> = Vec::new();
                for id in ids {
                    if !unique.contains(id) {
                        unique.push(id.clone());
                    }
                }
                (unique, None)
            }
            GestureScope::Group(group_id) => match store.group(group_id) {
                Some(group) => (group.member_ids.clone(), Some(group.clone())),
                None => return false,
            },
        };
        if ids.is_empty() {
            return false;
        }

        let fallback = Size::new(self.config.fallback_widget_size, self.config.fallback_widget_size);
        let targets = ids
            .into_iter()
            .map(|id| {
                let start = store.transform(&id);
                let base_size = rects
                    .widget_rect(&id)
                    .map(|r| r.size() * (1.0 / start.scale))
                    .unwrap_or(fallback);
                GestureTarget { id, start, base_size }
            })
            .collect();

        log::debug!("Begin {:?} gesture on {:?}", kind, scope);
        self.state = GestureState::Active(ActiveGesture {
            kind,
            scope,
            targets,
            group,
            viewport: store.viewport(),
        });
        true
    }

    /// Drag by a pixel delta measured from the gesture start.
    pub fn update_drag<S: RenderSink + ?Sized>(&mut self, delta_px: Vec2, sink: &mut S) {
        let GestureState::Active(gesture) = &self.state else {
            return;
        };
        if gesture.kind != GestureKind::Drag {
            return;
        }
        let offset = gesture.viewport.delta_to_normalized(delta_px);
        let updates = self.positioned(gesture, offset, None);
        self.publish(updates, sink);
    }

    /// Scale by handle travel along the scale axis (pixels); `drag_px` is the
    /// incidental movement of the pointer, applied to position.
    pub fn update_scale<S: RenderSink + ?Sized>(&mut self, axis_delta: f64, drag_px: Vec2, sink: &mut S) {
        let GestureState::Active(gesture) = &self.state else {
            return;
        };
        if gesture.kind != GestureKind::Scale {
            return;
        }
        let offset = gesture.viewport.delta_to_normalized(drag_px);
        let updates = self.positioned(gesture, offset, Some(axis_delta / self.config.scale_divisor));
        self.publish(updates, sink);
    }

    /// Rotate towards the pointer's current position (pixels).
    pub fn update_rotate<S: RenderSink + ?Sized>(&mut self, pointer: Point, sink: &mut S) {
        let GestureState::Active(gesture) = &mut self.state else {
            return;
        };
        let GestureKind::Rotate {
            center,
            last_angle,
            accumulated,
        } = &mut gesture.kind
        else {
            return;
        };
        let angle = pointer_angle(*center, pointer);
        *accumulated += wrap_delta(angle - *last_angle);
        *last_angle = angle;
        let (center, raw) = (*center, *accumulated);

        let threshold = self.config.snap_threshold;
        let gesture = &*gesture;
        let updates: Vec<(WidgetId, WidgetTransform)> = match gesture.targets.as_slice() {
            [single] if gesture.group.is_none() => {
                let rotation = snap_rotation(single.start.rotation, raw, threshold).rotation;
                vec![(single.id.clone(), WidgetTransform { rotation, ..single.start })]
            }
            targets => {
                // Several targets turn as one formation, snapped on the anchor.
                let reference = gesture
                    .group
                    .as_ref()
                    .and_then(|g| gesture.target(&g.anchor_id))
                    .or(targets.first())
                    .map(|t| t.start.rotation)
                    .unwrap_or(0.0);
                let delta = snap_rotation(reference, raw, threshold).delta;
                let pivot = gesture.viewport.to_normalized(center);
                targets
                    .iter()
                    .map(|t| {
                        let position = revolve(t.start.position(), pivot, delta, &gesture.viewport);
                        let transform = WidgetTransform {
                            rotation: normalize_rotation(t.start.rotation + delta),
                            ..t.start.with_position(position)
                        };
                        (t.id.clone(), transform)
                    })
                    .collect()
            }
        };
        self.publish(updates, sink);
    }

    /// Positions (and optionally scales) for drag and scale updates.
    fn positioned(
        &self,
        gesture: &ActiveGesture,
        offset: Vec2,
        scale_delta: Option<f64>,
    ) -> Vec<(WidgetId, WidgetTransform)> {
        let moved = |t: &GestureTarget| {
            let scale = match scale_delta {
                Some(d) => clamp_scale(t.start.scale + d),
                None => t.start.scale,
            };
            let position = gesture.viewport.clamp_position(
                t.start.position() + offset,
                t.scaled_size(scale),
                self.config.clamp_margin,
            );
            WidgetTransform {
                scale,
                ..t.start.with_position(position)
            }
        };

        match &gesture.group {
            Some(group) => {
                let Some(anchor) = gesture.target(&group.anchor_id) else {
                    return Vec::new();
                };
                group.compose_members(&moved(anchor), gesture.viewport.aspect())
            }
            None => gesture.targets.iter().map(|t| (t.id.clone(), moved(t))).collect(),
        }
    }

    fn publish<S: RenderSink + ?Sized>(&mut self, updates: Vec<(WidgetId, WidgetTransform)>, sink: &mut S) {
        for (id, transform) in updates {
            sink.apply_live(&id, &transform);
            self.live.set(id, transform);
        }
    }

    /// End the gesture and commit every touched widget. Returns the ids that
    /// were committed.
    pub fn end(&mut self, store: &mut TransformStore) -> Vec<WidgetId> {
        let GestureState::Active(gesture) = std::mem::take(&mut self.state) else {
            return Vec::new();
        };
        let changes = self.live.drain();
        let ids: Vec<WidgetId> = changes.iter().map(|(id, _)| id.clone()).collect();
        log::debug!("End {:?} gesture, committing {} widgets", gesture.kind, ids.len());
        store.commit(changes, ChangeOrigin::Gesture);
        ids
    }

    /// Abandon the gesture without committing.
    pub fn cancel(&mut self) {
        self.state = GestureState::Idle;
        self.live.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{NoRects, NullSink};
    use crate::transform::MAX_SCALE;
    use kurbo::Rect;
    use std::collections::HashMap;

    const EPS: f64 = 1e-9;

    fn id(s: &str) -> WidgetId {
        WidgetId::from(s)
    }

    /// 100px square widgets drawn at their committed (or live) transforms.
    struct Surface {
        viewport: Viewport,
        transforms: HashMap<WidgetId, WidgetTransform>,
        writes: usize,
    }

    impl Surface {
        fn of(store: &TransformStore) -> Self {
            Self {
                viewport: store.viewport(),
                transforms: store.widget_ids().iter().map(|w| (w.clone(), store.transform(w))).collect(),
                writes: 0,
            }
        }
    }

    impl RectSource for Surface {
        fn widget_rect(&self, id: &WidgetId) -> Option<Rect> {
            let t = self.transforms.get(id)?;
            let center = self.viewport.to_pixels(t.position());
            let half = 50.0 * t.scale;
            Some(Rect::new(center.x - half, center.y - half, center.x + half, center.y + half))
        }
    }

    impl RenderSink for Surface {
        fn apply_live(&mut self, id: &WidgetId, transform: &WidgetTransform) {
            self.transforms.insert(id.clone(), *transform);
            self.writes += 1;
        }
    }

    fn store(viewport: Viewport, entries: &[(&str, WidgetTransform)]) -> TransformStore {
        let mut store = TransformStore::new(viewport);
        store.commit(entries.iter().map(|(n, t)| (id(n), *t)), ChangeOrigin::Command);
        store.take_events();
        store
    }

    fn grouped(viewport: Viewport, entries: &[(&str, WidgetTransform)]) -> (TransformStore, GroupId) {
        let mut store = store(viewport, entries);
        let mut selection: Vec<WidgetId> = entries.iter().map(|(n, _)| id(n)).collect();
        let surface = Surface::of(&store);
        let gid = store.group_selected_widgets(&mut selection, &surface).unwrap();
        store.take_events();
        (store, gid)
    }

    #[test]
    fn test_drag_updates_live_tier_only() {
        let mut store = store(Viewport::new(1000.0, 500.0), &[("dice", WidgetTransform::IDENTITY)]);
        let mut surface = Surface::of(&store);
        let mut gestures = GestureController::default();

        assert!(gestures.begin_drag(GestureScope::Widgets(vec![id("dice")]), &store, &surface));
        gestures.update_drag(Vec2::new(100.0, 50.0), &mut surface);

        let live = gestures.live().get(&id("dice")).unwrap();
        assert!((live.px - 0.1).abs() < EPS);
        assert!((live.py - 0.1).abs() < EPS);
        assert_eq!(store.transform(&id("dice")), WidgetTransform::IDENTITY);
        assert!(gestures.is_manipulating(&id("dice")));
        assert_eq!(surface.writes, 1);

        let committed = gestures.end(&mut store);
        assert_eq!(committed, vec![id("dice")]);
        assert!((store.transform(&id("dice")).px - 0.1).abs() < EPS);
        assert!(!gestures.is_active());
        assert!(gestures.live().is_empty());
        assert!(store.take_events().iter().any(|e| matches!(
            e,
            crate::store::StoreEvent::TransformChanged { origin: ChangeOrigin::Gesture, .. }
        )));
    }

    #[test]
    fn test_drag_deltas_are_from_gesture_start() {
        let mut store = store(Viewport::new(1000.0, 1000.0), &[("dice", WidgetTransform::IDENTITY)]);
        let mut gestures = GestureController::default();
        gestures.begin_drag(GestureScope::Widgets(vec![id("dice")]), &store, &NoRects);
        gestures.update_drag(Vec2::new(100.0, 0.0), &mut NullSink);
        gestures.update_drag(Vec2::new(150.0, 0.0), &mut NullSink);
        gestures.end(&mut store);
        assert!((store.transform(&id("dice")).px - 0.15).abs() < EPS);
    }

    #[test]
    fn test_drag_is_clamped_for_any_delta() {
        let viewport = Viewport::new(1000.0, 500.0);
        let mut store = store(viewport, &[("dice", WidgetTransform::new(0.0, 0.0, 2.0, 0.0))]);
        let surface = Surface::of(&store);
        let mut gestures = GestureController::default();
        gestures.begin_drag(GestureScope::Widgets(vec![id("dice")]), &store, &surface);

        for delta in [Vec2::new(1e6, -1e6), Vec2::new(-1e9, 1e9)] {
            gestures.update_drag(delta, &mut NullSink);
            let t = gestures.live().get(&id("dice")).unwrap();
            // 200px wide: 0.5 + (100 - 40) / 1000 and 0.5 + (100 - 40) / 500.
            assert!(t.px.abs() <= 0.56 + EPS);
            assert!(t.py.abs() <= 0.62 + EPS);
        }
        gestures.end(&mut store);
        let t = store.transform(&id("dice"));
        assert!((t.px + 0.56).abs() < EPS);
        assert!((t.py - 0.62).abs() < EPS);
    }

    #[test]
    fn test_scale_uses_divisor_and_bounds() {
        let mut store = store(Viewport::default(), &[("dice", WidgetTransform::IDENTITY)]);
        let mut gestures = GestureController::default();
        gestures.begin_scale(GestureScope::Widgets(vec![id("dice")]), &store, &NoRects);

        gestures.update_scale(100.0, Vec2::ZERO, &mut NullSink);
        assert!((gestures.live().get(&id("dice")).unwrap().scale - 1.5).abs() < EPS);
        gestures.update_scale(-10_000.0, Vec2::ZERO, &mut NullSink);
        assert_eq!(gestures.live().get(&id("dice")).unwrap().scale, 0.3);
        gestures.update_scale(10_000.0, Vec2::new(96.0, 0.0), &mut NullSink);
        gestures.end(&mut store);

        let t = store.transform(&id("dice"));
        assert_eq!(t.scale, 3.0);
        assert!((t.px - 0.05).abs() < EPS);
    }

    #[test]
    fn test_live_scale_matches_committed_scale_at_bounds() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_scale": 4.0, "scale_divisor": 100}"#).unwrap();
        let mut store = store(Viewport::default(), &[("dice", WidgetTransform::IDENTITY)]);
        let mut gestures = GestureController::new(config);
        gestures.begin_scale(GestureScope::Widgets(vec![id("dice")]), &store, &NoRects);

        gestures.update_scale(10_000.0, Vec2::ZERO, &mut NullSink);
        let live = *gestures.live().get(&id("dice")).unwrap();
        gestures.end(&mut store);
        assert_eq!(live.scale, MAX_SCALE);
        assert_eq!(store.transform(&id("dice")).scale, live.scale);
    }

    #[test]
    fn test_rotate_snaps_to_quarter_turn() {
        let mut store = store(Viewport::new(1000.0, 1000.0), &[("dice", WidgetTransform::IDENTITY)]);
        let center = Point::new(500.0, 500.0);
        let mut gestures = GestureController::default();
        gestures.begin_rotate(
            GestureScope::Widgets(vec![id("dice")]),
            center,
            Point::new(600.0, 500.0),
            &store,
            &NoRects,
        );

        // 84 degrees clockwise.
        let (sin, cos) = 84f64.to_radians().sin_cos();
        gestures.update_rotate(Point::new(500.0 + 100.0 * cos, 500.0 + 100.0 * sin), &mut NullSink);
        gestures.end(&mut store);
        assert!((store.transform(&id("dice")).rotation - 90.0).abs() < EPS);
    }

    #[test]
    fn test_rotate_accumulates_past_half_turn() {
        let mut store = store(Viewport::new(1000.0, 1000.0), &[("dice", WidgetTransform::IDENTITY)]);
        let center = Point::new(500.0, 500.0);
        let mut gestures = GestureController::default();
        gestures.begin_rotate(
            GestureScope::Widgets(vec![id("dice")]),
            center,
            Point::new(600.0, 500.0),
            &store,
            &NoRects,
        );
        for degrees in [60.0, 120.0, 180.0, 225.0] {
            let (sin, cos) = f64::to_radians(degrees).sin_cos();
            gestures.update_rotate(Point::new(500.0 + 100.0 * cos, 500.0 + 100.0 * sin), &mut NullSink);
        }
        gestures.end(&mut store);
        assert!((store.transform(&id("dice")).rotation - 225.0).abs() < 1e-6);
    }

    #[test]
    fn test_group_drag_moves_members_with_anchor() {
        let (mut store, gid) = grouped(
            Viewport::new(1000.0, 500.0),
            &[("dice", WidgetTransform::IDENTITY), ("coin", WidgetTransform::at(0.1, 0.0))],
        );
        let mut surface = Surface::of(&store);
        let mut gestures = GestureController::default();
        gestures.begin_drag(GestureScope::Group(gid), &store, &surface);
        assert!(gestures.is_manipulating(&id("coin")));

        gestures.update_drag(Vec2::new(50.0, 10.0), &mut surface);
        gestures.end(&mut store);

        let dice = store.transform(&id("dice"));
        let coin = store.transform(&id("coin"));
        assert!((dice.px - 0.05).abs() < EPS && (dice.py - 0.02).abs() < EPS);
        assert!((coin.px - 0.15).abs() < EPS && (coin.py - 0.02).abs() < EPS);
    }

    #[test]
    fn test_group_scale_scales_offsets() {
        let (mut store, gid) = grouped(
            Viewport::new(1000.0, 1000.0),
            &[("dice", WidgetTransform::IDENTITY), ("coin", WidgetTransform::at(0.1, 0.0))],
        );
        let mut gestures = GestureController::default();
        gestures.begin_scale(GestureScope::Group(gid), &store, &NoRects);
        gestures.update_scale(200.0, Vec2::ZERO, &mut NullSink);
        gestures.end(&mut store);

        let coin = store.transform(&id("coin"));
        assert!((coin.px - 0.2).abs() < EPS);
        assert!((coin.scale - 2.0).abs() < EPS);
    }

    #[test]
    fn test_group_rotate_half_turn_flips_offset() {
        let viewport = Viewport::new(1600.0, 900.0);
        let (mut store, gid) = grouped(
            viewport,
            &[("dice", WidgetTransform::IDENTITY), ("coin", WidgetTransform::at(0.1, 0.0))],
        );
        let surface = Surface::of(&store);
        let bounds = crate::surface::union_rect(&surface, &[id("dice"), id("coin")]).unwrap();
        let center = bounds.center();

        let mut gestures = GestureController::default();
        gestures.begin_rotate(GestureScope::Group(gid), center, center + Vec2::new(100.0, 0.0), &store, &surface);
        gestures.update_rotate(center + Vec2::new(0.0, 100.0), &mut NullSink);
        gestures.update_rotate(center + Vec2::new(-100.0, 0.0), &mut NullSink);
        gestures.end(&mut store);

        let dice = store.transform(&id("dice"));
        let coin = store.transform(&id("coin"));
        assert!(((coin.px - dice.px) + 0.1).abs() < 1e-6);
        assert!((coin.py - dice.py).abs() < 1e-6);
        assert!((dice.rotation - 180.0).abs() < 1e-6);
        assert!((coin.rotation - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_group_rotate_full_turn_returns_home() {
        let viewport = Viewport::new(1600.0, 900.0);
        let dice = WidgetTransform::new(-0.1, 0.05, 1.2, 30.0);
        let coin = WidgetTransform::new(0.12, -0.08, 0.8, 75.0);
        let (mut store, gid) = grouped(viewport, &[("dice", dice), ("coin", coin)]);
        let center = Point::new(800.0, 450.0);

        let mut gestures = GestureController::default();
        gestures.begin_rotate(GestureScope::Group(gid), center, center + Vec2::new(100.0, 0.0), &store, &NoRects);
        for step in 1..=12 {
            let (sin, cos) = f64::to_radians(step as f64 * 30.0).sin_cos();
            gestures.update_rotate(center + Vec2::new(100.0 * cos, 100.0 * sin), &mut NullSink);
        }
        gestures.end(&mut store);

        for (name, start) in [("dice", dice), ("coin", coin)] {
            let t = store.transform(&id(name));
            assert!((t.px - start.px).abs() < 1e-6, "{name} px");
            assert!((t.py - start.py).abs() < 1e-6, "{name} py");
            let drift = wrap_delta(t.rotation - start.rotation);
            assert!(drift.abs() < 1e-6, "{name} rotation");
        }
    }

    #[test]
    fn test_group_rotate_snap_matches_direct_quarter_turn() {
        let viewport = Viewport::new(1600.0, 900.0);
        let (mut store, gid) = grouped(
            viewport,
            &[("dice", WidgetTransform::IDENTITY), ("coin", WidgetTransform::at(0.1, 0.05))],
        );
        let center = Point::new(800.0, 450.0);
        let mut gestures = GestureController::default();
        gestures.begin_rotate(GestureScope::Group(gid), center, center + Vec2::new(100.0, 0.0), &store, &NoRects);
        let (sin, cos) = 83f64.to_radians().sin_cos();
        gestures.update_rotate(center + Vec2::new(100.0 * cos, 100.0 * sin), &mut NullSink);
        gestures.end(&mut store);

        let expected = revolve(Point::new(0.1, 0.05), Point::ZERO, 90.0, &viewport);
        let coin = store.transform(&id("coin"));
        assert!((coin.px - expected.x).abs() < EPS);
        assert!((coin.py - expected.y).abs() < EPS);
        assert!((coin.rotation - 90.0).abs() < EPS);
    }

    #[test]
    fn test_new_gesture_supersedes_active_one() {
        let mut store = store(
            Viewport::new(1000.0, 1000.0),
            &[("dice", WidgetTransform::IDENTITY), ("coin", WidgetTransform::IDENTITY)],
        );
        let mut gestures = GestureController::default();
        gestures.begin_drag(GestureScope::Widgets(vec![id("dice")]), &store, &NoRects);
        gestures.update_drag(Vec2::new(100.0, 0.0), &mut NullSink);

        gestures.begin_drag(GestureScope::Widgets(vec![id("coin")]), &store, &NoRects);
        assert!(!gestures.is_manipulating(&id("dice")));
        gestures.update_drag(Vec2::new(0.0, 100.0), &mut NullSink);
        gestures.end(&mut store);

        assert_eq!(store.transform(&id("dice")), WidgetTransform::IDENTITY);
        assert!((store.transform(&id("coin")).py - 0.1).abs() < EPS);
    }

    #[test]
    fn test_unknown_group_does_not_start() {
        let store = TransformStore::default();
        let mut gestures = GestureController::default();
        assert!(!gestures.begin_drag(GestureScope::Group(GroupId::from_string("nope")), &store, &NoRects));
        assert!(!gestures.is_active());
    }

    #[test]
    fn test_end_without_gesture_is_noop() {
        let mut store = TransformStore::default();
        let mut gestures = GestureController::default();
        assert!(gestures.end(&mut store).is_empty());
        assert!(!store.has_events());
    }
}
