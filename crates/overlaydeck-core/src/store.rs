//! Transform state store.
//!
//! The single source of truth for widget transforms, groups, z-order,
//! visibility and saved layouts. Every mutation is recorded as a
//! [`StoreEvent`] tagged with its origin so that the synchronizer and the
//! persistence layer can react without ambient flags.

use crate::group::{GroupId, WidgetGroup, centroid};
use crate::layout::{Layout, LayoutId, LayoutWidget};
use crate::surface::{RectSource, union_rect};
use crate::sync::WindowId;
use crate::transform::{PartialTransform, Viewport, WidgetId, WidgetTransform};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Where a state change came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Committed at the end of a local gesture.
    Gesture,
    /// A local store operation (reset, layout, programmatic update).
    Command,
    /// Received from another window.
    Remote(WindowId),
    /// Loaded from durable storage.
    Restored,
}

impl ChangeOrigin {
    /// Whether the change originated in this window.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Gesture | Self::Command)
    }
}

/// A change notification drained with [`TransformStore::take_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    TransformChanged {
        id: WidgetId,
        transform: WidgetTransform,
        origin: ChangeOrigin,
    },
    GroupsChanged,
    OrderChanged,
    VisibilityChanged { id: WidgetId, visible: bool },
    LayoutsChanged,
}

/// Serializable image of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub transforms: BTreeMap<WidgetId, WidgetTransform>,
    #[serde(default)]
    pub groups: Vec<WidgetGroup>,
    /// Back-to-front stacking order.
    #[serde(default)]
    pub z_order: Vec<WidgetId>,
    #[serde(default)]
    pub visibility: BTreeMap<WidgetId, bool>,
    #[serde(default)]
    pub hide_outside_layouts: bool,
    #[serde(default)]
    pub layouts: Vec<Layout>,
}

impl StoreSnapshot {
    /// Serialize the snapshot to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Committed widget state for one window.
#[derive(Debug, Clone, Default)]
pub struct TransformStore {
    transforms: HashMap<WidgetId, WidgetTransform>,
    groups: Vec<WidgetGroup>,
    /// Back to front.
    z_order: Vec<WidgetId>,
    visibility: HashMap<WidgetId, bool>,
    layouts: Vec<Layout>,
    hide_outside_layouts: bool,
    viewport: Viewport,
    events: Vec<StoreEvent>,
}

impl TransformStore {
    /// Create an empty store for a viewport.
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }

    // --- Viewport ---

    /// Current viewport.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Update the viewport (e.g. on window resize).
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    // --- Transforms ---

    /// Committed transform of a widget; unknown widgets read as the default.
    pub fn transform(&self, id: &WidgetId) -> WidgetTransform {
        self.transforms.get(id).copied().unwrap_or_default()
    }

    /// Whether the store has seen this widget.
    pub fn contains(&self, id: &WidgetId) -> bool {
        self.transforms.contains_key(id)
    }

    /// All known widget ids in stacking order.
    pub fn widget_ids(&self) -> &[WidgetId] {
        &self.z_order
    }

    /// Make sure a widget has a transform and a stacking slot.
    pub fn register_widget(&mut self, id: &WidgetId) {
        if !self.transforms.contains_key(id) {
            self.transforms.insert(id.clone(), WidgetTransform::default());
            self.z_order.push(id.clone());
            self.events.push(StoreEvent::OrderChanged);
        }
    }

    /// Merge a partial transform into a widget's state.
    pub fn update_widget_state(&mut self, id: &WidgetId, partial: PartialTransform) {
        let merged = self.transform(id).merge(&partial);
        self.write(id, merged, ChangeOrigin::Command);
        self.refresh_group_of(id);
    }

    /// Write a batch of final transforms, e.g. a gesture commit.
    pub fn commit(
        &mut self,
        changes: impl IntoIterator<Item = (WidgetId, WidgetTransform)>,
        origin: ChangeOrigin,
    ) {
        let mut touched = Vec::new();
        for (id, transform) in changes {
            self.write(&id, transform, origin.clone());
            touched.push(id);
        }
        for id in &touched {
            self.refresh_group_of(id);
        }
    }

    /// Apply a transform received from another window.
    pub fn apply_remote(&mut self, id: &WidgetId, transform: WidgetTransform, from: WindowId) {
        self.write(id, transform, ChangeOrigin::Remote(from));
        self.refresh_group_of(id);
    }

    /// Move a group by giving its anchor a new state; members follow their
    /// relative transforms.
    pub fn apply_group_from_anchor(&mut self, group_id: &GroupId, anchor: WidgetTransform) {
        let Some(group) = self.group(group_id) else {
            return;
        };
        let composed = group.compose_members(&anchor.sanitized(), self.viewport.aspect());
        for (id, transform) in composed {
            self.write(&id, transform, ChangeOrigin::Command);
        }
    }

    /// Drop a widget from its group (dissolving the group) and reset it to
    /// the default transform.
    pub fn reset_widget_position(&mut self, id: &WidgetId) {
        if let Some(group_id) = self.group_of(id).map(|g| g.id.clone()) {
            self.dissolve_group(&group_id);
        }
        self.write(id, WidgetTransform::default(), ChangeOrigin::Command);
    }

    /// Reset widgets; grouped widgets restore their group's captured
    /// formation centered on the origin.
    pub fn reset_widgets(&mut self, ids: &[WidgetId]) {
        let mut handled: HashSet<GroupId> = HashSet::new();
        for id in ids {
            let Some(group) = self.group_of(id).cloned() else {
                self.write(id, WidgetTransform::default(), ChangeOrigin::Command);
                continue;
            };
            if !handled.insert(group.id.clone()) {
                continue;
            }
            match group.reset_states() {
                Some(states) => {
                    for (member, transform) in states {
                        self.write(&member, transform, ChangeOrigin::Command);
                    }
                }
                None => {
                    for member in &group.member_ids {
                        self.write(member, WidgetTransform::default(), ChangeOrigin::Command);
                    }
                }
            }
            self.refresh_group(&group.id);
        }
    }

    // --- Groups ---

    /// All groups.
    pub fn groups(&self) -> &[WidgetGroup] {
        &self.groups
    }

    /// Look up a group by id.
    pub fn group(&self, id: &GroupId) -> Option<&WidgetGroup> {
        self.groups.iter().find(|g| g.id == *id)
    }

    /// The group a widget belongs to, if any.
    pub fn group_of(&self, id: &WidgetId) -> Option<&WidgetGroup> {
        self.groups.iter().find(|g| g.contains(id))
    }

    fn group_by_str(&self, id: &str) -> Option<&WidgetGroup> {
        self.groups.iter().find(|g| g.id.as_str() == id)
    }

    /// Expand selected ids: group ids become their members and grouped
    /// widgets pull in their whole group. Order is kept, duplicates dropped.
    pub fn expand_selection(&self, selection: &[WidgetId]) -> Vec<WidgetId> {
        let mut out: Vec<WidgetId> = Vec::new();
        let mut push = |id: &WidgetId| {
            if !out.contains(id) {
                out.push(id.clone());
            }
        };
        for id in selection {
            match self.group_by_str(id.as_str()).or_else(|| self.group_of(id)) {
                Some(group) => group.member_ids.iter().for_each(&mut push),
                None => push(id),
            }
        }
        out
    }

    /// Expand only group ids into their members; widget ids pass through
    /// even when they belong to a group.
    fn expand_group_ids(&self, selection: &[WidgetId]) -> Vec<WidgetId> {
        let mut out: Vec<WidgetId> = Vec::new();
        let mut push = |id: &WidgetId| {
            if !out.contains(id) {
                out.push(id.clone());
            }
        };
        for id in selection {
            match self.group_by_str(id.as_str()) {
                Some(group) => group.member_ids.iter().for_each(&mut push),
                None => push(id),
            }
        }
        out
    }

    /// Group the selection into one new group.
    ///
    /// Groups touched by the selection are dissolved and their members pulled
    /// in. On success the selection is replaced by the full membership and the
    /// new group's id is returned.
    pub fn group_selected_widgets<R: RectSource + ?Sized>(
        &mut self,
        selection: &mut Vec<WidgetId>,
        rects: &R,
    ) -> Option<GroupId> {
        if selection.len() < 2 {
            return None;
        }
        let members = self.expand_selection(selection);
        if members.len() < 2 {
            return None;
        }

        let overlapping: Vec<GroupId> = self
            .groups
            .iter()
            .filter(|g| g.member_ids.iter().any(|m| members.contains(m)))
            .map(|g| g.id.clone())
            .collect();
        for group_id in &overlapping {
            self.dissolve_group(group_id);
        }
        for member in &members {
            self.register_widget(member);
        }

        let center = match union_rect(rects, &members) {
            Some(rect) => self.viewport.to_normalized(rect.center()),
            None => centroid(members.iter().filter_map(|m| self.transforms.get(m))),
        };
        let group = WidgetGroup::form(
            GroupId::generate(),
            members.clone(),
            |id| self.transform(id),
            center,
            self.viewport.aspect(),
        )?;
        let group_id = group.id.clone();
        log::debug!("Grouped {} widgets into {}", members.len(), group_id);

        self.groups.push(group);
        self.events.push(StoreEvent::GroupsChanged);
        *selection = members;
        Some(group_id)
    }

    /// Dissolve every group touched by the selection. Transforms are kept.
    pub fn ungroup_selected_widgets(&mut self, selection: &[WidgetId]) -> Vec<GroupId> {
        let touched: Vec<GroupId> = self
            .groups
            .iter()
            .filter(|g| {
                selection
                    .iter()
                    .any(|id| g.id.as_str() == id.as_str() || g.contains(id))
            })
            .map(|g| g.id.clone())
            .collect();
        for group_id in &touched {
            self.dissolve_group(group_id);
        }
        touched
    }

    /// Remove a group. Returns false if it did not exist.
    pub fn dissolve_group(&mut self, id: &GroupId) -> bool {
        let before = self.groups.len();
        self.groups.retain(|g| g.id != *id);
        let removed = self.groups.len() != before;
        if removed {
            self.events.push(StoreEvent::GroupsChanged);
        }
        removed
    }

    fn refresh_group_of(&mut self, id: &WidgetId) {
        if let Some(group_id) = self.group_of(id).map(|g| g.id.clone()) {
            self.refresh_group(&group_id);
        }
    }

    /// Recompute a group's relative transforms from committed state.
    fn refresh_group(&mut self, id: &GroupId) {
        let aspect = self.viewport.aspect();
        let transforms = &self.transforms;
        if let Some(group) = self.groups.iter_mut().find(|g| g.id == *id) {
            group.recompute_relative(|m| transforms.get(m).copied().unwrap_or_default(), aspect);
        }
    }

    // --- Stacking order ---

    /// Back-to-front stacking order.
    pub fn z_order(&self) -> &[WidgetId] {
        &self.z_order
    }

    /// Move `active` into `over`'s slot. Returns false if either is unknown.
    pub fn reorder_widgets(&mut self, active: &WidgetId, over: &WidgetId) -> bool {
        let Some(from) = self.z_order.iter().position(|id| id == active) else {
            return false;
        };
        let Some(to) = self.z_order.iter().position(|id| id == over) else {
            return false;
        };
        if from == to {
            return false;
        }
        let item = self.z_order.remove(from);
        self.z_order.insert(to, item);
        self.events.push(StoreEvent::OrderChanged);
        true
    }

    /// Move widgets to the top of the stack, keeping their relative order.
    pub fn bring_to_front(&mut self, ids: &[WidgetId]) {
        let moved: Vec<WidgetId> = self.z_order.iter().filter(|id| ids.contains(id)).cloned().collect();
        let missing: Vec<WidgetId> = ids.iter().filter(|id| !moved.contains(id)).cloned().collect();
        self.z_order.retain(|id| !ids.contains(id));
        self.z_order.extend(moved);
        self.z_order.extend(missing);
        self.events.push(StoreEvent::OrderChanged);
    }

    // --- Visibility ---

    /// Whether a widget is shown. Widgets are visible unless hidden.
    pub fn is_visible(&self, id: &WidgetId) -> bool {
        self.visibility.get(id).copied().unwrap_or(true)
    }

    /// Show or hide a widget.
    pub fn set_visible(&mut self, id: &WidgetId, visible: bool) {
        if self.is_visible(id) == visible && self.visibility.contains_key(id) {
            return;
        }
        self.visibility.insert(id.clone(), visible);
        self.events.push(StoreEvent::VisibilityChanged {
            id: id.clone(),
            visible,
        });
    }

    /// Whether applying a layout hides widgets outside it.
    pub fn hide_outside_layouts(&self) -> bool {
        self.hide_outside_layouts
    }

    /// Set the "hide widgets outside saved layouts" policy.
    pub fn set_hide_outside_layouts(&mut self, hide: bool) {
        self.hide_outside_layouts = hide;
    }

    // --- Layouts ---

    /// Saved layouts in creation order.
    pub fn layouts(&self) -> &[Layout] {
        &self.layouts
    }

    /// Look up a layout.
    pub fn layout(&self, id: &LayoutId) -> Option<&Layout> {
        self.layouts.iter().find(|l| l.id == *id)
    }

    /// Capture the selected widgets as a new named layout.
    pub fn save_layout(&mut self, name: &str, selection: &[WidgetId]) -> Option<LayoutId> {
        let ids = self.expand_group_ids(selection);
        if ids.is_empty() {
            return None;
        }

        let widgets = ids
            .iter()
            .map(|id| LayoutWidget {
                id: id.clone(),
                transform: self.transform(id),
                visible: self.is_visible(id),
            })
            .collect();
        let groups = self
            .groups
            .iter()
            .filter(|g| g.member_ids.iter().all(|m| ids.contains(m)))
            .cloned()
            .collect();
        let z_order = self.z_order.iter().filter(|id| ids.contains(id)).cloned().collect();

        let layout = Layout {
            id: LayoutId::generate(),
            name: name.to_string(),
            widgets,
            groups,
            z_order,
            viewport: self.viewport,
        };
        let id = layout.id.clone();
        log::info!("Saved layout '{}' with {} widgets", name, ids.len());
        self.layouts.push(layout);
        self.events.push(StoreEvent::LayoutsChanged);
        Some(id)
    }

    /// Add an already built layout (e.g. an import). Returns its id.
    pub fn add_layout(&mut self, layout: Layout) -> LayoutId {
        let id = layout.id.clone();
        self.layouts.push(layout);
        self.events.push(StoreEvent::LayoutsChanged);
        id
    }

    /// Delete a layout. Returns false if it did not exist.
    pub fn delete_layout(&mut self, id: &LayoutId) -> bool {
        let before = self.layouts.len();
        self.layouts.retain(|l| l.id != *id);
        let removed = self.layouts.len() != before;
        if removed {
            self.events.push(StoreEvent::LayoutsChanged);
        }
        removed
    }

    /// Rename a layout. Returns false if it did not exist.
    pub fn rename_layout(&mut self, id: &LayoutId, name: &str) -> bool {
        match self.layouts.iter_mut().find(|l| l.id == *id) {
            Some(layout) => {
                layout.name = name.to_string();
                self.events.push(StoreEvent::LayoutsChanged);
                true
            }
            None => false,
        }
    }

    /// Restore a saved layout's transforms, groups, visibility and stacking.
    ///
    /// Group offsets are recomputed for the current viewport so a layout saved
    /// at another window size keeps its formations undistorted.
    pub fn apply_layout(&mut self, id: &LayoutId) -> bool {
        let Some(layout) = self.layout(id).cloned() else {
            return false;
        };
        let ids: HashSet<&WidgetId> = layout.widget_ids().collect();

        let before = self.groups.len();
        self.groups
            .retain(|g| !g.member_ids.iter().any(|m| ids.contains(m)));
        if self.groups.len() != before {
            self.events.push(StoreEvent::GroupsChanged);
        }

        for widget in &layout.widgets {
            self.register_widget(&widget.id);
            self.write(&widget.id, widget.transform, ChangeOrigin::Command);
        }

        let aspect = self.viewport.aspect();
        for saved in &layout.groups {
            let mut group = saved.clone();
            group.initial_states = group
                .member_ids
                .iter()
                .map(|m| (m.clone(), self.transform(m)))
                .collect();
            group.initial_center = Some(centroid(group.initial_states.values()));
            group.recompute_relative(|m| self.transform(m), aspect);
            self.groups.push(group);
        }
        if !layout.groups.is_empty() {
            self.events.push(StoreEvent::GroupsChanged);
        }

        for widget in &layout.widgets {
            self.set_visible(&widget.id, true);
        }

        let mut front: Vec<WidgetId> = layout
            .z_order
            .iter()
            .filter(|id| ids.contains(id))
            .cloned()
            .collect();
        for widget in &layout.widgets {
            if !front.contains(&widget.id) {
                front.push(widget.id.clone());
            }
        }
        self.bring_to_front(&front);

        if self.hide_outside_layouts {
            let outside: Vec<WidgetId> = self
                .z_order
                .iter()
                .filter(|id| !ids.contains(id))
                .cloned()
                .collect();
            for id in outside {
                self.set_visible(&id, false);
            }
        }

        log::info!("Applied layout '{}'", layout.name);
        true
    }

    // --- Events and snapshots ---

    /// Drain pending change events.
    pub fn take_events(&mut self) -> Vec<StoreEvent> {
        std::mem::take(&mut self.events)
    }

    /// Check if there are pending change events.
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Capture the persistent part of the store.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            transforms: self.transforms.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            groups: self.groups.clone(),
            z_order: self.z_order.clone(),
            visibility: self.visibility.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            hide_outside_layouts: self.hide_outside_layouts,
            layouts: self.layouts.clone(),
        }
    }

    /// Replace the store's contents with a snapshot.
    ///
    /// Transforms are sanitized, and groups that break the membership
    /// invariants (fewer than two members, foreign anchor, shared member) are
    /// dropped.
    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        self.transforms = snapshot
            .transforms
            .into_iter()
            .map(|(id, t)| (id, t.sanitized()))
            .collect();

        let mut z_order: Vec<WidgetId> = Vec::new();
        for id in snapshot.z_order {
            if self.transforms.contains_key(&id) && !z_order.contains(&id) {
                z_order.push(id);
            }
        }
        let mut unordered: Vec<&WidgetId> =
            self.transforms.keys().filter(|id| !z_order.contains(id)).collect();
        unordered.sort();
        z_order.extend(unordered.into_iter().cloned());
        self.z_order = z_order;

        let mut claimed: HashSet<WidgetId> = HashSet::new();
        self.groups = snapshot
            .groups
            .into_iter()
            .filter(|g| {
                let distinct: HashSet<&WidgetId> = g.member_ids.iter().collect();
                let valid = g.member_ids.len() >= 2
                    && distinct.len() == g.member_ids.len()
                    && g.contains(&g.anchor_id)
                    && g.member_ids.iter().all(|m| !claimed.contains(m));
                if valid {
                    claimed.extend(g.member_ids.iter().cloned());
                } else {
                    log::warn!("Dropping invalid group {} from snapshot", g.id);
                }
                valid
            })
            .collect();
        let group_ids: Vec<GroupId> = self.groups.iter().map(|g| g.id.clone()).collect();
        for id in &group_ids {
            self.refresh_group(id);
        }

        self.visibility = snapshot.visibility.into_iter().collect();
        self.hide_outside_layouts = snapshot.hide_outside_layouts;
        self.layouts = snapshot.layouts;

        for id in &self.z_order {
            self.events.push(StoreEvent::TransformChanged {
                id: id.clone(),
                transform: self.transform(id),
                origin: ChangeOrigin::Restored,
            });
        }
        self.events.push(StoreEvent::GroupsChanged);
        self.events.push(StoreEvent::OrderChanged);
        self.events.push(StoreEvent::LayoutsChanged);
    }

    fn write(&mut self, id: &WidgetId, transform: WidgetTransform, origin: ChangeOrigin) {
        let transform = transform.sanitized();
        if !self.transforms.contains_key(id) {
            self.z_order.push(id.clone());
            self.events.push(StoreEvent::OrderChanged);
        }
        if self.transforms.insert(id.clone(), transform) == Some(transform) {
            return;
        }
        self.events.push(StoreEvent::TransformChanged {
            id: id.clone(),
            transform,
            origin,
        });
    }
}
