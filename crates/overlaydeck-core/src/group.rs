//! Rigid widget groups and anchor-relative member transforms.

use crate::transform::{WidgetId, WidgetTransform, clamp_scale, normalize_rotation};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Identifier of a widget group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A non-anchor member's offset from its group's anchor.
///
/// `dx`/`dy` are aspect-corrected (x multiplied by width/height, so both
/// axes are in viewport-height units) and expressed in the anchor's own frame:
/// un-rotated by the anchor's rotation and divided by its scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeTransform {
    pub dx: f64,
    pub dy: f64,
    pub d_rotation: f64,
    pub d_scale: f64,
}

impl RelativeTransform {
    /// Offset of `member` from `anchor` under a viewport of the given aspect.
    pub fn between(anchor: &WidgetTransform, member: &WidgetTransform, aspect: f64) -> Self {
        let offset = Vec2::new((member.px - anchor.px) * aspect, member.py - anchor.py);
        let local = rotate_vec(offset, -anchor.rotation) / anchor.scale;
        Self {
            dx: local.x,
            dy: local.y,
            d_rotation: member.rotation - anchor.rotation,
            d_scale: member.scale / anchor.scale,
        }
    }

    /// Rebuild the member's transform from a new anchor state.
    pub fn compose(&self, anchor: &WidgetTransform, aspect: f64) -> WidgetTransform {
        let offset = rotate_vec(Vec2::new(self.dx, self.dy), anchor.rotation) * anchor.scale;
        WidgetTransform {
            px: anchor.px + offset.x / aspect,
            py: anchor.py + offset.y,
            scale: clamp_scale(anchor.scale * self.d_scale),
            rotation: normalize_rotation(anchor.rotation + self.d_rotation),
        }
    }
}

fn rotate_vec(v: Vec2, degrees: f64) -> Vec2 {
    if degrees == 0.0 {
        return v;
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// Widgets that move, scale and rotate as one unit through an anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetGroup {
    pub id: GroupId,
    /// Members in formation order; never fewer than two, no duplicates.
    pub member_ids: Vec<WidgetId>,
    /// Reference member through which group deltas are applied.
    pub anchor_id: WidgetId,
    /// Member transforms captured when the group was formed.
    #[serde(default)]
    pub initial_states: BTreeMap<WidgetId, WidgetTransform>,
    /// Group centroid (normalized) captured with `initial_states`.
    #[serde(default)]
    pub initial_center: Option<Point>,
    /// Offsets of every non-anchor member from the anchor.
    #[serde(default)]
    pub relative: BTreeMap<WidgetId, RelativeTransform>,
}

impl WidgetGroup {
    /// Form a group from `members` (deduplicated, order kept). The first
    /// member becomes the anchor.
    ///
    /// Returns `None` when fewer than two distinct members remain.
    pub fn form(
        id: GroupId,
        members: impl IntoIterator<Item = WidgetId>,
        lookup: impl Fn(&WidgetId) -> WidgetTransform,
        center: Point,
        aspect: f64,
    ) -> Option<Self> {
        let mut member_ids: Vec<WidgetId> = Vec::new();
        for member in members {
            if !member_ids.contains(&member) {
                member_ids.push(member);
            }
        }
        if member_ids.len() < 2 {
            return None;
        }

        let initial_states = member_ids.iter().map(|m| (m.clone(), lookup(m))).collect();
        let mut group = Self {
            id,
            anchor_id: member_ids[0].clone(),
            member_ids,
            initial_states,
            initial_center: Some(center),
            relative: BTreeMap::new(),
        };
        group.recompute_relative(lookup, aspect);
        Some(group)
    }

    /// Check if a widget is a member.
    pub fn contains(&self, id: &WidgetId) -> bool {
        self.member_ids.contains(id)
    }

    /// Members other than the anchor.
    pub fn followers(&self) -> impl Iterator<Item = &WidgetId> {
        self.member_ids.iter().filter(move |m| **m != self.anchor_id)
    }

    /// Whether a formation snapshot exists for every member.
    pub fn has_snapshot(&self) -> bool {
        self.initial_center.is_some()
            && self.member_ids.iter().all(|m| self.initial_states.contains_key(m))
    }

    /// Recompute every follower's relative transform from current state.
    pub fn recompute_relative(&mut self, lookup: impl Fn(&WidgetId) -> WidgetTransform, aspect: f64) {
        let anchor = lookup(&self.anchor_id);
        self.relative = self
            .followers()
            .map(|m| (m.clone(), RelativeTransform::between(&anchor, &lookup(m), aspect)))
            .collect();
    }

    /// Transforms of every member (anchor included) for a new anchor state.
    pub fn compose_members(&self, anchor: &WidgetTransform, aspect: f64) -> Vec<(WidgetId, WidgetTransform)> {
        let mut out = Vec::with_capacity(self.member_ids.len());
        for member in &self.member_ids {
            if *member == self.anchor_id {
                out.push((member.clone(), *anchor));
            } else if let Some(rel) = self.relative.get(member) {
                out.push((member.clone(), rel.compose(anchor, aspect)));
            }
        }
        out
    }

    /// The captured formation shifted so its captured center sits at the
    /// origin, or `None` when the group has no snapshot.
    pub fn reset_states(&self) -> Option<Vec<(WidgetId, WidgetTransform)>> {
        if !self.has_snapshot() {
            return None;
        }
        let center = self.initial_center?;
        self.member_ids
            .iter()
            .map(|m| {
                let t = self.initial_states.get(m)?;
                Some((m.clone(), WidgetTransform {
                    px: t.px - center.x,
                    py: t.py - center.y,
                    ..*t
                }))
            })
            .collect()
    }
}

/// Mean position of a set of transforms, or the origin when empty.
pub fn centroid<'a>(transforms: impl IntoIterator<Item = &'a WidgetTransform>) -> Point {
    let mut sum = Vec2::ZERO;
    let mut count = 0usize;
    for t in transforms {
        sum += Vec2::new(t.px, t.py);
        count += 1;
    }
    if count == 0 {
        Point::ZERO
    } else {
        (sum / count as f64).to_point()
    }
}
