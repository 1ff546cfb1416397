//! Normalized widget transforms and viewport conversions.
//!
//! Positions are fractions of the viewport: `px` of its width, `py` of its
//! height, with `(0, 0)` at the viewport center. The two axes only share a
//! metric on a square viewport, so anything that rotates positions goes
//! through pixel space first (see [`revolve`]).

use kurbo::{Affine, Point, Size, Vec2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest allowed widget scale.
pub const MIN_SCALE: f64 = 0.3;
/// Largest allowed widget scale.
pub const MAX_SCALE: f64 = 3.0;

/// Stable identifier of a widget instance (e.g. `"dice"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetId(String);

impl WidgetId {
    /// Create a widget id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WidgetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WidgetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Position, scale and rotation of a widget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WidgetTransform {
    /// Center x as a fraction of viewport width (0 = center).
    pub px: f64,
    /// Center y as a fraction of viewport height (0 = center).
    pub py: f64,
    /// Multiplicative size factor.
    pub scale: f64,
    /// Rotation in degrees, clockwise.
    pub rotation: f64,
}

impl Default for WidgetTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl WidgetTransform {
    /// Centered, unscaled, unrotated.
    pub const IDENTITY: Self = Self {
        px: 0.0,
        py: 0.0,
        scale: 1.0,
        rotation: 0.0,
    };

    /// Create a transform from its components.
    pub fn new(px: f64, py: f64, scale: f64, rotation: f64) -> Self {
        Self { px, py, scale, rotation }
    }

    /// Unscaled, unrotated transform at a position.
    pub fn at(px: f64, py: f64) -> Self {
        Self { px, py, ..Self::IDENTITY }
    }

    /// Widget center in normalized coordinates.
    pub fn position(&self) -> Point {
        Point::new(self.px, self.py)
    }

    /// Copy with a different center.
    pub fn with_position(self, position: Point) -> Self {
        Self {
            px: position.x,
            py: position.y,
            ..self
        }
    }

    /// Rotation folded into `[0, 360)`.
    pub fn normalized_rotation(&self) -> f64 {
        normalize_rotation(self.rotation)
    }

    /// Copy with scale clamped, rotation normalized and non-finite
    /// components replaced by their defaults.
    pub fn sanitized(self) -> Self {
        Self {
            px: finite_or(self.px, 0.0),
            py: finite_or(self.py, 0.0),
            scale: clamp_scale(self.scale),
            rotation: normalize_rotation(finite_or(self.rotation, 0.0)),
        }
    }

    /// Merge the present fields of `partial` into this transform.
    ///
    /// Non-finite values in `partial` are ignored.
    pub fn merge(self, partial: &PartialTransform) -> Self {
        let pick = |value: Option<f64>, current: f64| match value {
            Some(v) if v.is_finite() => v,
            _ => current,
        };
        Self {
            px: pick(partial.px, self.px),
            py: pick(partial.py, self.py),
            scale: pick(partial.scale, self.scale),
            rotation: pick(partial.rotation, self.rotation),
        }
    }
}

/// A subset of transform fields to merge into a widget's state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialTransform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub px: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub py: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
}

impl PartialTransform {
    /// Only a position.
    pub fn position(px: f64, py: f64) -> Self {
        Self {
            px: Some(px),
            py: Some(py),
            ..Self::default()
        }
    }

    /// Only a scale.
    pub fn scale(scale: f64) -> Self {
        Self {
            scale: Some(scale),
            ..Self::default()
        }
    }

    /// Only a rotation.
    pub fn rotation(rotation: f64) -> Self {
        Self {
            rotation: Some(rotation),
            ..Self::default()
        }
    }
}

impl From<WidgetTransform> for PartialTransform {
    fn from(t: WidgetTransform) -> Self {
        Self {
            px: Some(t.px),
            py: Some(t.py),
            scale: Some(t.scale),
            rotation: Some(t.rotation),
        }
    }
}

/// Fold an angle in degrees into `[0, 360)`.
pub fn normalize_rotation(degrees: f64) -> f64 {
    let r = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.
    if r >= 360.0 { 0.0 } else { r }
}

/// Clamp a scale into `[MIN_SCALE, MAX_SCALE]`; non-finite input becomes 1.
pub fn clamp_scale(scale: f64) -> f64 {
    if scale.is_finite() {
        scale.clamp(MIN_SCALE, MAX_SCALE)
    } else {
        1.0
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

/// Size of the shared viewport in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

impl Viewport {
    /// Create a viewport; degenerate dimensions are raised to one pixel.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: finite_or(width, 1.0).max(1.0),
            height: finite_or(height, 1.0).max(1.0),
        }
    }

    /// Viewport size.
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Width over height.
    pub fn aspect(&self) -> f64 {
        self.width / self.height
    }

    /// Convert a normalized point to screen pixels (top-left origin).
    pub fn to_pixels(&self, point: Point) -> Point {
        Point::new((point.x + 0.5) * self.width, (point.y + 0.5) * self.height)
    }

    /// Convert a screen pixel point to normalized coordinates.
    pub fn to_normalized(&self, point: Point) -> Point {
        Point::new(point.x / self.width - 0.5, point.y / self.height - 0.5)
    }

    /// Convert a pixel delta to a normalized delta.
    pub fn delta_to_normalized(&self, delta: Vec2) -> Vec2 {
        Vec2::new(delta.x / self.width, delta.y / self.height)
    }

    /// Keep a widget of `scaled` pixel size from leaving the viewport by more
    /// than `max_margin` pixels (or half its size, whichever is smaller).
    pub fn clamp_position(&self, position: Point, scaled: Size, max_margin: f64) -> Point {
        let half_w = scaled.width.max(0.0) / 2.0;
        let half_h = scaled.height.max(0.0) / 2.0;
        let limit_x = 0.5 + (half_w - max_margin.min(half_w)) / self.width;
        let limit_y = 0.5 + (half_h - max_margin.min(half_h)) / self.height;
        Point::new(
            finite_or(position.x, 0.0).clamp(-limit_x, limit_x),
            finite_or(position.y, 0.0).clamp(-limit_y, limit_y),
        )
    }
}

/// Revolve a normalized `point` around a normalized `pivot` by `degrees`
/// (clockwise on screen).
///
/// The rotation happens in pixel space and the result is converted back, so
/// the revolution stays circular on non-square viewports.
pub fn revolve(point: Point, pivot: Point, degrees: f64, viewport: &Viewport) -> Point {
    let rotation = Affine::rotate_about(degrees.to_radians(), viewport.to_pixels(pivot));
    viewport.to_normalized(rotation * viewport.to_pixels(point))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_normalize_rotation() {
        assert!((normalize_rotation(370.0) - 10.0).abs() < EPS);
        assert!((normalize_rotation(-90.0) - 270.0).abs() < EPS);
        assert_eq!(normalize_rotation(360.0), 0.0);
        assert_eq!(normalize_rotation(-1e-20), 0.0);
    }

    #[test]
    fn test_sanitized_clamps_scale_and_rotation() {
        let t = WidgetTransform::new(0.1, f64::NAN, 10.0, -30.0).sanitized();
        assert_eq!(t.py, 0.0);
        assert_eq!(t.scale, MAX_SCALE);
        assert!((t.rotation - 330.0).abs() < EPS);
    }

    #[test]
    fn test_merge_ignores_missing_and_non_finite() {
        let base = WidgetTransform::new(0.1, 0.2, 1.5, 45.0);
        let partial = PartialTransform {
            px: Some(0.3),
            scale: Some(f64::INFINITY),
            ..PartialTransform::default()
        };
        let merged = base.merge(&partial);
        assert_eq!(merged.px, 0.3);
        assert_eq!(merged.py, 0.2);
        assert_eq!(merged.scale, 1.5);
        assert_eq!(merged.rotation, 45.0);
    }

    #[test]
    fn test_pixel_conversion() {
        let viewport = Viewport::new(1000.0, 500.0);
        let px = viewport.to_pixels(Point::new(0.1, -0.2));
        assert!((px.x - 600.0).abs() < EPS);
        assert!((px.y - 150.0).abs() < EPS);
        let back = viewport.to_normalized(px);
        assert!((back.x - 0.1).abs() < EPS);
        assert!((back.y + 0.2).abs() < EPS);
    }

    #[test]
    fn test_clamp_position_limits_and_idempotence() {
        let viewport = Viewport::new(1000.0, 500.0);
        let size = Size::new(200.0, 100.0);
        let clamped = viewport.clamp_position(Point::new(50.0, -50.0), size, 40.0);
        // 0.5 + (100 - 40) / 1000 and 0.5 + (50 - 40) / 500
        assert!((clamped.x - 0.56).abs() < EPS);
        assert!((clamped.y + 0.52).abs() < EPS);
        assert_eq!(viewport.clamp_position(clamped, size, 40.0), clamped);
    }

    #[test]
    fn test_clamp_small_widget_keeps_center_inside() {
        let viewport = Viewport::new(800.0, 600.0);
        let clamped = viewport.clamp_position(Point::new(1.0, 1.0), Size::new(20.0, 20.0), 40.0);
        assert!((clamped.x - 0.5).abs() < EPS);
        assert!((clamped.y - 0.5).abs() < EPS);
    }

    #[test]
    fn test_revolve_half_turn_negates_offset() {
        let viewport = Viewport::new(1600.0, 900.0);
        let pivot = Point::new(0.05, 0.0);
        let p = revolve(Point::new(0.1, 0.02), pivot, 180.0, &viewport);
        assert!((p.x - 0.0).abs() < EPS);
        assert!((p.y + 0.02).abs() < EPS);
    }

    #[test]
    fn test_revolve_quarter_turn_is_circular_in_pixels() {
        // 100px to the right of the pivot ends up 100px below it.
        let viewport = Viewport::new(1000.0, 500.0);
        let p = revolve(Point::new(0.1, 0.0), Point::ZERO, 90.0, &viewport);
        assert!(p.x.abs() < EPS);
        assert!((p.y - 0.2).abs() < EPS);
    }
}
