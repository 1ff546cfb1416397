//! Rotation snapping for rotate gestures.

use crate::transform::normalize_rotation;
use kurbo::Point;

/// Default distance in degrees within which a rotation snaps.
pub const ROTATION_SNAP_THRESHOLD: f64 = 10.0;

/// Angles a rotation snaps to.
pub const ROTATION_SNAP_TARGETS: [f64; 5] = [0.0, 90.0, 180.0, 270.0, 360.0];

/// Result of snapping a rotation delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationSnap {
    /// The delta to actually apply (corrected when snapped).
    pub delta: f64,
    /// The resulting rotation in `[0, 360)`.
    pub rotation: f64,
    /// Whether the delta was corrected.
    pub snapped: bool,
}

/// Snap `start + raw_delta` onto a quarter turn when it lands within
/// `threshold` degrees of one.
///
/// The correction is folded into the returned delta, so anything that has to
/// follow the rotation (e.g. revolving a group member's position) uses the
/// same angle the widget ends up at.
pub fn snap_rotation(start: f64, raw_delta: f64, threshold: f64) -> RotationSnap {
    let raw = normalize_rotation(start + raw_delta);
    for target in ROTATION_SNAP_TARGETS {
        let offset = target - raw;
        if offset.abs() <= threshold {
            return RotationSnap {
                delta: raw_delta + offset,
                rotation: normalize_rotation(target),
                snapped: true,
            };
        }
    }
    RotationSnap {
        delta: raw_delta,
        rotation: raw,
        snapped: false,
    }
}

/// Angle in degrees of `pointer` around `center` (screen space, y down).
pub fn pointer_angle(center: Point, pointer: Point) -> f64 {
    (pointer.y - center.y).atan2(pointer.x - center.x).to_degrees()
}

/// Wrap an angle difference into `(-180, 180]`.
pub fn wrap_delta(delta: f64) -> f64 {
    let wrapped = normalize_rotation(delta);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_snap_near_quarter_turn() {
        let snap = snap_rotation(0.0, 84.0, ROTATION_SNAP_THRESHOLD);
        assert!(snap.snapped);
        assert!((snap.delta - 90.0).abs() < EPS);
        assert!((snap.rotation - 90.0).abs() < EPS);
    }

    #[test]
    fn test_snap_corrects_delta_not_result() {
        // 20 + 245 = 265, five degrees short of 270.
        let snap = snap_rotation(20.0, 245.0, ROTATION_SNAP_THRESHOLD);
        assert!(snap.snapped);
        assert!((snap.delta - 250.0).abs() < EPS);
        assert!((snap.rotation - 270.0).abs() < EPS);
    }

    #[test]
    fn test_snap_full_turn_wraps_to_zero() {
        let snap = snap_rotation(350.0, 5.0, ROTATION_SNAP_THRESHOLD);
        assert!(snap.snapped);
        assert!((snap.delta - 10.0).abs() < EPS);
        assert_eq!(snap.rotation, 0.0);
    }

    #[test]
    fn test_no_snap_outside_threshold() {
        let snap = snap_rotation(0.0, 45.0, ROTATION_SNAP_THRESHOLD);
        assert!(!snap.snapped);
        assert!((snap.delta - 45.0).abs() < EPS);
        assert!((snap.rotation - 45.0).abs() < EPS);
    }

    #[test]
    fn test_pointer_angle_is_clockwise_on_screen() {
        let center = Point::new(100.0, 100.0);
        assert!(pointer_angle(center, Point::new(200.0, 100.0)).abs() < EPS);
        assert!((pointer_angle(center, Point::new(100.0, 200.0)) - 90.0).abs() < EPS);
    }

    #[test]
    fn test_wrap_delta() {
        assert!((wrap_delta(-340.0) - 20.0).abs() < EPS);
        assert!((wrap_delta(190.0) + 170.0).abs() < EPS);
        assert!((wrap_delta(180.0) - 180.0).abs() < EPS);
    }
}
