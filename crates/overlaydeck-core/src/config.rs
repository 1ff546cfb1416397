//! Engine tunables.

use crate::snap::ROTATION_SNAP_THRESHOLD;
use serde::{Deserialize, Serialize};

/// Default prefix of durable storage keys.
pub const DEFAULT_KEY_PREFIX: &str = "overlaydeck";

/// What a window does in a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowRole {
    /// The operator's window; answers state requests from late joiners.
    #[default]
    Control,
    /// A render-only output window (e.g. a broadcast capture source).
    Display,
}

impl WindowRole {
    /// Whether this window replies to `RequestState`.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Control)
    }
}

/// Tunable parameters of an [`OverlayEngine`](crate::OverlayEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum pixels a widget may extend past the viewport edge.
    pub clamp_margin: f64,
    /// Degrees within which a rotation snaps to a quarter turn.
    pub snap_threshold: f64,
    /// Pixels of scale-handle travel per unit of scale.
    pub scale_divisor: f64,
    /// Unscaled widget size (pixels) used when a widget has no rendered rect.
    pub fallback_widget_size: f64,
    /// Quiet period before a store snapshot is written.
    pub persist_debounce_ms: u64,
    /// Padding around the selection bounding box, in pixels.
    pub overlay_padding: f64,
    /// Extra hit area below the bounding box for its handles, in pixels.
    pub handle_bleed: f64,
    /// Prefix of durable storage keys.
    pub key_prefix: String,
    pub role: WindowRole,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clamp_margin: 40.0,
            snap_threshold: ROTATION_SNAP_THRESHOLD,
            scale_divisor: 200.0,
            fallback_widget_size: 100.0,
            persist_debounce_ms: 100,
            overlay_padding: 8.0,
            handle_bleed: 48.0,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            role: WindowRole::Control,
        }
    }
}

impl EngineConfig {
    /// Config for a display window.
    pub fn display() -> Self {
        Self {
            role: WindowRole::Display,
            ..Self::default()
        }
    }

    /// Storage key of the whole-store snapshot.
    pub fn store_key(&self) -> String {
        format!("{}.store", self.key_prefix)
    }

    /// Durable storage key of one widget's transform.
    pub fn widget_key(&self, id: &str) -> String {
        format!("{}.widget.{}", self.key_prefix, id)
    }

    /// Prefix shared by every per-widget key.
    pub fn widget_key_prefix(&self) -> String {
        format!("{}.widget.", self.key_prefix)
    }
}
