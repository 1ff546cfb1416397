//! Named layout snapshots and their JSON exchange format.

use crate::group::{GroupId, WidgetGroup, centroid};
use crate::transform::{MAX_SCALE, MIN_SCALE, Viewport, WidgetId, WidgetTransform, normalize_rotation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a saved layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutId(String);

impl LayoutId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One widget captured in a layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutWidget {
    pub id: WidgetId,
    pub transform: WidgetTransform,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

/// A named snapshot of a subset of widgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub id: LayoutId,
    pub name: String,
    /// Included widgets with their transforms and visibility.
    pub widgets: Vec<LayoutWidget>,
    /// Groups fully contained in `widgets`.
    #[serde(default)]
    pub groups: Vec<WidgetGroup>,
    /// Back-to-front stacking of the included widgets.
    #[serde(default)]
    pub z_order: Vec<WidgetId>,
    /// Viewport size at capture time.
    #[serde(default)]
    pub viewport: Viewport,
}

impl Layout {
    /// Check if a widget is part of this layout.
    pub fn contains(&self, id: &WidgetId) -> bool {
        self.widgets.iter().any(|w| w.id == *id)
    }

    /// Ids of the included widgets.
    pub fn widget_ids(&self) -> impl Iterator<Item = &WidgetId> {
        self.widgets.iter().map(|w| &w.id)
    }

    /// Serialize to the exchange format (top-left-origin fractions).
    pub fn to_export_json(&self) -> Result<String, serde_json::Error> {
        let export = ExportedLayout {
            name: self.name.clone(),
            viewport: self.viewport,
            widgets: self
                .widgets
                .iter()
                .map(|w| ExportedWidget {
                    id: w.id.clone(),
                    x: w.transform.px + 0.5,
                    y: w.transform.py + 0.5,
                    scale: w.transform.scale,
                    rotation: w.transform.normalized_rotation(),
                    visible: w.visible,
                })
                .collect(),
            groups: self
                .groups
                .iter()
                .map(|g| ExportedGroup {
                    members: g.member_ids.clone(),
                    anchor: g.anchor_id.clone(),
                })
                .collect(),
            z_order: self.z_order.clone(),
        };
        serde_json::to_string_pretty(&export)
    }

    /// Parse and sanitize a layout from the exchange format.
    ///
    /// Widgets with empty ids or non-numeric positions are dropped, numbers are
    /// clamped into their domains, and groups that lose members are dropped.
    pub fn from_export_json(json: &str) -> Result<Self, LayoutImportError> {
        let data: Value =
            serde_json::from_str(json).map_err(|e| LayoutImportError::InvalidJson(e.to_string()))?;

        let name = data
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(LayoutImportError::MissingName)?;

        let entries = data
            .get("widgets")
            .and_then(Value::as_array)
            .ok_or(LayoutImportError::WidgetsNotArray)?;

        let mut widgets: Vec<LayoutWidget> = Vec::new();
        for entry in entries {
            let Some(widget) = sanitize_widget(entry) else {
                log::debug!("Dropping invalid layout widget: {}", entry);
                continue;
            };
            if !widgets.iter().any(|w| w.id == widget.id) {
                widgets.push(widget);
            }
        }
        if widgets.is_empty() {
            return Err(LayoutImportError::NoValidWidgets);
        }

        let viewport = data
            .get("viewport")
            .and_then(|v| serde_json::from_value::<Viewport>(v.clone()).ok())
            .map(|v| Viewport::new(v.width, v.height))
            .unwrap_or_default();

        let lookup: HashMap<WidgetId, WidgetTransform> =
            widgets.iter().map(|w| (w.id.clone(), w.transform)).collect();

        let groups = data
            .get("groups")
            .and_then(Value::as_array)
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(|g| serde_json::from_value::<ExportedGroup>(g.clone()).ok())
                    .filter_map(|g| {
                        let mut members: Vec<WidgetId> =
                            g.members.into_iter().filter(|m| lookup.contains_key(m)).collect();
                        // Keep the declared anchor first so it stays the anchor.
                        if let Some(pos) = members.iter().position(|m| *m == g.anchor) {
                            let anchor = members.remove(pos);
                            members.insert(0, anchor);
                        }
                        let center = centroid(members.iter().filter_map(|m| lookup.get(m)));
                        WidgetGroup::form(
                            GroupId::generate(),
                            members,
                            |id| lookup.get(id).copied().unwrap_or_default(),
                            center,
                            viewport.aspect(),
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        // A widget may only belong to one group; later duplicates lose.
        let mut claimed: Vec<&WidgetId> = Vec::new();
        let mut kept_groups = Vec::new();
        for group in &groups {
            if group.member_ids.iter().any(|m| claimed.contains(&m)) {
                continue;
            }
            claimed.extend(group.member_ids.iter());
            kept_groups.push(group.clone());
        }

        let mut z_order: Vec<WidgetId> = data
            .get("z_order")
            .and_then(|z| serde_json::from_value::<Vec<WidgetId>>(z.clone()).ok())
            .unwrap_or_default();
        let mut seen = std::collections::HashSet::new();
        z_order.retain(|id| lookup.contains_key(id) && seen.insert(id.clone()));
        for widget in &widgets {
            if !z_order.contains(&widget.id) {
                z_order.push(widget.id.clone());
            }
        }

        Ok(Self {
            id: LayoutId::generate(),
            name: name.to_string(),
            widgets,
            groups: kept_groups,
            z_order,
            viewport,
        })
    }
}

fn sanitize_widget(entry: &Value) -> Option<LayoutWidget> {
    let id = entry.get("id").and_then(Value::as_str).map(str::trim)?;
    if id.is_empty() {
        return None;
    }
    let number = |key: &str| entry.get(key).and_then(Value::as_f64).filter(|v| v.is_finite());
    let x = number("x")?.clamp(0.0, 1.0);
    let y = number("y")?.clamp(0.0, 1.0);
    let scale = number("scale").unwrap_or(1.0).clamp(MIN_SCALE, MAX_SCALE);
    let rotation = normalize_rotation(number("rotation").unwrap_or(0.0));
    let visible = entry.get("visible").and_then(Value::as_bool).unwrap_or(true);

    Some(LayoutWidget {
        id: WidgetId::new(id),
        transform: WidgetTransform::new(x - 0.5, y - 0.5, scale, rotation),
        visible,
    })
}

/// Errors from importing a layout record.
#[derive(Debug, Error, PartialEq)]
pub enum LayoutImportError {
    #[error("Invalid layout JSON: {0}")]
    InvalidJson(String),
    #[error("Layout has no name")]
    MissingName,
    #[error("Layout 'widgets' must be an array")]
    WidgetsNotArray,
    #[error("Layout contains no valid widgets")]
    NoValidWidgets,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportedLayout {
    name: String,
    viewport: Viewport,
    widgets: Vec<ExportedWidget>,
    groups: Vec<ExportedGroup>,
    z_order: Vec<WidgetId>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportedWidget {
    id: WidgetId,
    x: f64,
    y: f64,
    scale: f64,
    rotation: f64,
    visible: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportedGroup {
    members: Vec<WidgetId>,
    anchor: WidgetId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_sanitizes_numbers() {
        let json = r#"{
            "name": "Stream",
            "widgets": [
                { "id": "dice", "x": 1.7, "y": -0.2, "scale": 9, "rotation": -90 },
                { "id": "", "x": 0.5, "y": 0.5 },
                { "id": "coin", "x": "left", "y": 0.5 }
            ]
        }"#;
        let layout = Layout::from_export_json(json).unwrap();
        assert_eq!(layout.name, "Stream");
        assert_eq!(layout.widgets.len(), 1);
        let t = layout.widgets[0].transform;
        assert_eq!(t.px, 0.5);
        assert_eq!(t.py, -0.5);
        assert_eq!(t.scale, MAX_SCALE);
        assert_eq!(t.rotation, 270.0);
        assert!(layout.widgets[0].visible);
    }

    #[test]
    fn test_import_rejects_missing_name() {
        let err = Layout::from_export_json(r#"{"widgets": []}"#).unwrap_err();
        assert_eq!(err, LayoutImportError::MissingName);
    }

    #[test]
    fn test_import_rejects_non_array_widgets() {
        let err = Layout::from_export_json(r#"{"name": "A", "widgets": {}}"#).unwrap_err();
        assert_eq!(err, LayoutImportError::WidgetsNotArray);
    }

    #[test]
    fn test_import_rejects_no_valid_widgets() {
        let err = Layout::from_export_json(r#"{"name": "A", "widgets": [{"id": "x"}]}"#).unwrap_err();
        assert_eq!(err, LayoutImportError::NoValidWidgets);
    }

    #[test]
    fn test_import_rejects_garbage() {
        let err = Layout::from_export_json("not json").unwrap_err();
        assert!(matches!(err, LayoutImportError::InvalidJson(_)));
    }

    #[test]
    fn test_import_drops_groups_with_missing_members() {
        let json = r#"{
            "name": "Table",
            "widgets": [
                { "id": "dice", "x": 0.5, "y": 0.5 },
                { "id": "coin", "x": 0.6, "y": 0.5 },
                { "id": "lp", "x": 0.2, "y": 0.2 }
            ],
            "groups": [
                { "members": ["coin", "dice"], "anchor": "dice" },
                { "members": ["lp", "ghost"], "anchor": "lp" }
            ]
        }"#;
        let layout = Layout::from_export_json(json).unwrap();
        assert_eq!(layout.groups.len(), 1);
        assert_eq!(layout.groups[0].anchor_id.as_str(), "dice");
        assert_eq!(layout.z_order.len(), 3);
    }

    #[test]
    fn test_export_then_import_keeps_positions() {
        let layout = Layout {
            id: LayoutId::generate(),
            name: "Duel".to_string(),
            widgets: vec![LayoutWidget {
                id: WidgetId::from("dice"),
                transform: WidgetTransform::new(-0.25, 0.1, 1.2, 15.0),
                visible: false,
            }],
            groups: Vec::new(),
            z_order: vec![WidgetId::from("dice")],
            viewport: Viewport::new(1280.0, 720.0),
        };
        let json = layout.to_export_json().unwrap();
        let imported = Layout::from_export_json(&json).unwrap();
        let t = imported.widgets[0].transform;
        assert!((t.px + 0.25).abs() < 1e-12);
        assert!((t.py - 0.1).abs() < 1e-12);
        assert!(!imported.widgets[0].visible);
        assert_eq!(imported.viewport, Viewport::new(1280.0, 720.0));
    }
}
