//! View configuration handed to the visual widget at creation time.
//!
//! Field names follow the widget's camelCase option keys so the whole
//! struct can be serialized straight into its injection options.

use serde::{Deserialize, Serialize};

/// View configuration for a workspace: zoom bounds, grid and trash affordance.
///
/// # Example
///
/// ```
/// use blockgrade_workspace::ViewOptions;
///
/// let options = ViewOptions::default().with_trashcan(false);
/// assert!(!options.trashcan);
/// assert!((options.zoom.max_scale - 3.0).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewOptions {
    /// Zoom controls and bounds.
    #[serde(default)]
    pub zoom: ZoomOptions,
    /// Whether the trash can affordance is shown.
    #[serde(default = "default_true")]
    pub trashcan: bool,
    /// Background grid.
    #[serde(default)]
    pub grid: GridOptions,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            zoom: ZoomOptions::default(),
            trashcan: true,
            grid: GridOptions::default(),
        }
    }
}

impl ViewOptions {
    /// Replaces the zoom options.
    #[must_use]
    pub const fn with_zoom(mut self, zoom: ZoomOptions) -> Self {
        self.zoom = zoom;
        self
    }

    /// Shows or hides the trash can.
    #[must_use]
    pub const fn with_trashcan(mut self, trashcan: bool) -> Self {
        self.trashcan = trashcan;
        self
    }

    /// Replaces the grid options.
    #[must_use]
    pub fn with_grid(mut self, grid: GridOptions) -> Self {
        self.grid = grid;
        self
    }

    /// Clamps `scale` into the configured zoom bounds.
    #[must_use]
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        scale.clamp(self.zoom.min_scale, self.zoom.max_scale)
    }
}

/// Zoom configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomOptions {
    /// Show the zoom in/out/reset buttons.
    pub controls: bool,
    /// Allow zooming with the mouse wheel.
    pub wheel: bool,
    /// Initial scale.
    pub start_scale: f64,
    /// Upper zoom bound.
    pub max_scale: f64,
    /// Lower zoom bound.
    pub min_scale: f64,
    /// Multiplier applied per zoom step.
    pub scale_speed: f64,
}

impl Default for ZoomOptions {
    fn default() -> Self {
        Self {
            controls: true,
            wheel: true,
            start_scale: 1.0,
            max_scale: 3.0,
            min_scale: 0.3,
            scale_speed: 1.2,
        }
    }
}

/// Background grid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridOptions {
    /// Distance between grid points in pixels.
    pub spacing: u32,
    /// Length of each grid mark.
    pub length: u32,
    /// CSS colour of the grid marks.
    pub colour: String,
    /// Snap dropped blocks to the grid.
    pub snap: bool,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            spacing: 20,
            length: 3,
            colour: "#ccc".to_string(),
            snap: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_view_options_match_widget_defaults() {
        let json = serde_json::to_value(ViewOptions::default()).unwrap();

        assert_eq!(json["trashcan"], true);
        assert_eq!(json["zoom"]["controls"], true);
        assert_eq!(json["zoom"]["wheel"], true);
        assert_eq!(json["zoom"]["startScale"], 1.0);
        assert_eq!(json["zoom"]["maxScale"], 3.0);
        assert_eq!(json["zoom"]["minScale"], 0.3);
        assert_eq!(json["zoom"]["scaleSpeed"], 1.2);
        assert_eq!(json["grid"]["spacing"], 20);
        assert_eq!(json["grid"]["length"], 3);
        assert_eq!(json["grid"]["colour"], "#ccc");
        assert_eq!(json["grid"]["snap"], true);
    }

    #[test]
    fn partial_options_fill_in_defaults() {
        let options: ViewOptions = serde_json::from_str(r#"{"trashcan": false}"#).unwrap();

        assert!(!options.trashcan);
        assert_eq!(options.zoom, ZoomOptions::default());
        assert_eq!(options.grid, GridOptions::default());
    }

    #[test]
    fn clamp_scale_respects_zoom_bounds() {
        let options = ViewOptions::default();
        assert!((options.clamp_scale(10.0) - 3.0).abs() < f64::EPSILON);
        assert!((options.clamp_scale(0.1) - 0.3).abs() < f64::EPSILON);
        assert!((options.clamp_scale(1.5) - 1.5).abs() < f64::EPSILON);
    }
}
