use glam::Vec2;
use serde::{Deserialize, Serialize};

const MIN_HALF_WIDTH: f32 = 0.1;
const MAX_HALF_WIDTH: f32 = 4.0;
const MIN_HALF_HEIGHT: f32 = 0.1;
const MAX_HALF_HEIGHT: f32 = 4.0;
const MIN_SURFACE_OFFSET: f32 = 0.001;
const MAX_SURFACE_OFFSET: f32 = 0.1;
const MIN_PLACEMENT_RANGE: f32 = 1.0;
const MAX_PLACEMENT_RANGE: f32 = 500.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalSettings {
    #[serde(default = "default_half_width")]
    pub half_width: f32,
    #[serde(default = "default_half_height")]
    pub half_height: f32,
    #[serde(default = "default_surface_offset")]
    pub surface_offset: f32,
    #[serde(default = "default_placement_range")]
    pub placement_range: f32,
    #[serde(default = "default_oblique_clip")]
    pub oblique_clip: bool,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            half_width: default_half_width(),
            half_height: default_half_height(),
            surface_offset: default_surface_offset(),
            placement_range: default_placement_range(),
            oblique_clip: default_oblique_clip(),
        }
    }
}

impl PortalSettings {
    pub fn sanitize(mut self) -> Self {
        self.half_width =
            sanitize_f32(self.half_width, MIN_HALF_WIDTH, MAX_HALF_WIDTH, default_half_width());
        self.half_height =
            sanitize_f32(self.half_height, MIN_HALF_HEIGHT, MAX_HALF_HEIGHT, default_half_height());
        self.surface_offset = sanitize_f32(
            self.surface_offset,
            MIN_SURFACE_OFFSET,
            MAX_SURFACE_OFFSET,
            default_surface_offset(),
        );
        self.placement_range = sanitize_f32(
            self.placement_range,
            MIN_PLACEMENT_RANGE,
            MAX_PLACEMENT_RANGE,
            default_placement_range(),
        );
        self
    }

    pub fn half_extents(&self) -> Vec2 {
        Vec2::new(self.half_width, self.half_height)
    }
}

/// Clamps `value` into `[min, max]`; NaN and infinities become `fallback`.
pub fn sanitize_f32(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

fn default_half_width() -> f32 {
    0.6
}

fn default_half_height() -> f32 {
    1.0
}

fn default_surface_offset() -> f32 {
    0.01
}

fn default_placement_range() -> f32 {
    50.0
}

fn default_oblique_clip() -> bool {
    true
}
