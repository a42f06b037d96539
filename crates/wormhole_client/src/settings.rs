use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;
use wormhole_shared::settings::{sanitize_f32, PortalSettings};

pub const SETTINGS_PATH: &str = "settings.toml";

const MIN_MOUSE_SENSITIVITY: f32 = 0.1;
const MAX_MOUSE_SENSITIVITY: f32 = 10.0;
const MIN_FOV: f32 = 40.0;
const MAX_FOV: f32 = 110.0;
const MIN_MOVE_SPEED: f32 = 0.5;
const MAX_MOVE_SPEED: f32 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_mouse_sensitivity")]
    pub mouse_sensitivity: f32,
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_move_speed")]
    pub move_speed: f32,
    #[serde(default)]
    pub show_stats: bool,
    #[serde(default)]
    pub portal: PortalSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            mouse_sensitivity: default_mouse_sensitivity(),
            fov: default_fov(),
            move_speed: default_move_speed(),
            show_stats: false,
            portal: PortalSettings::default(),
        }
    }
}

impl ClientSettings {
    pub fn sanitize(mut self) -> Self {
        self.mouse_sensitivity = sanitize_f32(
            self.mouse_sensitivity,
            MIN_MOUSE_SENSITIVITY,
            MAX_MOUSE_SENSITIVITY,
            default_mouse_sensitivity(),
        );
        self.fov = sanitize_f32(self.fov, MIN_FOV, MAX_FOV, default_fov());
        self.move_speed = sanitize_f32(
            self.move_speed,
            MIN_MOVE_SPEED,
            MAX_MOVE_SPEED,
            default_move_speed(),
        );
        self.portal = self.portal.sanitize();
        self
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let parsed = toml::from_str::<Self>(&contents).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to deserialize settings: {e}"),
            )
        })?;
        Ok(parsed.sanitize())
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let settings = self.clone().sanitize();
        let serialized = toml::to_string_pretty(&settings).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to serialize settings: {e}"),
            )
        })?;
        fs::write(path, serialized)
    }

    /// Mouse sensitivity in radians per pixel of motion.
    pub fn look_sensitivity(&self) -> f32 {
        self.mouse_sensitivity * 0.001
    }
}

fn default_mouse_sensitivity() -> f32 {
    2.5
}

fn default_fov() -> f32 {
    70.0
}

fn default_move_speed() -> f32 {
    6.0
}

pub fn load_or_create_settings(path: &Path) -> ClientSettings {
    match ClientSettings::load(path) {
        Ok(settings) => settings,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let settings = ClientSettings::default();
            if let Err(save_err) = settings.save(path) {
                warn!(
                    "Failed to create default settings at {}: {save_err}",
                    path.display()
                );
            }
            settings
        }
        Err(err) => {
            warn!("Failed to load settings from {}: {err}", path.display());
            let settings = ClientSettings::default();
            if let Err(save_err) = settings.save(path) {
                warn!(
                    "Failed to overwrite settings at {}: {save_err}",
                    path.display()
                );
            }
            settings
        }
    }
}
