//! User settings
//!
//! Optional JSON file in the platform config directory. Missing or broken
//! files fall back to defaults; settings never block startup.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::CONFIG;
use crate::loader::LoadPolicy;

const SETTINGS_DIR: &str = "book-mockup";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// How overlapping image loads for the same target are ordered
    #[serde(default)]
    pub load_policy: LoadPolicy,
    /// Directory exported images are written to
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    /// File name of exported images
    #[serde(default = "default_export_file_name")]
    pub export_file_name: String,
    /// Directory named background images are looked up in
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
}

fn default_export_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_export_file_name() -> String {
    CONFIG.export.file_name.to_string()
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            load_policy: LoadPolicy::default(),
            export_dir: default_export_dir(),
            export_file_name: default_export_file_name(),
            assets_dir: default_assets_dir(),
        }
    }
}

impl Settings {
    /// Location of the settings file, if the platform has a config directory
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(SETTINGS_DIR).join(SETTINGS_FILE))
    }

    /// Load settings from the default location
    pub fn load() -> Self {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load settings from a file, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("Could not read settings {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring malformed settings {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Full path of the export file
    pub fn export_path(&self) -> PathBuf {
        self.export_dir.join(&self.export_file_name)
    }

    /// Path of a named background image
    pub fn background_asset(&self, name: &str) -> PathBuf {
        self.assets_dir.join(format!("{name}_thumb.jpg"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_in_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "load_policy": "latest-request-wins" }"#).unwrap();
        assert_eq!(settings.load_policy, LoadPolicy::LatestRequestWins);
        assert_eq!(settings.export_file_name, CONFIG.export.file_name);
        assert_eq!(settings.assets_dir, PathBuf::from("assets"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let settings = Settings::load_from(Path::new("/no/such/dir/settings.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = std::env::temp_dir().join(format!("book-mockup-settings-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn wood_background_resolves_inside_assets_dir() {
        let settings = Settings::default();
        assert_eq!(
            settings.background_asset("wood"),
            PathBuf::from("assets").join("wood_thumb.jpg")
        );
    }
}
