use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::playback::TransportDefaults;

const SETTINGS_FILE_NAME: &str = "settings.json";
const APP_DIR_NAME: &str = "recycle-assistant";

/// Environment variable that overrides `base_url`
pub const BASE_URL_ENV: &str = "RECYCLE_API_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Root of the analysis service; paths like `/api/recycle` are appended.
    pub base_url: String,

    /// Per-request timeout. Each user action gets exactly one attempt.
    pub request_timeout_secs: u64,

    /// MIME type of the synthesized audio the service returns.
    pub audio_mime_type: String,

    /// Constant bitrate used to estimate track duration from the byte count.
    pub audio_bitrate_kbps: u32,

    /// Initial volume for a freshly loaded track, `[0, 1]`.
    pub default_volume: f32,

    /// Initial playback rate for a freshly loaded track, `[0.5, 2.0]`.
    pub default_rate: f32,

    /// How often the playback position is advanced while playing.
    pub tick_interval_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 60,
            audio_mime_type: "audio/mpeg".to_string(),
            audio_bitrate_kbps: 128,
            default_volume: 1.0,
            default_rate: 1.0,
            tick_interval_ms: 250,
        }
    }
}

impl AppSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(10))
    }

    pub fn transport_defaults(&self) -> TransportDefaults {
        TransportDefaults {
            volume: self.default_volume,
            rate: self.default_rate,
        }
    }

    /// Apply `RECYCLE_API_URL` if set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                log::info!("Settings: {} overrides base_url -> {}", BASE_URL_ENV, url);
                self.base_url = url.to_string();
            }
        }
        self
    }
}

pub fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir()
        .ok_or_else(|| "Could not determine config directory".to_string())?;
    Ok(dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

pub fn load_settings_from(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write to a sibling temp file, then rename over the target
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // Windows rename fails if the destination exists
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}

/// Load settings, writing the defaults out on first run so they can be edited.
pub fn load_or_init_settings() -> AppSettings {
    let path = match settings_path() {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Settings: {}", e);
            return AppSettings::default().with_env_overrides();
        }
    };

    if !path.exists() {
        let defaults = AppSettings::default();
        match save_settings_to(&path, &defaults) {
            Ok(()) => log::info!("Settings: wrote defaults to {:?}", path),
            Err(e) => log::warn!("Settings: {}", e),
        }
    }

    load_settings_from(&path).with_env_overrides()
}
