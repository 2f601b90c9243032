use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::notifications::NotificationKind;
use crate::storage::read_json_record;

pub const APP_DIRECTORY_NAME: &str = "statizen";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
const CONFIG_DIR_ENV: &str = "STATIZEN_CONFIG_DIR";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const MIN_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_NEARBY_TTL_SECS: u64 = 300;

/// Per-kind notification switches, stored as `eventTypes` in the settings blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventTypeToggles {
    pub pvp_kills: bool,
    pub pvp_deaths: bool,
    pub pve_kills: bool,
    pub suicides: bool,
    pub crashes: bool,
    pub level_ups: bool,
}

impl Default for EventTypeToggles {
    fn default() -> Self {
        Self {
            pvp_kills: true,
            pvp_deaths: true,
            pve_kills: false,
            suicides: false,
            crashes: false,
            level_ups: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub log_path: String,
    pub poll_interval_ms: u64,
    pub nearby_ttl_secs: u64,
    pub allow_dictionary_submit: bool,
    #[serde(rename = "notifications")]
    pub notifications_enabled: bool,
    pub event_types: EventTypeToggles,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dictionary_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_path: String::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            nearby_ttl_secs: DEFAULT_NEARBY_TTL_SECS,
            allow_dictionary_submit: false,
            notifications_enabled: false,
            event_types: EventTypeToggles::default(),
            dictionary_dir: None,
        }
    }
}

impl Settings {
    pub fn log_path(&self) -> Result<PathBuf> {
        let trimmed = self.log_path.trim();
        if trimmed.is_empty() {
            return Err(Error::Config("Game log path is not configured".to_string()));
        }

        Ok(PathBuf::from(trimmed))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn nearby_ttl(&self) -> Duration {
        Duration::from_secs(self.nearby_ttl_secs)
    }

    pub fn dictionary_directory(&self) -> Option<PathBuf> {
        self.dictionary_dir
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    pub fn should_notify(&self, kind: NotificationKind) -> bool {
        if !self.notifications_enabled {
            return false;
        }

        match kind {
            NotificationKind::PveKill => self.event_types.pve_kills,
            NotificationKind::PvpKill => self.event_types.pvp_kills,
            NotificationKind::PvpDeath => self.event_types.pvp_deaths,
            NotificationKind::Suicide => self.event_types.suicides,
            NotificationKind::Crash => self.event_types.crashes,
            NotificationKind::LevelUp => self.event_types.level_ups,
        }
    }
}

/// Where the core reads its configuration from. Called once per pass.
pub trait SettingsSource: Send + Sync {
    fn load(&self) -> Result<Settings>;

    fn log_path(&self) -> Result<PathBuf> {
        self.load()?.log_path()
    }
}

/// Settings blob on disk, re-read on every call so edits apply without a restart.
pub struct JsonSettingsSource {
    path: PathBuf,
}

impl JsonSettingsSource {
    pub fn new(config_directory: &Path) -> Self {
        Self {
            path: config_directory.join(SETTINGS_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSource for JsonSettingsSource {
    fn load(&self) -> Result<Settings> {
        Ok(read_json_record::<Settings>(&self.path)?.unwrap_or_default())
    }
}

/// In-memory settings, used for CLI overrides and tests.
pub struct FixedSettings(pub Settings);

impl SettingsSource for FixedSettings {
    fn load(&self) -> Result<Settings> {
        Ok(self.0.clone())
    }
}

/// Layers a log path override on top of another source.
pub struct LogPathOverride<S> {
    inner: S,
    log_path: PathBuf,
}

impl<S: SettingsSource> LogPathOverride<S> {
    pub fn new(inner: S, log_path: PathBuf) -> Self {
        Self { inner, log_path }
    }
}

impl<S: SettingsSource> SettingsSource for LogPathOverride<S> {
    fn load(&self) -> Result<Settings> {
        let mut settings = self.inner.load()?;
        settings.log_path = self.log_path.to_string_lossy().to_string();
        Ok(settings)
    }
}

/// Resolves the per-user directory holding settings and persisted stats.
pub fn resolve_config_directory(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(directory) = explicit {
        return Ok(directory.to_path_buf());
    }

    if let Some(directory) = non_empty_env(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(directory));
    }

    let base_directory = non_empty_env("APPDATA")
        .or_else(|| non_empty_env("XDG_CONFIG_HOME"))
        .map(PathBuf::from)
        .or_else(|| {
            non_empty_env("USERPROFILE")
                .or_else(|| non_empty_env("HOME"))
                .map(|home| Path::new(&home).join(".config"))
        })
        .ok_or_else(|| Error::Config("Unable to determine home directory".to_string()))?;

    Ok(base_directory.join(APP_DIRECTORY_NAME))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
