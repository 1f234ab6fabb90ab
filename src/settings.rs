use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::identity::Role;

pub const TICK_ENV: &str = "BOLITA_TICK_MS";
const DEFAULT_TICK_MS: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CueSettings {
    pub enabled: bool,
    pub volume: f32,
}

impl Default for CueSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 0.3,
        }
    }
}

/// Signed-in patient for this installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSettings {
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct UserSettings {
    cues: CueSettings,
    profile: Option<ProfileSettings>,
    tick_interval_ms: u64,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            cues: CueSettings::default(),
            profile: None,
            tick_interval_ms: DEFAULT_TICK_MS,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
    tick_override: Option<u64>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring malformed settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        let tick_override = std::env::var(TICK_ENV)
            .ok()
            .and_then(|raw| parse_tick_override(&raw));

        Ok(Self {
            path,
            data: RwLock::new(data),
            tick_override,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cues(&self) -> CueSettings {
        self.read().cues.clone()
    }

    pub fn profile(&self) -> Option<ProfileSettings> {
        self.read().profile.clone()
    }

    /// Tick period, with `BOLITA_TICK_MS` taking precedence over the file.
    pub fn tick_interval(&self) -> Duration {
        let millis = self
            .tick_override
            .unwrap_or_else(|| self.read().tick_interval_ms);
        Duration::from_millis(millis.max(1))
    }

    pub fn update_cues(&self, settings: CueSettings) -> Result<()> {
        let mut guard = self.write();
        guard.cues = settings;
        self.persist(&guard)
    }

    pub fn update_profile(&self, profile: Option<ProfileSettings>) -> Result<()> {
        let mut guard = self.write();
        guard.profile = profile;
        self.persist(&guard)
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn parse_tick_override(raw: &str) -> Option<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            warn!("Ignoring {TICK_ENV}={raw:?}; expected a positive number of milliseconds");
            None
        }
        Ok(millis) => Some(millis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("settings.json")).unwrap()
    }

    #[test]
    fn defaults_when_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.cues(), CueSettings::default());
        assert_eq!(store.profile(), None);
    }

    #[test]
    fn profile_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let profile = ProfileSettings {
            user_id: "u1".into(),
            email: "ana@example.com".into(),
            role: Some(Role::Admin),
        };
        store_in(&dir).update_profile(Some(profile.clone())).unwrap();
        store_in(&dir)
            .update_cues(CueSettings {
                enabled: false,
                volume: 0.5,
            })
            .unwrap();

        let reloaded = store_in(&dir);
        assert_eq!(reloaded.profile(), Some(profile));
        assert!(!reloaded.cues().enabled);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "{ not json").unwrap();
        assert_eq!(store_in(&dir).cues(), CueSettings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("settings.json"),
            r#"{ "cues": { "enabled": false } }"#,
        )
        .unwrap();
        let store = store_in(&dir);
        assert!(!store.cues().enabled);
        assert_eq!(store.cues().volume, 0.3);
    }

    #[test]
    fn tick_override_must_be_positive() {
        assert_eq!(parse_tick_override("250"), Some(250));
        assert_eq!(parse_tick_override("0"), None);
        assert_eq!(parse_tick_override("fast"), None);
    }
}
