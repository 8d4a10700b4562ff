//! Configuration Store - Load, Merge, Persist
//!
//! Storage is injected through [`KeyValueStore`]. Corrupt or missing stored
//! values are recovered locally from defaults; write failures degrade to an
//! in-memory session instead of failing the caller.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::layout::{default_layout, ElementKey, LayoutConfiguration};
use crate::settings::{Branding, PersistedSettings, TemplateIdentity, SETTINGS_SCHEMA_VERSION};
use crate::validation::Validator;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static SAVE_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_save_call_count() -> u32 {
    SAVE_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_save_call_count() {
    SAVE_CALL_COUNT.store(0, Ordering::SeqCst);
}

/// Versioned key the settings object lives under.
pub const DEFAULT_SETTINGS_KEY: &str = "idcard_template_settings_v1";

const SAVE_WARNING: &str =
    "Template settings could not be saved. Changes will be kept until this session ends.";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key-value persistence collaborator.
pub trait KeyValueStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;

    /// Read and decode a JSON value. Missing, unreadable or malformed values
    /// yield `default`.
    fn get_json<T: DeserializeOwned>(&self, key: &str, default: T) -> T
    where
        Self: Sized,
    {
        let raw = match self.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(e) => {
                warn!(key, error = %e, "storage read failed, using default");
                return default;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "stored value is malformed, using default");
                default
            }
        }
    }

    /// Encode and write a JSON value. Returns false instead of failing.
    fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> bool
    where
        Self: Sized,
    {
        let encoded = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(key, error = %e, "value could not be serialized");
                return false;
            }
        };
        match self.write(key, &encoded) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "storage write failed");
                false
            }
        }
    }
}

/// In-memory store with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self { values: HashMap::new(), quota: Some(quota) }
    }

    fn used_excluding(&self, key: &str) -> usize {
        self.values
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota {
            let available = quota.saturating_sub(self.used_excluding(key));
            let needed = key.len() + value.len();
            if needed > available {
                return Err(StorageError::QuotaExceeded { needed, available });
            }
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.values.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(path, value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Outcome of a persistence attempt. Never an error: a failed write leaves
/// the in-memory settings authoritative for the rest of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Persisted,
    InMemoryOnly { warning: String },
}

/// Owns the working settings and keeps them in sync with storage.
pub struct ConfigurationStore<S: KeyValueStore> {
    backend: S,
    key: String,
    validator: Validator,
    settings: PersistedSettings,
}

impl<S: KeyValueStore> ConfigurationStore<S> {
    /// Open the store under the default key and load the current settings.
    pub fn open(backend: S, branding: &Branding) -> Self {
        Self::open_with(backend, DEFAULT_SETTINGS_KEY, Validator::new(), branding)
    }

    /// Open under `key`, repairing stored layouts with `validator`.
    pub fn open_with(backend: S, key: &str, validator: Validator, branding: &Branding) -> Self {
        let mut store = Self {
            backend,
            key: key.to_string(),
            validator,
            settings: PersistedSettings::bootstrap(branding),
        };
        store.load(branding);
        store
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn settings(&self) -> &PersistedSettings {
        &self.settings
    }

    /// Re-read settings from storage, filling anything missing from defaults.
    /// Branding-owned identity fields always come from `branding`.
    pub fn load(&mut self, branding: &Branding) -> PersistedSettings {
        let stored: Value = self.backend.get_json(&self.key, Value::Null);
        self.settings = match stored {
            Value::Object(map) => self.merge_stored(&map, branding),
            Value::Null => {
                info!(key = %self.key, "no stored template settings, seeding defaults");
                PersistedSettings::bootstrap(branding)
            }
            _ => {
                warn!(key = %self.key, "stored template settings are not an object, using defaults");
                PersistedSettings::bootstrap(branding)
            }
        };
        self.settings.clone()
    }

    fn merge_stored(&self, map: &serde_json::Map<String, Value>, branding: &Branding) -> PersistedSettings {
        if !schema_supported(map.get("schemaVersion")) {
            warn!(key = %self.key, "stored template settings use an unsupported schema, using defaults");
            return PersistedSettings::bootstrap(branding);
        }

        let mut identity = map
            .get("identity")
            .and_then(|v| serde_json::from_value::<TemplateIdentity>(v.clone()).ok())
            .unwrap_or_default();
        identity.merge_branding(branding);

        // A complete layout parses strictly; anything else is merged per key.
        let (mut layout, filled) = match map.get("layout") {
            Some(value @ Value::Object(entries)) => match serde_json::from_value::<LayoutConfiguration>(value.clone()) {
                Ok(layout) => (layout, vec![]),
                Err(e) => {
                    debug!(key = %self.key, error = %e, "stored layout incomplete, merging with defaults");
                    LayoutConfiguration::from_partial(entries)
                }
            },
            _ => (default_layout(), ElementKey::ALL.to_vec()),
        };
        if !filled.is_empty() {
            debug!(key = %self.key, ?filled, "layout entries filled from defaults");
        }

        let report = self.validator.repair(&mut layout);
        if !report.valid {
            warn!(
                key = %self.key,
                violations = report.violations.len(),
                "stored layout was out of bounds and has been repaired"
            );
        }

        PersistedSettings {
            schema_version: SETTINGS_SCHEMA_VERSION.to_string(),
            identity,
            layout,
        }
    }

    /// Replace the working settings and write them through.
    pub fn save(&mut self, settings: PersistedSettings) -> SaveStatus {
        #[cfg(feature = "test-hooks")]
        SAVE_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        self.settings = settings;
        if self.backend.set_json(&self.key, &self.settings) {
            debug!(key = %self.key, "template settings saved");
            SaveStatus::Persisted
        } else {
            SaveStatus::InMemoryOnly { warning: SAVE_WARNING.to_string() }
        }
    }

    /// Mutate the working settings; persists only if `edit` reports a change.
    pub fn update(&mut self, edit: impl FnOnce(&mut PersistedSettings) -> bool) -> Option<SaveStatus> {
        let mut next = self.settings.clone();
        if !edit(&mut next) {
            return None;
        }
        Some(self.save(next))
    }

    /// Merge a new branding value. Layout is untouched.
    pub fn react_to_identity_change(&mut self, branding: &Branding) -> Option<SaveStatus> {
        self.update(|settings| {
            let before = settings.identity.clone();
            settings.identity.merge_branding(branding);
            settings.identity != before
        })
    }

    /// Restore the master blueprint layout, keeping identity.
    pub fn reset_layout(&mut self) -> SaveStatus {
        let mut next = self.settings.clone();
        next.reset_layout();
        self.save(next)
    }
}

/// Settings written by a newer major schema are not trusted.
fn schema_supported(stored: Option<&Value>) -> bool {
    let Some(raw) = stored.and_then(Value::as_str) else {
        // Older releases did not record a schema version.
        return true;
    };
    let (Ok(stored), Ok(current)) = (
        semver::Version::parse(raw),
        semver::Version::parse(SETTINGS_SCHEMA_VERSION),
    ) else {
        return false;
    };
    stored.major <= current.major
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ElementLayout;
    use crate::validation::RepairMode;
    use serde_json::json;

    fn branding() -> Branding {
        Branding {
            name: "Greenfield Public School".to_string(),
            tagline: "Knowledge is light".to_string(),
            logo: None,
            accent_color: Some("#7c2d12".to_string()),
        }
    }

    #[test]
    fn test_empty_store_loads_defaults() {
        let store = ConfigurationStore::open(MemoryStore::new(), &branding());
        assert_eq!(store.settings().layout, default_layout());
        assert_eq!(store.settings().identity.name, "Greenfield Public School");
        assert_eq!(store.backend().read(DEFAULT_SETTINGS_KEY).unwrap(), None);
    }

    #[test]
    fn test_malformed_json_falls_back() {
        let mut backend = MemoryStore::new();
        backend.write(DEFAULT_SETTINGS_KEY, "{not json").unwrap();
        let store = ConfigurationStore::open(backend, &branding());
        assert_eq!(store.settings().layout, default_layout());
    }

    #[test]
    fn test_newer_major_schema_is_ignored() {
        let mut settings = PersistedSettings::bootstrap(&branding());
        settings.schema_version = "2.0.0".to_string();
        settings.layout.get_mut(ElementKey::Logo).scale = 2.0;
        let mut backend = MemoryStore::new();
        assert!(backend.set_json(DEFAULT_SETTINGS_KEY, &settings));

        let store = ConfigurationStore::open(backend, &branding());
        assert_eq!(store.settings().layout, default_layout());
    }

    #[test]
    fn test_missing_schema_version_is_accepted() {
        let mut backend = MemoryStore::new();
        let stored = json!({
            "identity": {"signature": "data:image/png;base64,SIG"},
            "layout": {"logo": {"offsetX": 10, "offsetY": 0, "scale": 1, "visible": false}}
        });
        assert!(backend.set_json(DEFAULT_SETTINGS_KEY, &stored));

        let store = ConfigurationStore::open(backend, &branding());
        let settings = store.settings();
        assert!(!settings.layout.get(ElementKey::Logo).visible);
        assert_eq!(settings.identity.signature.as_deref(), Some("data:image/png;base64,SIG"));
        assert_eq!(settings.identity.name, "Greenfield Public School");
        assert_eq!(settings.schema_version, SETTINGS_SCHEMA_VERSION);
    }

    #[test]
    fn test_out_of_bounds_values_are_clamped_on_load() {
        let mut backend = MemoryStore::new();
        let mut value = serde_json::to_value(PersistedSettings::bootstrap(&branding())).unwrap();
        value["layout"]["photo"]["scale"] = json!(40.0);
        assert!(backend.set_json(DEFAULT_SETTINGS_KEY, &value));

        let store = ConfigurationStore::open(backend, &branding());
        assert_eq!(store.settings().layout.get(ElementKey::Photo).scale, crate::layout::MAX_SCALE);
    }

    #[test]
    fn test_reset_mode_restores_whole_element() {
        let mut backend = MemoryStore::new();
        let mut value = serde_json::to_value(PersistedSettings::bootstrap(&branding())).unwrap();
        value["layout"]["photo"]["scale"] = json!(40.0);
        value["layout"]["photo"]["offsetX"] = json!(12.0);
        value["layout"]["logo"]["offsetY"] = json!(-6.0);
        assert!(backend.set_json("cards_v1", &value));

        let store = ConfigurationStore::open_with(backend, "cards_v1", Validator::with_mode(RepairMode::Reset), &branding());
        let layout = &store.settings().layout;
        assert_eq!(layout.get(ElementKey::Photo), &ElementLayout::default_for(ElementKey::Photo));
        assert_eq!(layout.get(ElementKey::Logo).offset_y, -6.0);
    }

    #[test]
    fn test_complete_layout_loads_as_stored() {
        let mut settings = PersistedSettings::bootstrap(&branding());
        for key in ElementKey::ALL {
            settings.layout.get_mut(key).offset_x = 5.0;
        }
        let mut backend = MemoryStore::new();
        assert!(backend.set_json(DEFAULT_SETTINGS_KEY, &settings));

        let store = ConfigurationStore::open(backend, &branding());
        assert_eq!(store.settings().layout, settings.layout);
    }

    #[test]
    fn test_malformed_entry_merged_with_defaults() {
        let mut value = serde_json::to_value(PersistedSettings::bootstrap(&branding())).unwrap();
        value["layout"]["tagline"]["offsetX"] = json!(9.0);
        value["layout"]["photo"] = json!("garbage");
        let mut backend = MemoryStore::new();
        assert!(backend.set_json(DEFAULT_SETTINGS_KEY, &value));

        let store = ConfigurationStore::open(backend, &branding());
        let layout = &store.settings().layout;
        assert_eq!(layout.get(ElementKey::Tagline).offset_x, 9.0);
        assert_eq!(layout.get(ElementKey::Photo), &ElementLayout::default_for(ElementKey::Photo));
    }

    #[test]
    fn test_quota_failure_keeps_memory_state() {
        let mut store = ConfigurationStore::open(MemoryStore::with_quota(16), &branding());
        let status = store.update(|s| {
            s.layout.get_mut(ElementKey::Tagline).offset_y = 8.0;
            true
        });
        assert!(matches!(status, Some(SaveStatus::InMemoryOnly { .. })));
        assert_eq!(store.settings().layout.get(ElementKey::Tagline).offset_y, 8.0);
    }

    #[test]
    fn test_update_without_change_does_not_write() {
        let mut store = ConfigurationStore::open(MemoryStore::new(), &branding());
        assert_eq!(store.update(|_| false), None);
        assert_eq!(store.backend().read(DEFAULT_SETTINGS_KEY).unwrap(), None);
    }

    #[test]
    fn test_get_json_default_on_garbage() {
        let mut backend = MemoryStore::new();
        backend.write("k", "[1, 2").unwrap();
        assert_eq!(backend.get_json("k", 7u32), 7);
        assert_eq!(backend.get_json("absent", 3u32), 3);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileStore::new(dir.path().join("nested"));
        assert_eq!(backend.read("settings").unwrap(), None);
        backend.write("settings", "{\"a\":1}").unwrap();
        assert_eq!(backend.read("settings").unwrap().as_deref(), Some("{\"a\":1}"));
        backend.remove("settings").unwrap();
        backend.remove("settings").unwrap();
        assert_eq!(backend.read("settings").unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileStore::new(dir.path());
        assert!(matches!(backend.read("../escape"), Err(StorageError::InvalidKey(_))));
    }
}
