// src/preferences.rs
//! Persisted user preferences and the theme flag built on top of them.

use std::collections::HashMap;

use crate::theme::ThemeMode;

pub const THEME_KEY: &str = "theme";

/// Key/value storage that survives restarts.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Non-persistent store, used when no platform storage is available.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file_store::FileStore;

#[cfg(not(target_arch = "wasm32"))]
mod file_store {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use anyhow::Context;

    use super::PreferenceStore;

    /// A flat JSON object on disk, rewritten on every `set`.
    #[derive(Debug)]
    pub struct FileStore {
        path: PathBuf,
        values: HashMap<String, String>,
    }

    impl FileStore {
        /// `preferences.json` in the platform config directory.
        pub fn open_default() -> anyhow::Result<Self> {
            let dirs = directories::ProjectDirs::from("", "", "particlefield")
                .context("No home directory to store preferences in")?;
            Self::open(dirs.config_dir().join("preferences.json"))
        }

        /// A missing file is an empty store; an unreadable one is discarded.
        pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
            let path = path.into();
            let values = match std::fs::read_to_string(&path) {
                Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                    log::warn!("Discarding malformed preferences in {}: {}", path.display(), e);
                    HashMap::new()
                }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read {}", path.display()));
                }
            };
            Ok(Self { path, values })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn flush(&self) -> anyhow::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let json = serde_json::to_string_pretty(&self.values)?;
            std::fs::write(&self.path, json)
                .with_context(|| format!("Failed to write {}", self.path.display()))
        }
    }

    impl PreferenceStore for FileStore {
        fn get(&self, key: &str) -> Option<String> {
            self.values.get(key).cloned()
        }

        fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
            self.values.insert(key.to_owned(), value.to_owned());
            self.flush()
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use local_storage::LocalStorageStore;

#[cfg(target_arch = "wasm32")]
mod local_storage {
    use super::PreferenceStore;

    /// `window.localStorage`.
    pub struct LocalStorageStore {
        storage: web_sys::Storage,
    }

    impl LocalStorageStore {
        pub fn open() -> anyhow::Result<Self> {
            let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("No global window"))?;
            let storage = window
                .local_storage()
                .map_err(|e| anyhow::anyhow!("localStorage access denied: {:?}", e))?
                .ok_or_else(|| anyhow::anyhow!("localStorage unavailable"))?;
            Ok(Self { storage })
        }
    }

    impl PreferenceStore for LocalStorageStore {
        fn get(&self, key: &str) -> Option<String> {
            self.storage.get_item(key).ok().flatten()
        }

        fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
            self.storage
                .set_item(key, value)
                .map_err(|e| anyhow::anyhow!("Failed to write localStorage[{}]: {:?}", key, e))
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        fn open_persistent_store() -> anyhow::Result<Box<dyn PreferenceStore>> {
            Ok(Box::new(LocalStorageStore::open()?))
        }
    } else {
        fn open_persistent_store() -> anyhow::Result<Box<dyn PreferenceStore>> {
            let store = FileStore::open_default()?;
            log::info!("Preferences stored in {}", store.path().display());
            Ok(Box::new(store))
        }
    }
}

/// The platform's persistent store, or an in-memory one if it cannot be opened.
pub fn open_platform_store() -> Box<dyn PreferenceStore> {
    open_persistent_store().unwrap_or_else(|e| {
        log::warn!("Preferences will not persist: {:#}", e);
        Box::new(MemoryStore::default())
    })
}

/// Light/dark preference, read once when created and written through on change.
pub struct ThemeFlag {
    store: Box<dyn PreferenceStore>,
    mode: ThemeMode,
}

impl ThemeFlag {
    pub fn load(store: Box<dyn PreferenceStore>) -> Self {
        let mode = ThemeMode::from_stored(store.get(THEME_KEY).as_deref());
        log::info!("Theme preference: {}", mode);
        Self { store, mode }
    }

    pub fn get_preference(&self) -> ThemeMode {
        self.mode
    }

    /// Updates the flag; a failed write keeps the new mode for this session only.
    pub fn set_preference(&mut self, mode: ThemeMode) {
        self.mode = mode;
        if let Err(e) = self.store.set(THEME_KEY, mode.as_str()) {
            log::warn!("Failed to persist theme preference: {:#}", e);
        }
    }

    pub fn toggle(&mut self) -> ThemeMode {
        let next = self.mode.toggled();
        self.set_preference(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReadOnlyStore(Option<String>);

    impl PreferenceStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Option<String> {
            self.0.clone()
        }

        fn set(&mut self, _key: &str, _value: &str) -> anyhow::Result<()> {
            anyhow::bail!("read-only")
        }
    }

    #[test]
    fn test_defaults_to_dark_when_absent() {
        let flag = ThemeFlag::load(Box::new(MemoryStore::default()));
        assert_eq!(flag.get_preference(), ThemeMode::Dark);
    }

    #[test]
    fn test_unrecognized_value_is_dark() {
        let flag = ThemeFlag::load(Box::new(ReadOnlyStore(Some("sepia".into()))));
        assert_eq!(flag.get_preference(), ThemeMode::Dark);
        let flag = ThemeFlag::load(Box::new(ReadOnlyStore(Some("light".into()))));
        assert_eq!(flag.get_preference(), ThemeMode::Light);
    }

    #[test]
    fn test_toggle_writes_through() {
        let mut store = MemoryStore::default();
        store.set(THEME_KEY, "light").unwrap();
        let mut flag = ThemeFlag::load(Box::new(store));

        assert_eq!(flag.toggle(), ThemeMode::Dark);
        assert_eq!(flag.store.get(THEME_KEY).as_deref(), Some("dark"));
        assert_eq!(flag.toggle(), ThemeMode::Light);
        assert_eq!(flag.store.get(THEME_KEY).as_deref(), Some("light"));
    }

    #[test]
    fn test_failed_write_still_switches_mode() {
        let mut flag = ThemeFlag::load(Box::new(ReadOnlyStore(None)));
        flag.set_preference(ThemeMode::Light);
        assert_eq!(flag.get_preference(), ThemeMode::Light);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.json");

        let mut flag = ThemeFlag::load(Box::new(FileStore::open(&path).unwrap()));
        flag.set_preference(ThemeMode::Light);

        let reopened = ThemeFlag::load(Box::new(FileStore::open(&path).unwrap()));
        assert_eq!(reopened.get_preference(), ThemeMode::Light);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_file_store_discards_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get(THEME_KEY), None);
    }
}
