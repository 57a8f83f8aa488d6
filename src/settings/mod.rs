//! Key-value settings persisted next to the observation records. The secret store
//! keeps its encryption key here and scanner credentials land here in encrypted
//! form.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use tracing::debug;

/// Contract for settings persistence. `set` only updates the in-memory view,
/// `flush` makes pending writes durable. Callers that can survive lost settings
/// treat flush failures as a warning.
#[cfg_attr(test, mockall::automock)]
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn flush(&self) -> Result<()>;
}

/// Settings stored as one JSON document. The whole document is rewritten through a
/// temporary file on flush, readers never observe a partial write.
pub struct JsonSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

const SETTINGS_FILE: &str = "settings.json";

impl JsonSettingsStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SETTINGS_FILE);
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Settings file {path:?} holds invalid json"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e).context(format!("Can't read settings file {path:?}")),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn flush(&self) -> Result<()> {
        let serialized = {
            let values = self.values.lock().unwrap();
            serde_json::to_string_pretty(&*values)?
        };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Flushed settings to {:?}", self.path);
        Ok(())
    }
}
