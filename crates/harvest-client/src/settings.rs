//! User job settings, persisted in the state store.

use crate::error::StoreError;
use crate::store::KvStore;
use log::warn;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::time::Duration;

pub const SETTINGS_SLOT: &str = "settings";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Folder under the download root, relative.
    pub subdir: String,
    pub filename_prefix: String,
    pub filename_suffix: String,
    #[serde(alias = "firstWait")]
    pub first_wait_ms: u64,
    #[serde(alias = "nextWait")]
    pub next_wait_ms: u64,
    #[serde(alias = "waitDownload")]
    pub wait_for_download_completion: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            subdir: "104履歷下載區/".to_string(),
            filename_prefix: String::new(),
            filename_suffix: String::new(),
            first_wait_ms: 2800,
            next_wait_ms: 800,
            wait_for_download_completion: false,
        }
    }
}

// First key present with a value of the right type.
fn field<T: DeserializeOwned>(obj: &Map<String, Value>, keys: &[&str]) -> Option<T> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| serde_json::from_value(v.clone()).ok())
}

impl Settings {
    /// Overlays the keys of `value` that parse; everything else keeps its
    /// current value.
    pub fn merge(&self, value: &Value) -> Settings {
        let Some(obj) = value.as_object() else {
            return self.clone();
        };
        Settings {
            subdir: field(obj, &["subdir"]).unwrap_or_else(|| self.subdir.clone()),
            filename_prefix: field(obj, &["filenamePrefix"])
                .unwrap_or_else(|| self.filename_prefix.clone()),
            filename_suffix: field(obj, &["filenameSuffix"])
                .unwrap_or_else(|| self.filename_suffix.clone()),
            first_wait_ms: field(obj, &["firstWaitMs", "firstWait"]).unwrap_or(self.first_wait_ms),
            next_wait_ms: field(obj, &["nextWaitMs", "nextWait"]).unwrap_or(self.next_wait_ms),
            wait_for_download_completion: field(obj, &["waitForDownloadCompletion", "waitDownload"])
                .unwrap_or(self.wait_for_download_completion),
        }
    }

    /// Settle delay after opening or activating the `first` or a later item.
    pub fn settle(&self, first: bool) -> Duration {
        Duration::from_millis(if first {
            self.first_wait_ms
        } else {
            self.next_wait_ms
        })
    }

    /// Stored settings over the defaults. A broken slot falls back to defaults.
    pub fn load(kv: &dyn KvStore) -> Settings {
        match kv.get(SETTINGS_SLOT) {
            Ok(Some(value)) => Settings::default().merge(&value),
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!("Could not read settings, using defaults: {}", e);
                Settings::default()
            }
        }
    }

    pub fn save(&self, kv: &dyn KvStore) -> Result<(), StoreError> {
        kv.set(SETTINGS_SLOT, serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn missing_slot_gives_defaults() {
        let kv = MemoryStore::default();
        let s = Settings::load(&kv);
        assert_eq!(s.subdir, "104履歷下載區/");
        assert_eq!(s.first_wait_ms, 2800);
        assert_eq!(s.next_wait_ms, 800);
        assert!(!s.wait_for_download_completion);
    }

    #[test]
    fn bad_fields_fall_back_one_by_one() {
        let merged = Settings::default().merge(&json!({
            "subdir": "out/",
            "firstWaitMs": "soon",
            "nextWaitMs": 50,
            "unknown": true
        }));
        assert_eq!(merged.subdir, "out/");
        assert_eq!(merged.first_wait_ms, 2800);
        assert_eq!(merged.next_wait_ms, 50);
    }

    #[test]
    fn short_key_names_are_accepted() {
        let merged = Settings::default().merge(&json!({"firstWait": 100, "nextWait": 10}));
        assert_eq!(merged.settle(true), Duration::from_millis(100));
        assert_eq!(merged.settle(false), Duration::from_millis(10));
    }

    #[test]
    fn save_then_load() {
        let kv = MemoryStore::default();
        let s = Settings {
            filename_prefix: "Engineer".into(),
            wait_for_download_completion: true,
            ..Settings::default()
        };
        s.save(&kv).unwrap();
        assert_eq!(Settings::load(&kv), s);
        assert_eq!(
            kv.get(SETTINGS_SLOT).unwrap().unwrap()["filenamePrefix"],
            json!("Engineer")
        );
    }
}
