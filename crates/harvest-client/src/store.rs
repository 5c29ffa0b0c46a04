//! Persisted state: a key/value namespace and the collected contact rows.

use crate::error::StoreError;
use log::{debug, info};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Slot holding the collected contact lines.
pub const ROWS_SLOT: &str = "contact_rows";

/// Named JSON slots. Each call is one read or one write; nothing spans calls.
pub trait KvStore: Send + Sync {
    fn get(&self, slot: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, slot: &str, value: Value) -> Result<(), StoreError>;
}

/// All slots in one JSON object on disk.
pub struct JsonFileStore {
    path: PathBuf,
    // serialises read-modify-write of the file within this process
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    fn write_all(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, slot: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_all()?.remove(slot))
    }

    fn set(&self, slot: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut map = self.read_all()?;
        map.insert(slot.to_string(), value);
        self.write_all(&map)?;
        debug!("Wrote slot '{}' to {}", slot, self.path.display());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Value>>,
}

impl KvStore for MemoryStore {
    fn get(&self, slot: &str) -> Result<Option<Value>, StoreError> {
        let slots = self.slots.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(slots.get(slot).cloned())
    }

    fn set(&self, slot: &str, value: Value) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().map_err(|_| StoreError::Poisoned)?;
        slots.insert(slot.to_string(), value);
        Ok(())
    }
}

/// Result of `RowStore::append`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub added: bool,
    pub count: usize,
}

/// Tab-separated contact lines, at most one per resume code.
#[derive(Clone)]
pub struct RowStore {
    kv: Arc<dyn KvStore>,
}

/// Field 3 of a line: the resume code. Empty when the line is short.
pub fn resume_code_of(line: &str) -> &str {
    line.split('\t').nth(3).unwrap_or("")
}

impl RowStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let rows = match self.kv.get(ROWS_SLOT)? {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        Ok(rows)
    }

    fn save(&self, rows: &[String]) -> Result<(), StoreError> {
        self.kv.set(ROWS_SLOT, Value::from(rows.to_vec()))
    }

    /// Adds `line` unless a stored line carries the same resume code.
    /// Lines without a code are always added.
    pub fn append(&self, line: &str) -> Result<AppendOutcome, StoreError> {
        let code = resume_code_of(line);
        let mut rows = self.list()?;
        let exists = !code.is_empty() && rows.iter().any(|r| resume_code_of(r) == code);
        if exists {
            debug!("Resume code {} already collected", code);
            return Ok(AppendOutcome {
                added: false,
                count: rows.len(),
            });
        }
        rows.push(line.to_string());
        self.save(&rows)?;
        Ok(AppendOutcome {
            added: true,
            count: rows.len(),
        })
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        info!("Clearing collected rows");
        self.save(&[])
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.list()?.len())
    }

    /// Newline-joined rows, ready to paste into a spreadsheet.
    pub fn export_tsv(&self) -> Result<String, StoreError> {
        Ok(self.list()?.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> RowStore {
        RowStore::new(Arc::new(MemoryStore::default()))
    }

    #[test]
    fn duplicate_resume_code_is_rejected() {
        let store = rows();
        let first = store.append("Alice\ta@x.com\t555\t1001").unwrap();
        let second = store.append("Bob\tb@x.com\t555\t1001").unwrap();

        assert_eq!(first, AppendOutcome { added: true, count: 1 });
        assert_eq!(second, AppendOutcome { added: false, count: 1 });
        assert_eq!(store.list().unwrap(), vec!["Alice\ta@x.com\t555\t1001"]);
    }

    #[test]
    fn empty_codes_never_dedup() {
        let store = rows();
        store.append("Alice\ta@x.com\t555\t").unwrap();
        store.append("Bob\tb@x.com\t556").unwrap();
        let outcome = store.append("Alice\ta@x.com\t555\t").unwrap();
        assert_eq!(outcome, AppendOutcome { added: true, count: 3 });
    }

    #[test]
    fn at_most_one_row_per_code() {
        let store = rows();
        let codes = ["1", "2", "1", "", "3", "2", "", "3", "4"];
        for (i, code) in codes.iter().enumerate() {
            store.append(&format!("n{i}\te\tp\t{code}")).unwrap();
        }
        let listed = store.list().unwrap();
        let mut seen = std::collections::HashSet::new();
        for line in &listed {
            let code = resume_code_of(line);
            if !code.is_empty() {
                assert!(seen.insert(code.to_string()), "duplicate code {code}");
            }
        }
        // four distinct codes plus two empties
        assert_eq!(listed.len(), 6);
    }

    #[test]
    fn clear_and_export() {
        let store = rows();
        store.append("A\ta\t1\t11").unwrap();
        store.append("B\tb\t2\t22").unwrap();
        assert_eq!(store.export_tsv().unwrap(), "A\ta\t1\t11\nB\tb\t2\t22");

        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.export_tsv().unwrap(), "");
    }

    #[test]
    fn file_store_keeps_slots_apart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let store = JsonFileStore::new(&path);

        assert_eq!(store.get("settings").unwrap(), None);
        store.set("settings", json!({"subdir": "x/"})).unwrap();
        store.set(ROWS_SLOT, json!(["a\tb\tc\td"])).unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("settings").unwrap(), Some(json!({"subdir": "x/"})));
        assert_eq!(reopened.get(ROWS_SLOT).unwrap(), Some(json!(["a\tb\tc\td"])));
    }

    #[test]
    fn corrupt_state_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.get(ROWS_SLOT), Err(StoreError::Format(_))));
    }
}
