//! Key-value persistence backends

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::error::{PresetError, PresetResult};

/// String values keyed by string
///
/// `get` of a missing key is `Ok(None)`; `delete` of a missing key succeeds.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> PresetResult<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> PresetResult<()>;

    fn delete(&mut self, key: &str) -> PresetResult<()>;
}

/// In-process store, lost when dropped
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> PresetResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> PresetResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> PresetResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One file per key under a directory
///
/// Keys are percent-encoded into file names, so any key maps to exactly one
/// file inside the directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds a key
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

fn encode_key(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            name.push(byte as char);
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    name
}

fn io_error(path: &Path, source: std::io::Error) -> PresetError {
    PresetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> PresetResult<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> PresetResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;

        // Readers see the old document or the new one, never a partial write
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(|e| io_error(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;
        log::debug!("FileStore: wrote {:?}", path);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> PresetResult<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        store.delete("a").unwrap();
        store.delete("a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("presets"));
        assert_eq!(store.get("mix-presets/track-1").unwrap(), None);

        store.set("mix-presets/track-1", "{}").unwrap();
        let reopened = FileStore::new(dir.path().join("presets"));
        assert_eq!(reopened.get("mix-presets/track-1").unwrap().as_deref(), Some("{}"));

        store.delete("mix-presets/track-1").unwrap();
        assert_eq!(store.get("mix-presets/track-1").unwrap(), None);
        store.delete("mix-presets/track-1").unwrap();
    }

    #[test]
    fn test_keys_stay_inside_directory() {
        let store = FileStore::new("/tmp/presets");
        for key in ["../../etc/passwd", "a/b", "a_2Fb", ".."] {
            assert_eq!(store.path_for(key).parent(), Some(Path::new("/tmp/presets")));
        }
        assert_ne!(store.path_for("a/b"), store.path_for("a_b"));
    }
}
