//! File-backed blob store (feature-gated).

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use moodmorph_core::traits::{KeyValueStore, PersistenceError};

/// Stores each key as `<dir>/<key>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous blob intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform data directory (`<data_dir>/moodmorph`).
    #[must_use]
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|d| Self::new(d.join("moodmorph")))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;

    #[test]
    fn test_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        assert_eq!(assert_ok!(store.get("moodmorph_chat_history")), None);
        assert_ok!(store.set("moodmorph_chat_history", "[1,2]"));
        assert_ok!(store.set("moodmorph_chat_history", "[3]"));
        assert_eq!(
            assert_ok!(store.get("moodmorph_chat_history")),
            Some("[3]".to_string())
        );
        assert!(dir.path().join("nested/moodmorph_chat_history.json").exists());
        assert!(!dir.path().join("nested/moodmorph_chat_history.json.tmp").exists());

        assert_ok!(store.remove("moodmorph_chat_history"));
        assert_ok!(store.remove("moodmorph_chat_history"));
        assert_eq!(assert_ok!(store.get("moodmorph_chat_history")), None);
    }

    #[test]
    fn test_keys_cannot_escape_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_ok!(store.set("../outside", "x"));
        assert!(dir.path().join("___outside.json").exists());
    }
}
