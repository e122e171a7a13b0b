use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    seen: BTreeSet<String>,
}

/// Ids of source messages that were already handled, persisted as JSON.
#[derive(Debug)]
pub struct SeenStore {
    path: PathBuf,
    data: StoreFile,
}

impl SeenStore {
    /// Reads `path`; a missing file is an empty store.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = if path.exists() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading store {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("decoding store {}", path.display()))?
        } else {
            StoreFile::default()
        };
        Ok(SeenStore {
            path: path.to_path_buf(),
            data,
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.data.seen.contains(id)
    }

    /// Returns `false` if `id` was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        self.data.seen.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.data.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.seen.is_empty()
    }

    /// Writes to a sibling temp file and renames it over the store.
    pub fn save(&self) -> anyhow::Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec(&self.data)?)
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing store {}", self.path.display()))?;
        Ok(())
    }
}

#[test]
fn test_store_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");

    let mut store = SeenStore::load(&path).unwrap();
    assert!(store.is_empty());
    assert!(store.insert("a"));
    assert!(!store.insert("a"));
    assert!(store.insert("b"));
    store.save().unwrap();

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        r#"{"seen":["a","b"]}"#
    );
    let store = SeenStore::load(&path).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.contains("b"));
    assert!(!store.contains("c"));
}

#[test]
fn test_store_rejects_garbage() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"not json").unwrap();
    assert!(SeenStore::load(file.path()).is_err());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"{}").unwrap();
    assert!(SeenStore::load(file.path()).unwrap().is_empty());
}
