use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};

/// Read-only access to snapshot artifacts by snapshot-relative path, e.g.
/// "manifest.json", "country/US/districts.bin", "global_index.bin".
pub trait ArtifactSource: Send + Sync {
    fn get(&self, rel: &str) -> Result<Arc<[u8]>>;
    fn has(&self, rel: &str) -> bool;
    /// All artifact paths, sorted.
    fn list(&self) -> Vec<String>;
}

/// Write access to snapshot artifacts by snapshot-relative path.
pub trait ArtifactSink: Send + Sync {
    fn put(&mut self, rel: &str, bytes: &[u8]) -> Result<()>;
}

/// Simple disk-backed artifact store rooted at a snapshot directory.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}

impl ArtifactSource for DiskStore {
    fn get(&self, rel: &str) -> Result<Arc<[u8]>> {
        Ok(Arc::from(std::fs::read(self.full(rel))?))
    }

    fn has(&self, rel: &str) -> bool {
        self.full(rel).exists()
    }

    fn list(&self) -> Vec<String> {
        fn walk(dir: &std::path::Path, prefix: &str, out: &mut Vec<String>) {
            let Ok(entries) = std::fs::read_dir(dir) else { return };
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                let rel = if prefix.is_empty() { name.clone() } else { format!("{prefix}/{name}") };
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, &rel, out);
                } else {
                    out.push(rel);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out.sort();
        out
    }
}

impl ArtifactSink for DiskStore {
    fn put(&mut self, rel: &str, bytes: &[u8]) -> Result<()> {
        let path = self.full(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Simple in-memory artifact store. Keys are snapshot-relative paths.
#[derive(Default, Clone)]
pub struct MemStore {
    pub(crate) files: BTreeMap<String, Arc<[u8]>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactSource for MemStore {
    fn get(&self, rel: &str) -> Result<Arc<[u8]>> {
        self.files
            .get(rel)
            .cloned()
            .ok_or_else(|| anyhow!("missing artifact: {rel}"))
    }

    fn has(&self, rel: &str) -> bool {
        self.files.contains_key(rel)
    }

    fn list(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

impl ArtifactSink for MemStore {
    fn put(&mut self, rel: &str, bytes: &[u8]) -> Result<()> {
        self.files.insert(rel.to_string(), Arc::from(bytes.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_store_round_trip() {
        let mut store = MemStore::new();
        store.put("country/US/districts.bin", b"abc").unwrap();
        store.put("manifest.json", b"{}").unwrap();
        assert!(store.has("manifest.json"));
        assert_eq!(&*store.get("country/US/districts.bin").unwrap(), b"abc");
        assert_eq!(store.list(), vec!["country/US/districts.bin", "manifest.json"]);
        assert!(store.get("missing").is_err());
    }

    #[test]
    fn disk_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DiskStore::new(dir.path());
        store.put("country/US/merkle.bin", b"tree").unwrap();
        assert!(store.has("country/US/merkle.bin"));
        assert_eq!(&*store.get("country/US/merkle.bin").unwrap(), b"tree");
        assert_eq!(store.list(), vec!["country/US/merkle.bin"]);
    }
}
