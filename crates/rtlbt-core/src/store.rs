//! Firmware lookup by name.
//!
//! Stores are read-only after construction. Compressed entries are
//! inflated on lookup; callers always receive the raw container bytes.

use flate2::read::ZlibDecoder;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Firmware not found: {0}")]
    NotFound(String),
    #[error("Failed to inflate {name}: {message}")]
    Decompress { name: String, message: String },
    #[error("Inflated size mismatch for {name}: expected {expected}, got {actual}")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of firmware containers and configuration blobs.
pub trait FirmwareStore {
    fn lookup(&self, name: &str) -> Result<Vec<u8>, StoreError>;
}

impl<S: FirmwareStore + ?Sized> FirmwareStore for &S {
    fn lookup(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        (**self).lookup(name)
    }
}

/// A stored artifact, possibly zlib-compressed.
#[derive(Debug, Clone)]
pub struct FirmwareEntry {
    data: Vec<u8>,
    /// Inflated size when the data is compressed.
    uncompressed_size: Option<usize>,
}

impl FirmwareEntry {
    pub fn plain(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            uncompressed_size: None,
        }
    }

    pub fn compressed(data: impl Into<Vec<u8>>, uncompressed_size: usize) -> Self {
        Self {
            data: data.into(),
            uncompressed_size: Some(uncompressed_size),
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.uncompressed_size.is_some()
    }

    fn load(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let Some(expected) = self.uncompressed_size else {
            return Ok(self.data.clone());
        };

        let mut out = Vec::with_capacity(expected);
        ZlibDecoder::new(self.data.as_slice())
            .read_to_end(&mut out)
            .map_err(|e| StoreError::Decompress {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        if out.len() != expected {
            return Err(StoreError::SizeMismatch {
                name: name.to_string(),
                expected,
                actual: out.len(),
            });
        }
        Ok(out)
    }
}

/// In-memory name -> artifact table.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, FirmwareEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, name: impl Into<String>, entry: FirmwareEntry) -> Self {
        self.entries.insert(name.into(), entry);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: FirmwareEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FirmwareStore for MemoryStore {
    #[instrument(skip(self))]
    fn lookup(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let data = entry.load(name)?;
        debug!(len = data.len(), compressed = entry.is_compressed(), "Loaded firmware");
        Ok(data)
    }
}

/// Firmware files under a directory, e.g. `/lib/firmware/rtl_bt`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        // Names are plain file names; anything that could walk out of the root is refused.
        let path = Path::new(name);
        if path.components().count() != 1 || path.file_name().is_none() {
            return None;
        }
        Some(self.root.join(path))
    }
}

impl FirmwareStore for DirectoryStore {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn lookup(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self
            .resolve(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        match std::fs::read(&path) {
            Ok(data) => {
                debug!(path = %path.display(), len = data.len(), "Loaded firmware");
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_plain_and_missing() {
        let store = MemoryStore::new().with_entry("a.bin", FirmwareEntry::plain(vec![1, 2, 3]));
        assert_eq!(store.lookup("a.bin").unwrap(), vec![1, 2, 3]);
        assert!(matches!(store.lookup("b.bin"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_compressed_entry_is_inflated() {
        let raw: Vec<u8> = (0..4096u32).map(|i| (i % 7) as u8).collect();
        let store = MemoryStore::new()
            .with_entry("fw.bin", FirmwareEntry::compressed(deflate(&raw), raw.len()));
        assert_eq!(store.lookup("fw.bin").unwrap(), raw);
    }

    #[test]
    fn test_compressed_size_mismatch() {
        let raw = vec![9u8; 100];
        let store = MemoryStore::new()
            .with_entry("fw.bin", FirmwareEntry::compressed(deflate(&raw), 99));
        assert!(matches!(
            store.lookup("fw.bin"),
            Err(StoreError::SizeMismatch { expected: 99, actual: 100, .. })
        ));
    }

    #[test]
    fn test_garbage_does_not_inflate() {
        let store = MemoryStore::new()
            .with_entry("fw.bin", FirmwareEntry::compressed(vec![0xFF; 16], 10));
        assert!(matches!(
            store.lookup("fw.bin"),
            Err(StoreError::Decompress { .. })
        ));
    }

    #[test]
    fn test_directory_store() {
        let dir = std::env::temp_dir().join(format!("rtlbt-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("rtl8723b_fw.bin"), b"Realtech").unwrap();

        let store = DirectoryStore::new(&dir);
        assert_eq!(store.lookup("rtl8723b_fw.bin").unwrap(), b"Realtech");
        assert!(matches!(
            store.lookup("missing.bin"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.lookup("../etc/passwd"),
            Err(StoreError::NotFound(_))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
