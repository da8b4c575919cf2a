//
// declaration_cache.rs
//
// Persistent key -> text store for downloaded declaration files
//
// Keys are virtual paths (e.g. `/node_modules/@types/luxon/index.d.ts`).
// Entries are written whole and never edited in place, so a reader sees
// either the previous complete value or the new complete value.
//

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use lru::LruCache;

use crate::error::CacheError;

/// Storage backend for declaration files
#[async_trait]
pub trait DeclarationCache: Send + Sync {
    /// Read one entry
    async fn get_item(&self, path: &str) -> Option<String>;

    /// Write one entry, replacing any previous value
    async fn set_item(&self, path: &str, content: &str) -> Result<(), CacheError>;

    /// Every entry whose key starts with `prefix`
    async fn get_all_with_prefix(&self, prefix: &str) -> BTreeMap<String, String>;
}

// ============================================================================
// In-memory cache
// ============================================================================

/// Cache that lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryDeclarationCache {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryDeclarationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeclarationCache for MemoryDeclarationCache {
    async fn get_item(&self, path: &str) -> Option<String> {
        self.entries.read().ok()?.get(path).cloned()
    }

    async fn set_item(&self, path: &str, content: &str) -> Result<(), CacheError> {
        let mut guard = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        guard.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn get_all_with_prefix(&self, prefix: &str) -> BTreeMap<String, String> {
        let Ok(guard) = self.entries.read() else {
            return BTreeMap::new();
        };
        guard
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

// ============================================================================
// Durable directory-backed cache
// ============================================================================

/// Default capacity of the in-memory read memo
const DEFAULT_MEMO_CAPACITY: usize = 256;

/// Prefix of the temporary files used for atomic writes
const TEMP_PREFIX: &str = ".tmp-decl";

/// Cache persisted as one file per key under a root directory.
///
/// A key `/a/b.d.ts` is stored at `<root>/a/b.d.ts`. Writes go to a temporary
/// file in the destination directory followed by a rename. Recently read
/// entries are kept in an LRU memo; `peek()` on reads keeps the read path
/// under a shared lock.
pub struct DiskDeclarationCache {
    root: PathBuf,
    memo: RwLock<LruCache<String, String>>,
}

impl std::fmt::Debug for DiskDeclarationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskDeclarationCache")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl DiskDeclarationCache {
    /// Open (creating if needed) a cache rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            memo: RwLock::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_MEMO_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        })
    }

    /// Open a cache in the platform temp directory, namespaced by `name`
    pub fn open_default(name: &str) -> anyhow::Result<Self> {
        Self::open(std::env::temp_dir().join("sidekick").join(name))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to its on-disk location, rejecting keys that escape the root
    fn file_for_key(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative.as_os_str().is_empty() {
            return None;
        }
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            log::warn!("Rejecting suspicious declaration cache key: {}", key);
            return None;
        }
        Some(self.root.join(relative))
    }

    fn key_for_file(root: &Path, file: &Path) -> Option<String> {
        let relative = file.strip_prefix(root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(format!("/{}", parts.join("/")))
    }

    fn memo_get(&self, key: &str) -> Option<String> {
        self.memo.read().ok()?.peek(key).cloned()
    }

    fn memo_put(&self, key: &str, content: &str) {
        if let Ok(mut guard) = self.memo.write() {
            guard.push(key.to_string(), content.to_string());
        }
    }

    fn write_atomic(path: &Path, content: &str) -> Result<(), CacheError> {
        use std::io::Write;

        let dir = path
            .parent()
            .ok_or_else(|| std::io::Error::other("cache entry has no parent directory"))?;
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    fn scan_prefix(root: &Path, prefix: &str) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for entry in walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                continue;
            }
            let Some(key) = Self::key_for_file(root, entry.path()) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            match std::fs::read_to_string(entry.path()) {
                Ok(content) => {
                    out.insert(key, content);
                }
                Err(e) => log::trace!("Skipping unreadable cache entry {}: {}", key, e),
            }
        }
        out
    }
}

#[async_trait]
impl DeclarationCache for DiskDeclarationCache {
    async fn get_item(&self, path: &str) -> Option<String> {
        if let Some(hit) = self.memo_get(path) {
            return Some(hit);
        }
        let file = self.file_for_key(path)?;
        let content = tokio::fs::read_to_string(&file).await.ok()?;
        self.memo_put(path, &content);
        Some(content)
    }

    async fn set_item(&self, path: &str, content: &str) -> Result<(), CacheError> {
        let file = self.file_for_key(path).ok_or_else(|| {
            CacheError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid cache key {path}"),
            ))
        })?;
        let owned = content.to_string();
        tokio::task::spawn_blocking(move || Self::write_atomic(&file, &owned))
            .await
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))??;
        self.memo_put(path, content);
        Ok(())
    }

    async fn get_all_with_prefix(&self, prefix: &str) -> BTreeMap<String, String> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        match tokio::task::spawn_blocking(move || Self::scan_prefix(&root, &prefix)).await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Declaration cache scan failed: {}", e);
                BTreeMap::new()
            }
        }
    }
}
