//! Two-tier cache for whole analysis results.
//!
//! The memory tier is a bounded map guarded by one read/write lock; the disk
//! tier holds one `<key>.json` file per project root and is the durable copy.
//! Every public method is infallible: I/O and serialization problems are
//! logged and turned into misses, so caching can never fail an analysis.

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisResult;
use crate::config::CacheConfig;

mod dir;
mod entry;


pub use dir::{cache_dir_for, ensure_dir, resolve_cache_dir};
pub use entry::{
    file_checksum, generate_key, normalize_root, CacheEntry, CacheMetadata, Staleness,
    CACHE_SCHEMA_VERSION, MAX_WATCHED_FILES,
};

#[derive(Debug, Error)]
enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupted cache file: {0}")]
    Corrupted(String),
}

type CacheResult<T> = Result<T, CacheError>;

pub struct AnalysisCache {
    dir: PathBuf,
    ttl: Duration,
    max_memory_entries: usize,
    eviction_batch: usize,
    memory: RwLock<HashMap<String, CacheEntry>>,
    /// Serializes every mutation of either tier. Always taken before `memory`.
    disk_lock: Mutex<()>,
}

impl AnalysisCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_directory(resolve_cache_dir(config), config)
    }

    pub fn with_directory<P: AsRef<Path>>(dir: P, config: &CacheConfig) -> Self {
        let dir = dir.as_ref().to_path_buf();
        if let Err(e) = ensure_dir(&dir) {
            warn!(dir = %dir.display(), error = %e, "failed to create cache directory");
        }

        Self {
            dir,
            ttl: config.ttl(),
            max_memory_entries: config.max_memory_entries.max(1),
            eviction_batch: config.eviction_batch,
            memory: RwLock::new(HashMap::new()),
            disk_lock: Mutex::new(()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, root: &Path) -> Option<AnalysisResult> {
        let key = generate_key(root);
        let now = Utc::now();

        {
            let memory = self.memory.read();
            if let Some(entry) = memory.get(&key) {
                if entry.staleness(now).is_none() {
                    debug!(key = %key, "analysis cache hit (memory)");
                    return Some(entry.payload.clone());
                }
            }
        }

        let _disk = self.disk_lock.lock();
        let mut memory = self.memory.write();
        if let Some(entry) = memory.get(&key) {
            match entry.staleness(now) {
                None => return Some(entry.payload.clone()),
                Some(reason) => {
                    debug!(key = %key, reason = ?reason, "dropping stale memory entry");
                    memory.remove(&key);
                }
            }
        }

        let path = self.entry_path(&key);
        let entry = match self.load_from_disk(&path) {
            Ok(Some(entry)) if entry.key == key => entry,
            Ok(Some(_)) => {
                warn!(key = %key, "cache file holds a different key, removing");
                remove_file(&path);
                return None;
            }
            Ok(None) => {
                debug!(key = %key, "analysis cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "removing unreadable cache file");
                remove_file(&path);
                return None;
            }
        };

        if let Some(reason) = entry.staleness(now) {
            debug!(key = %key, reason = ?reason, "dropping stale disk entry");
            remove_file(&path);
            return None;
        }

        debug!(key = %key, "analysis cache hit (disk), promoting");
        let payload = entry.payload.clone();
        memory.insert(key.clone(), entry);
        self.evict(&mut memory, &key);
        Some(payload)
    }

    pub fn set(&self, root: &Path, result: &AnalysisResult) {
        let key = generate_key(root);
        let entry = match CacheEntry::new(root, key.clone(), result.clone(), self.ttl) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to build cache entry");
                return;
            }
        };
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to serialize cache entry");
                return;
            }
        };

        let _disk = self.disk_lock.lock();
        {
            let mut memory = self.memory.write();
            memory.insert(key.clone(), entry);
            self.evict(&mut memory, &key);
        }
        match self.write_to_disk(&key, &bytes) {
            Ok(()) => debug!(key = %key, root = %root.display(), "analysis cached"),
            Err(e) => warn!(key = %key, error = %e, "failed to persist cache entry"),
        }
    }

    pub fn invalidate(&self, root: &Path) {
        let key = generate_key(root);
        let _disk = self.disk_lock.lock();
        self.memory.write().remove(&key);
        remove_file(&self.entry_path(&key));
        debug!(key = %key, "cache entry invalidated");
    }

    pub fn clear(&self) {
        let _disk = self.disk_lock.lock();
        self.memory.write().clear();
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "failed to clear cache directory"),
        }
        if let Err(e) = ensure_dir(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "failed to recreate cache directory");
        }
        info!(dir = %self.dir.display(), "analysis cache cleared");
    }

    /// Removes expired entries from both tiers and returns how many distinct keys went away.
    ///
    /// The disk sweep also walks `proc-<pid>` subdirectories left behind by
    /// per-process caches under this directory, dropping their leftover
    /// temp files and removing them once empty.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = BTreeSet::new();

        let _disk = self.disk_lock.lock();
        self.memory.write().retain(|key, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed.insert(key.clone());
            }
            keep
        });

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "failed to scan cache directory");
                return removed.len();
            }
        };

        for path in entries.filter_map(Result::ok).map(|e| e.path()) {
            if path.is_dir() {
                if is_process_dir(&path) {
                    self.sweep_dir(&path, now, &mut removed, true);
                    remove_empty_dir(&path);
                }
                continue;
            }
            self.sweep_file(&path, now, &mut removed, false);
        }

        if !removed.is_empty() {
            info!(removed = removed.len(), "expired cache entries removed");
        }
        removed.len()
    }

    pub fn contains_in_memory(&self, root: &Path) -> bool {
        self.memory.read().contains_key(&generate_key(root))
    }

    pub fn memory_len(&self) -> usize {
        self.memory.read().len()
    }

    /// Drops the memory tier only; disk entries stay available for promotion.
    pub fn clear_memory(&self) {
        self.memory.write().clear();
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Drops the oldest entries down to `max - batch`. `keep` is the entry
    /// that triggered the eviction and is never a candidate.
    fn evict(&self, memory: &mut HashMap<String, CacheEntry>, keep: &str) {
        if memory.len() <= self.max_memory_entries {
            return;
        }

        let target = self
            .max_memory_entries
            .saturating_sub(self.eviction_batch)
            .max(1);
        let mut by_age: Vec<(chrono::DateTime<Utc>, String)> = memory
            .iter()
            .filter(|(key, _)| key.as_str() != keep)
            .map(|(key, entry)| (entry.created_at, key.clone()))
            .collect();
        by_age.sort();

        let excess = memory.len() - target;
        for (_, key) in by_age.into_iter().take(excess) {
            memory.remove(&key);
        }
        debug!(evicted = excess, remaining = memory.len(), "memory tier evicted");
    }

    /// Disk sweep of one directory. Caller holds `disk_lock`.
    fn sweep_dir(
        &self,
        dir: &Path,
        now: DateTime<Utc>,
        removed: &mut BTreeSet<String>,
        drop_temp: bool,
    ) {
        match fs::read_dir(dir) {
            Ok(entries) => {
                for path in entries.filter_map(Result::ok).map(|e| e.path()) {
                    self.sweep_file(&path, now, removed, drop_temp);
                }
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "failed to scan cache directory"),
        }
    }

    fn sweep_file(
        &self,
        path: &Path,
        now: DateTime<Utc>,
        removed: &mut BTreeSet<String>,
        drop_temp: bool,
    ) {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {}
            // Another process's temp file outlived its write.
            Some("tmp") if drop_temp && !written_by_this_process(path) => {
                remove_file(path);
                return;
            }
            _ => return,
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let expired = match self.load_from_disk(path) {
            Ok(Some(entry)) => entry.is_expired(now),
            Ok(None) => false,
            Err(_) => true,
        };
        if expired {
            remove_file(path);
            removed.insert(stem);
        }
    }

    fn load_from_disk(&self, path: &Path) -> CacheResult<Option<CacheEntry>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry = serde_json::from_slice(&bytes)
            .map_err(|e| CacheError::Corrupted(format!("{}: {}", path.display(), e)))?;
        if !entry.payload_intact() {
            return Err(CacheError::Corrupted(format!(
                "{}: payload checksum mismatch",
                path.display()
            )));
        }
        Ok(Some(entry))
    }

    fn write_to_disk(&self, key: &str, bytes: &[u8]) -> CacheResult<()> {
        ensure_dir(&self.dir)?;
        let path = self.entry_path(key);
        let tmp = self
            .dir
            .join(format!("{}.{}.tmp", key, std::process::id()));
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

fn is_process_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix(dir::PROCESS_DIR_PREFIX))
        .map_or(false, |pid| !pid.is_empty() && pid.bytes().all(|b| b.is_ascii_digit()))
}

fn written_by_this_process(path: &Path) -> bool {
    let suffix = format!(".{}", std::process::id());
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map_or(false, |stem| stem.ends_with(&suffix))
}

fn remove_empty_dir(path: &Path) {
    let empty = fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if !empty {
        return;
    }
    match fs::remove_dir(path) {
        Ok(()) => debug!(dir = %path.display(), "removed empty process cache directory"),
        Err(e) => warn!(dir = %path.display(), error = %e, "failed to remove process cache directory"),
    }
}

fn remove_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %path.display(), error = %e, "failed to remove cache file"),
    }
}
