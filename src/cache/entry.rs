use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::analysis::AnalysisResult;

/// Bump whenever the persisted layout of `CacheEntry` or `AnalysisResult` changes.
pub const CACHE_SCHEMA_VERSION: &str = "1.0.0";

pub const KEY_HEX_LEN: usize = 16;
pub const FILE_CHECKSUM_HEX_LEN: usize = 8;
pub const MAX_WATCHED_FILES: usize = 10;

/// Allowed drift between the recorded and current project directory mtime.
pub fn mtime_tolerance() -> Duration {
    Duration::minutes(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: AnalysisResult,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub payload_checksum: String,
    pub metadata: CacheMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub project_path: String,
    pub config_file_set_hash: String,
    pub file_count: usize,
    pub project_dir_last_modified: DateTime<Utc>,
    pub cache_schema_version: String,
    pub dependency_versions: BTreeMap<String, String>,
    /// Root-relative path to content checksum.
    pub watched_file_checksums: BTreeMap<String, String>,
}

/// Why an entry can no longer be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    Expired,
    SchemaMismatch(String),
    WatchedFileChanged(String),
    DirectoryModified,
}

impl CacheEntry {
    pub fn new(
        root: &Path,
        key: String,
        payload: AnalysisResult,
        ttl: Duration,
    ) -> Result<Self, serde_json::Error> {
        let payload_checksum = payload_checksum(&payload)?;
        let metadata = CacheMetadata::capture(root, &payload);
        let created_at = Utc::now();
        let expires_at = created_at.checked_add_signed(ttl).unwrap_or_else(|| {
            debug!(ttl_secs = ttl.num_seconds(), "cache ttl overflows the calendar, clamping");
            DateTime::<Utc>::MAX_UTC
        });
        Ok(Self {
            key,
            payload,
            created_at,
            expires_at,
            payload_checksum,
            metadata,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn staleness(&self, now: DateTime<Utc>) -> Option<Staleness> {
        if self.is_expired(now) {
            return Some(Staleness::Expired);
        }
        if self.metadata.cache_schema_version != CACHE_SCHEMA_VERSION {
            return Some(Staleness::SchemaMismatch(
                self.metadata.cache_schema_version.clone(),
            ));
        }

        let root = Path::new(&self.metadata.project_path);
        for (relative, recorded) in &self.metadata.watched_file_checksums {
            match file_checksum(&root.join(relative)) {
                Some(current) if &current == recorded => {}
                _ => return Some(Staleness::WatchedFileChanged(relative.clone())),
            }
        }

        match dir_modified(root) {
            Some(current)
                if (current - self.metadata.project_dir_last_modified).abs()
                    <= mtime_tolerance() => {}
            _ => return Some(Staleness::DirectoryModified),
        }

        None
    }

    /// False when the payload no longer hashes to the recorded checksum.
    pub fn payload_intact(&self) -> bool {
        payload_checksum(&self.payload)
            .map(|sum| sum == self.payload_checksum)
            .unwrap_or(false)
    }
}

impl CacheMetadata {
    pub fn capture(root: &Path, result: &AnalysisResult) -> Self {
        let info = &result.project_info;

        let mut config_files = info.config_files.clone();
        config_files.sort();
        let config_file_set_hash = short_hash(config_files.join("\n").as_bytes(), KEY_HEX_LEN);

        let mut watched_file_checksums = BTreeMap::new();
        for relative in info.config_files.iter().chain(info.entry_points.iter()) {
            if watched_file_checksums.len() >= MAX_WATCHED_FILES {
                break;
            }
            if watched_file_checksums.contains_key(relative) {
                continue;
            }
            if let Some(sum) = file_checksum(&root.join(relative)) {
                watched_file_checksums.insert(relative.clone(), sum);
            }
        }

        Self {
            project_path: normalize_root(root).to_string_lossy().into_owned(),
            config_file_set_hash,
            file_count: result.file_structure.total_files,
            project_dir_last_modified: dir_modified(root).unwrap_or_else(Utc::now),
            cache_schema_version: CACHE_SCHEMA_VERSION.to_string(),
            dependency_versions: result.dependencies.versions(),
            watched_file_checksums,
        }
    }
}

/// Canonical form of a project root; the same directory always maps to the same path.
pub fn normalize_root(root: &Path) -> PathBuf {
    let absolute = root.canonicalize().unwrap_or_else(|_| {
        if root.is_absolute() {
            root.to_path_buf()
        } else {
            env::current_dir()
                .map(|cwd| cwd.join(root))
                .unwrap_or_else(|_| root.to_path_buf())
        }
    });

    let text = absolute.to_string_lossy();
    let trimmed = text.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        absolute
    } else {
        PathBuf::from(trimmed)
    }
}

/// Cache key for a project root: a truncated SHA-256 of the normalized path.
pub fn generate_key(root: &Path) -> String {
    let normalized = normalize_root(root);
    short_hash(normalized.to_string_lossy().as_bytes(), KEY_HEX_LEN)
}

pub fn short_hash(bytes: &[u8], len: usize) -> String {
    let mut digest = hex::encode(Sha256::digest(bytes));
    digest.truncate(len);
    digest
}

pub fn file_checksum(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(short_hash(&bytes, FILE_CHECKSUM_HEX_LEN)),
        Err(e) => {
            debug!(file = %path.display(), error = %e, "cannot checksum watched file");
            None
        }
    }
}

fn payload_checksum(payload: &AnalysisResult) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(short_hash(&bytes, KEY_HEX_LEN))
}

fn dir_modified(root: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(root).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}
