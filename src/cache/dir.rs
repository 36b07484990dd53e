use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{CacheConfig, CacheNamespace};

pub const APP_DIR: &str = "codescout";
pub const PROCESS_DIR_PREFIX: &str = "proc-";

/// `<user-cache-home>/codescout/cache/analysis[/proc-<pid>]`, falling back to the
/// temp directory when the platform has no cache home.
pub fn resolve_cache_dir(config: &CacheConfig) -> PathBuf {
    if let Some(dir) = &config.directory {
        return dir.clone();
    }
    cache_dir_for(dirs::cache_dir(), config.namespace, std::process::id())
}

pub fn cache_dir_for(cache_home: Option<PathBuf>, namespace: CacheNamespace, pid: u32) -> PathBuf {
    let base = cache_home
        .unwrap_or_else(env::temp_dir)
        .join(APP_DIR)
        .join("cache")
        .join("analysis");
    match namespace {
        CacheNamespace::PerProcess => base.join(format!("{}{}", PROCESS_DIR_PREFIX, pid)),
        CacheNamespace::Shared => base,
    }
}

/// Creates `dir` (owner-only on Unix). A concurrent creator winning the race is not an error.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    match builder.create(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}
