//! TTL file cache for parsed specs
//!
//! JSON files under a cache directory, fronted by an in-memory index behind
//! a read-write lock. Expired entries are never returned; they are deleted
//! on the read that discovers them.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// One cached spec with its freshness window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
    pub spec: Value,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }
}

/// Filesystem-backed cache store.
pub struct CacheStore {
    dir: PathBuf,
    memory: RwLock<HashMap<String, CacheEntry>>,
}

impl CacheStore {
    pub fn new(dir: PathBuf) -> Result<CacheStore, Error> {
        fs::create_dir_all(&dir).map_err(Error::Cache)?;
        Ok(CacheStore {
            dir,
            memory: RwLock::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fetch a fresh entry's spec, or None on miss/expiry.
    pub fn get(&self, key: &str) -> Option<Value> {
        {
            let memory = self.memory.read().expect("cache lock poisoned");
            if let Some(entry) = memory.get(key) {
                if !entry.is_expired() {
                    return Some(entry.spec.clone());
                }
            } else {
                drop(memory);
                return self.get_from_disk(key);
            }
        }
        // Known expired: drop it everywhere.
        if let Err(err) = self.delete(key) {
            warn!("failed to delete expired cache entry {key}: {err}");
        }
        None
    }

    fn get_from_disk(&self, key: &str) -> Option<Value> {
        let path = self.cache_path(key);
        let raw = fs::read(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("discarding unreadable cache file {}: {err}", path.display());
                let _ = fs::remove_file(&path);
                return None;
            }
        };
        if entry.is_expired() {
            if let Err(err) = self.delete(key) {
                warn!("failed to delete expired cache entry {key}: {err}");
            }
            return None;
        }
        let spec = entry.spec.clone();
        self.memory
            .write()
            .expect("cache lock poisoned")
            .insert(key.to_string(), entry);
        Some(spec)
    }

    /// Store a spec, overwriting any previous entry for the key.
    pub fn set(&self, key: &str, spec: Value, ttl: Duration) -> Result<(), Error> {
        let now = SystemTime::now();
        let entry = CacheEntry {
            created_at: now,
            expires_at: now + ttl,
            spec,
        };

        self.memory
            .write()
            .expect("cache lock poisoned")
            .insert(key.to_string(), entry.clone());

        let path = self.cache_path(key);
        let data = serde_json::to_vec(&entry).map_err(Error::Serialize)?;
        fs::write(&path, data).map_err(Error::Cache)?;
        info!("cached spec under {}", path.display());
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<(), Error> {
        self.memory
            .write()
            .expect("cache lock poisoned")
            .remove(key);
        let path = self.cache_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Cache(err)),
        }
    }

    /// Drop every entry and recreate the cache directory.
    pub fn clear(&self) -> Result<(), Error> {
        self.memory.write().expect("cache lock poisoned").clear();
        fs::remove_dir_all(&self.dir).map_err(Error::Cache)?;
        fs::create_dir_all(&self.dir).map_err(Error::Cache)?;
        info!("cleared cache dir {}", self.dir.display());
        Ok(())
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

/// Derive a filesystem-safe cache key from a spec location.
pub fn cache_key(location: &str) -> String {
    location
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// `$APITAP_CACHE_DIR`, then `$HOME/.cache/apitap`, then a local fallback.
pub fn default_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("APITAP_CACHE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            return Path::new(&home).join(".cache").join("apitap");
        }
    }
    PathBuf::from(".apitap-cache")
}
