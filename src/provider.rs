//! Spec provider: fetch, parse, detect, cache
//!
//! Resolves a spec location (filesystem path or http(s) URL) into a parsed
//! document, going through the TTL cache first. The OpenAPI version is
//! auto-detected from the top-level `openapi` field before the document is
//! accepted; only 3.0.x and 3.1.x are supported.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};
use serde_json::Value;

use crate::cache::{cache_key, CacheStore};
use crate::client::DEFAULT_TIMEOUT;
use crate::error::Error;

/// Env flag that clears the entire spec cache before tree-build.
pub const CLEAR_CACHE_ENV: &str = "APITAP_CLEAR_CACHE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecVersion {
    V30,
    V31,
}

pub struct SpecProvider {
    store: CacheStore,
}

impl SpecProvider {
    pub fn new(cache_dir: PathBuf) -> Result<SpecProvider, Error> {
        Ok(SpecProvider {
            store: CacheStore::new(cache_dir)?,
        })
    }

    /// Cached spec when fresh, otherwise fetch, validate, and cache. A cache
    /// write failure is a logged warning; the spec is still returned.
    pub fn get_spec(&self, location: &str, ttl: Duration) -> Result<Value, Error> {
        let key = cache_key(location);
        if let Some(spec) = self.store.get(&key) {
            info!("using cached spec for {location}");
            return Ok(spec);
        }

        info!("loading spec from {location}");
        let spec = load_spec(location)?;
        if let Err(err) = self.store.set(&key, spec.clone(), ttl) {
            warn!("failed to cache spec for {location}: {err}");
        }
        Ok(spec)
    }

    /// Drop any cached copy, re-fetch, and re-cache.
    pub fn refresh_spec(&self, location: &str, ttl: Duration) -> Result<Value, Error> {
        let key = cache_key(location);
        if let Err(err) = self.store.delete(&key) {
            warn!("failed to drop cached spec for {location}: {err}");
        }

        info!("refreshing spec from {location}");
        let spec = load_spec(location)?;
        if let Err(err) = self.store.set(&key, spec.clone(), ttl) {
            warn!("failed to cache spec for {location}: {err}");
        }
        Ok(spec)
    }

    pub fn clear_cache(&self) -> Result<(), Error> {
        self.store.clear()
    }

    /// Honor the documented escape hatch: clear the whole cache when
    /// `APITAP_CLEAR_CACHE=true`.
    pub fn clear_cache_if_requested(&self) {
        if std::env::var(CLEAR_CACHE_ENV).as_deref() == Ok("true") {
            match self.store.clear() {
                Ok(()) => info!("cache cleared ({CLEAR_CACHE_ENV}=true)"),
                Err(err) => warn!("failed to clear cache: {err}"),
            }
        }
    }
}

/// Fetch, parse, and version-check a spec without touching the cache.
pub fn load_spec(location: &str) -> Result<Value, Error> {
    let bytes = fetch(location)?;
    let doc = parse_document(&bytes, location)?;
    let version = detect_version(&doc)?;
    info!("detected OpenAPI version {version:?} for {location}");
    Ok(doc)
}

pub fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn fetch(location: &str) -> Result<Vec<u8>, Error> {
    if is_url(location) {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(Error::ClientBuild)?;
        let resp = client
            .get(location)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|source| Error::SpecFetch {
                location: location.to_string(),
                source,
            })?;
        let bytes = resp.bytes().map_err(|source| Error::SpecFetch {
            location: location.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    } else {
        fs::read(location).map_err(|source| Error::SpecRead {
            location: location.to_string(),
            source,
        })
    }
}

/// JSON first, YAML fallback.
fn parse_document(bytes: &[u8], location: &str) -> Result<Value, Error> {
    if let Ok(doc) = serde_json::from_slice(bytes) {
        return Ok(doc);
    }
    serde_yaml::from_slice(bytes).map_err(|_| Error::SpecParse(location.to_string()))
}

/// Read the top-level `openapi` field. A generic "3" is accepted as 3.0
/// with a warning; anything else is unsupported.
pub fn detect_version(doc: &Value) -> Result<SpecVersion, Error> {
    let Some(version) = doc.get("openapi").and_then(Value::as_str) else {
        return Err(Error::UnsupportedVersion(
            "missing top-level openapi field".to_string(),
        ));
    };
    if version.starts_with("3.1") {
        Ok(SpecVersion::V31)
    } else if version.starts_with("3.0") {
        Ok(SpecVersion::V30)
    } else if version.starts_with('3') {
        warn!("generic OpenAPI 3.x version {version}; assuming 3.0 compatibility");
        Ok(SpecVersion::V30)
    } else {
        Err(Error::UnsupportedVersion(version.to_string()))
    }
}
