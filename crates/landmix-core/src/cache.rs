//! Optional memoization of pipeline products, keyed by city and data kind.
//!
//! A lookup is a [`CacheLookup`]: a hit, a miss, or a corrupted entry.
//! Corruption is never fatal; [`load_or_compute`] treats it as a miss,
//! recomputes and overwrites the entry.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{LumError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub city: String,
    /// Data kind, e.g. `pois` or `density`.
    pub kind: String,
}

impl CacheKey {
    pub fn new(city: &str, kind: &str) -> Self {
        Self { city: city.to_string(), kind: kind.to_string() }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.city, self.kind)
    }
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
    /// Entry present but unreadable; carries the reason.
    Corrupted(String),
}

/// Key/value store for serializable values.
pub trait LocalCache {
    fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheLookup<T>;
    fn put<T: Serialize>(&mut self, key: &CacheKey, value: &T) -> Result<()>;
}

fn decode<T: DeserializeOwned>(text: &str) -> CacheLookup<T> {
    match serde_json::from_str(text) {
        Ok(v) => CacheLookup::Hit(v),
        Err(e) => CacheLookup::Corrupted(e.to_string()),
    }
}

// ── On disk ───────────────────────────────────────────────────────────────────

/// One JSON file per entry at `<root>/<city>/<kind>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirCache {
    root: PathBuf,
}

/// Path-safe form of a key component.
fn sanitize(component: &str) -> String {
    let s: String = component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if s.is_empty() {
        "_".to_string()
    } else {
        s
    }
}

impl JsonDirCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(sanitize(&key.city)).join(format!("{}.json", sanitize(&key.kind)))
    }
}

impl LocalCache for JsonDirCache {
    fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheLookup<T> {
        match fs::read_to_string(self.entry_path(key)) {
            Ok(text) => decode(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => CacheLookup::Miss,
            Err(e) => CacheLookup::Corrupted(e.to_string()),
        }
    }

    fn put<T: Serialize>(&mut self, key: &CacheKey, value: &T) -> Result<()> {
        let path = self.entry_path(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        // Write-then-rename so a reader never sees a half-written entry.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(value)?)?;
        fs::rename(&tmp, &path)?;
        log::debug!("cached {key} at {}", path.display());
        Ok(())
    }
}

// ── In memory ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: HashMap<CacheKey, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw text under `key`, bypassing serialization.
    pub fn insert_raw(&mut self, key: CacheKey, text: String) {
        self.entries.insert(key, text);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LocalCache for MemoryCache {
    fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheLookup<T> {
        match self.entries.get(key) {
            Some(text) => decode(text),
            None => CacheLookup::Miss,
        }
    }

    fn put<T: Serialize>(&mut self, key: &CacheKey, value: &T) -> Result<()> {
        self.entries.insert(key.clone(), serde_json::to_string(value)?);
        Ok(())
    }
}

// ── Read-through ──────────────────────────────────────────────────────────────

/// Return the cached value for `key`, or compute and store it.
///
/// Corrupted entries are logged and recomputed. A failed write is logged;
/// the computed value is still returned.
pub fn load_or_compute<C, T, F>(cache: &mut C, key: &CacheKey, compute: F) -> Result<T>
where
    C: LocalCache,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    match cache.get::<T>(key) {
        CacheLookup::Hit(v) => {
            log::debug!("cache hit for {key}");
            return Ok(v);
        }
        CacheLookup::Miss => log::debug!("cache miss for {key}"),
        CacheLookup::Corrupted(reason) => {
            let err = LumError::CacheCorruption { key: key.to_string(), reason };
            log::warn!("{err}; recomputing");
        }
    }
    let value = compute()?;
    if let Err(e) = cache.put(key, &value) {
        log::warn!("could not cache {key}: {e}");
    }
    Ok(value)
}
