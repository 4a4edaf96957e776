//! Annotation caches.
//!
//! [`CachedReader`] wraps any [`Reader`] and stores its results in a
//! [`Cache`].  Two caches are provided: [`ArrayCache`] (process memory) and
//! [`FileCache`] (one JSON file per key in a directory).

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AnnotationError, CacheError};
use crate::types::{DeclaringClass, ReflectionClass, ReflectionMethod, ReflectionProperty};

use super::reader::Reader;
use super::registry::AnnotationRegistry;
use super::value::Annotation;

/// A cached annotation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Creation time in milliseconds since the Unix epoch.
    pub created: u64,
    pub annotations: Vec<Annotation>,
}

impl CacheEntry {
    /// An entry created now.
    pub fn new(annotations: Vec<Annotation>) -> Self {
        Self {
            created: millis_since_epoch(SystemTime::now()),
            annotations,
        }
    }
}

fn millis_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A key-value store for annotation lists.
pub trait Cache: Send + Sync {
    fn fetch(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    fn save(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError>;
}

/// In-memory cache.
#[derive(Debug, Default)]
pub struct ArrayCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ArrayCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Cache for ArrayCache {
    fn fetch(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        self.entries.lock().insert(key.to_string(), entry.clone());
        Ok(())
    }
}

/// Directory-backed cache: one `<key>.cache.json` file per key.
#[derive(Debug, Clone)]
pub struct FileCache {
    directory: PathBuf,
}

impl FileCache {
    /// Open (creating if needed) a cache directory.  Fails when the
    /// directory cannot be created or is not writable.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let directory = directory.into();
        if !directory.is_dir() && std::fs::create_dir_all(&directory).is_err() {
            return Err(CacheError::DirectoryMissing(directory));
        }
        if tempfile::NamedTempFile::new_in(&directory).is_err() {
            return Err(CacheError::DirectoryNotWritable(directory));
        }
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| match c {
                '\\' | '/' | ':' => '-',
                c => c,
            })
            .collect();
        self.directory.join(format!("{}.cache.json", name))
    }
}

impl Cache for FileCache {
    fn fetch(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&content) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!("discarding corrupt cache file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn save(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let json = serde_json::to_vec(entry)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.directory)?;
        tmp.write_all(&json)?;
        tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }
}

/// A [`Reader`] decorator that caches results.
///
/// Keys are `Class`, `Class#method` and `Class$property`.  In debug mode an
/// entry older than the declaring class's source file is regenerated.
pub struct CachedReader<R, C> {
    delegate: R,
    cache: C,
    debug: bool,
    loaded: Mutex<HashMap<String, Vec<Annotation>>>,
}

impl<R: Reader, C: Cache> CachedReader<R, C> {
    pub fn new(delegate: R, cache: C, debug: bool) -> Self {
        Self {
            delegate,
            cache,
            debug,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn delegate(&self) -> &R {
        &self.delegate
    }

    /// Forget the in-process copies; the next lookups go to the cache.
    pub fn clear_loaded(&self) {
        self.loaded.lock().clear();
    }

    fn fetch_or_read(
        &self,
        key: String,
        declaring: &DeclaringClass,
        read: impl FnOnce() -> Result<Vec<Annotation>, AnnotationError>,
    ) -> Result<Vec<Annotation>, AnnotationError> {
        if let Some(annotations) = self.loaded.lock().get(&key) {
            return Ok(annotations.clone());
        }

        let cached = match self.cache.fetch(&key)? {
            Some(entry) if !self.debug || is_fresh(&entry, declaring) => Some(entry.annotations),
            Some(_) => {
                debug!("cache entry {} is stale", key);
                None
            }
            None => None,
        };

        let annotations = match cached {
            Some(annotations) => {
                debug!("cache hit for {}", key);
                annotations
            }
            None => {
                debug!("cache miss for {}", key);
                let annotations = read()?;
                self.cache.save(&key, &CacheEntry::new(annotations.clone()))?;
                annotations
            }
        };

        self.loaded.lock().insert(key, annotations.clone());
        Ok(annotations)
    }
}

/// Whether `entry` is at least as new as the declaring class's file.
/// Classes without a readable file are always fresh.
fn is_fresh(entry: &CacheEntry, declaring: &DeclaringClass) -> bool {
    let Some(modified) = declaring
        .file
        .as_deref()
        .and_then(|path| std::fs::metadata(path).ok())
        .and_then(|meta| meta.modified().ok())
    else {
        return true;
    };
    entry.created >= millis_since_epoch(modified)
}

impl<R: Reader, C: Cache> Reader for CachedReader<R, C> {
    fn registry(&self) -> &AnnotationRegistry {
        self.delegate.registry()
    }

    fn class_annotations(&self, class: &ReflectionClass) -> Result<Vec<Annotation>, AnnotationError> {
        self.fetch_or_read(class.name().to_string(), &class.declaring, || {
            self.delegate.class_annotations(class)
        })
    }

    fn method_annotations(
        &self,
        method: &ReflectionMethod,
    ) -> Result<Vec<Annotation>, AnnotationError> {
        let key = format!("{}#{}", method.declaring_class.name, method.name);
        self.fetch_or_read(key, &method.declaring_class, || {
            self.delegate.method_annotations(method)
        })
    }

    fn property_annotations(
        &self,
        property: &ReflectionProperty,
    ) -> Result<Vec<Annotation>, AnnotationError> {
        let key = format!("{}${}", property.declaring_class.name, property.name);
        self.fetch_or_read(key, &property.declaring_class, || {
            self.delegate.property_annotations(property)
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_replace_namespace_separators() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();
        assert_eq!(
            cache.path_for("App\\Entity\\User#getName"),
            dir.path().join("App-Entity-User#getName.cache.json")
        );
    }

    #[test]
    fn missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let cache = FileCache::new(&nested).unwrap();
        assert!(cache.directory().is_dir());
    }
}
