//! Named address maps referenced by rate limit rules.
//!
//! Rate limit rules only need a narrow view of map storage: whether a map
//! exists, appending a value, and the path the proxy should load the map
//! from. [`MapStore`] captures that surface; [`MemoryMaps`] is an in-process
//! implementation rooted at a maps directory.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Name of a map inside a [`MapStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapName(String);

impl MapName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location the proxy loads a map or pattern file from.
///
/// Opaque to rule processing: it is only ever stored and rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapPath(String);

impl MapPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MapPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage capability consumed by rate limit processing.
///
/// `exists` followed by `append` is not atomic through this trait; a store
/// shared between threads is responsible for serializing population of a
/// map.
pub trait MapStore: Send + Sync {
    /// Whether a map with this name has been created.
    fn exists(&self, name: &MapName) -> bool;

    /// Append a value to the named map, creating the map if needed.
    fn append(&self, name: &MapName, value: &str);

    /// Path of the named map as seen by the proxy.
    fn path(&self, name: &MapName) -> MapPath;
}

/// In-memory map storage.
///
/// Maps are kept in insertion order and rendered to paths of the form
/// `<dir>/<name>.map`.
#[derive(Debug)]
pub struct MemoryMaps {
    dir: PathBuf,
    maps: RwLock<HashMap<MapName, Vec<String>>>,
}

impl MemoryMaps {
    /// Create an empty store whose maps live under `dir`.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            maps: RwLock::new(HashMap::new()),
        }
    }

    /// Entries of the named map, if it exists.
    pub fn entries(&self, name: &MapName) -> Option<Vec<String>> {
        self.maps.read().get(name).cloned()
    }

    /// Number of maps in the store.
    pub fn map_count(&self) -> usize {
        self.maps.read().len()
    }

    /// Names of all maps, sorted.
    pub fn names(&self) -> Vec<MapName> {
        let mut names: Vec<MapName> = self.maps.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl MapStore for MemoryMaps {
    fn exists(&self, name: &MapName) -> bool {
        self.maps.read().contains_key(name)
    }

    fn append(&self, name: &MapName, value: &str) {
        trace!(map = %name, value = value, "Appending map entry");
        self.maps
            .write()
            .entry(name.clone())
            .or_default()
            .push(value.to_string());
    }

    fn path(&self, name: &MapName) -> MapPath {
        let file = self.dir.join(format!("{}.map", name));
        MapPath::new(file.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_creates_map() {
        let maps = MemoryMaps::new("/etc/haproxy/maps");
        let name = MapName::new("whitelist");

        assert!(!maps.exists(&name));
        maps.append(&name, "10.0.0.0/8");
        maps.append(&name, "192.168.1.1");

        assert!(maps.exists(&name));
        assert_eq!(
            maps.entries(&name),
            Some(vec!["10.0.0.0/8".to_string(), "192.168.1.1".to_string()])
        );
        assert_eq!(maps.map_count(), 1);
    }

    #[test]
    fn test_path_is_rooted_at_dir() {
        let maps = MemoryMaps::new("/etc/haproxy/maps");
        let path = maps.path(&MapName::new("ratelimit-whitelist-abc"));
        assert_eq!(path.as_str(), "/etc/haproxy/maps/ratelimit-whitelist-abc.map");
    }

    #[test]
    fn test_path_does_not_create_map() {
        let maps = MemoryMaps::new("/tmp/maps");
        let name = MapName::new("unused");
        let _ = maps.path(&name);
        assert!(!maps.exists(&name));
    }

    #[test]
    fn test_names_sorted() {
        let maps = MemoryMaps::new("/tmp/maps");
        maps.append(&MapName::new("b"), "1.1.1.1");
        maps.append(&MapName::new("a"), "2.2.2.2");
        assert_eq!(maps.names(), vec![MapName::new("a"), MapName::new("b")]);
    }
}
