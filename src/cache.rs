//! Content-hash cache of component metadata for recompile cycles.
//!
//! A dev server refreshes the cache on every change; only files whose sha256
//! changed since the previous refresh are parsed again.

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::discovery::{component_name, find_zen_files, ComponentMap, ComponentMetadata};

pub struct CacheEntry {
    pub hash: String,
    pub metadata: ComponentMetadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub reused: usize,
    pub parsed: usize,
    pub removed: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct ComponentCache {
    entries: HashMap<PathBuf, CacheEntry>,
    last_stats: RefreshStats,
}

impl ComponentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_stats(&self) -> RefreshStats {
        self.last_stats
    }

    /// Rescan `dir` and return a fresh snapshot of its components.
    pub fn refresh(&mut self, dir: &Path) -> ComponentMap {
        let files = if dir.exists() {
            find_zen_files(dir)
        } else {
            Vec::new()
        };
        let mut stats = RefreshStats::default();

        let before = self.entries.len();
        self.entries.retain(|path, _| files.contains(path));
        stats.removed = before - self.entries.len();

        let sources: Vec<(PathBuf, String)> = files
            .into_iter()
            .filter_map(|path| match fs::read_to_string(&path) {
                Ok(source) => Some((path, source)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read component");
                    None
                }
            })
            .collect();

        let stale: Vec<(PathBuf, String, String)> = sources
            .into_iter()
            .filter_map(|(path, source)| {
                let hash = Self::compute_hash(&source);
                match self.entries.get(&path) {
                    Some(entry) if entry.hash == hash => None,
                    _ => Some((path, source, hash)),
                }
            })
            .collect();
        stats.reused = self.entries.len()
            - stale
                .iter()
                .filter(|(path, _, _)| self.entries.contains_key(path))
                .count();

        let parsed: Vec<_> = stale
            .into_par_iter()
            .map(|(path, source, hash)| {
                let path_str = path.to_string_lossy().to_string();
                let name = component_name(&path).unwrap_or_default();
                let result = ComponentMetadata::from_source(&name, &path_str, &source);
                (path, hash, result)
            })
            .collect();

        for (path, hash, result) in parsed {
            match result {
                Ok(metadata) => {
                    stats.parsed += 1;
                    self.entries.insert(path, CacheEntry { hash, metadata });
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(path = %path.display(), error = %e, "failed to parse component");
                    self.entries.remove(&path);
                }
            }
        }

        debug!(?stats, "refreshed component cache");
        self.last_stats = stats;
        self.snapshot()
    }

    fn snapshot(&self) -> ComponentMap {
        let mut paths: Vec<&PathBuf> = self.entries.keys().collect();
        paths.sort();
        let mut map = ComponentMap::new();
        for path in paths {
            if let Some(entry) = self.entries.get(path) {
                map.insert(entry.metadata.name.clone(), entry.metadata.clone());
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash_stable() {
        let a = ComponentCache::compute_hash("<div></div>");
        assert_eq!(a, ComponentCache::compute_hash("<div></div>"));
        assert_ne!(a, ComponentCache::compute_hash("<div> </div>"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_refresh_reparses_only_changed() {
        let dir = std::env::temp_dir().join(format!("zen-cache-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("A.zen"), "<div>a</div>").unwrap();
        fs::write(dir.join("B.zen"), "<div>b</div>").unwrap();

        let mut cache = ComponentCache::new();
        let first = cache.refresh(&dir);
        assert_eq!(first.len(), 2);
        assert_eq!(cache.last_stats().parsed, 2);

        fs::write(dir.join("B.zen"), "<div>b2</div>").unwrap();
        let second = cache.refresh(&dir);
        assert_eq!(second.len(), 2);
        assert_eq!(cache.last_stats().parsed, 1);
        assert_eq!(cache.last_stats().reused, 1);

        fs::remove_file(dir.join("A.zen")).unwrap();
        let third = cache.refresh(&dir);
        assert_eq!(third.len(), 1);
        assert_eq!(cache.last_stats().removed, 1);
        assert!(third.contains_key("B"));

        fs::remove_dir_all(&dir).ok();
    }
}
