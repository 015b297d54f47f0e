// Profile cache - the iterable collection of known library profiles.
//
// Entries are kept as Result values so that an unparseable profile stays
// visible as a skippable entry instead of silently vanishing; the matcher
// logs and steps over them.

use super::{compare_versions, LibProfile, VersionScheme};
use crate::errors::Result;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Why a cache entry could not be loaded.
#[derive(Debug, Clone)]
pub struct CacheError {
    pub path: PathBuf,
    pub reason: String,
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

/// One slot in the cache: a loaded profile or a parse failure.
pub type CacheEntry = std::result::Result<Arc<LibProfile>, CacheError>;

/// Iterable collection of library profiles.
#[derive(Debug, Clone, Default)]
pub struct ProfileCache {
    entries: Vec<CacheEntry>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_profiles<I>(profiles: I) -> Self
    where
        I: IntoIterator<Item = LibProfile>,
    {
        Self {
            entries: profiles.into_iter().map(|p| Ok(Arc::new(p))).collect(),
        }
    }

    /// Load every `*.json` profile under `dir`. Files that fail to parse
    /// become error entries, not failures.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        let mut cache = Self::new();
        for path in files {
            match fs::read_to_string(&path) {
                Ok(text) => match serde_json::from_str::<LibProfile>(&text) {
                    Ok(profile) => {
                        debug!(
                            "Loaded profile {} {} from {}",
                            profile.name(),
                            profile.version(),
                            path.display()
                        );
                        cache.push(profile);
                    }
                    Err(err) => cache.push_error(path, err.to_string()),
                },
                Err(err) => cache.push_error(path, err.to_string()),
            }
        }
        Ok(cache)
    }

    pub fn push(&mut self, profile: LibProfile) {
        self.entries.push(Ok(Arc::new(profile)));
    }

    pub fn push_error(&mut self, path: PathBuf, reason: String) {
        warn!("Skipping unreadable profile {}: {}", path.display(), reason);
        self.entries.push(Err(CacheError { path, reason }));
    }

    /// Total number of entries, parse failures included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Readable profiles, in cache order.
    pub fn profiles(&self) -> impl Iterator<Item = &Arc<LibProfile>> {
        self.entries.iter().filter_map(|e| e.as_ref().ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = &CacheError> {
        self.entries.iter().filter_map(|e| e.as_ref().err())
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Newest known version per library name.
    pub fn unique_libraries(&self, scheme: VersionScheme) -> HashMap<String, String> {
        let mut newest: HashMap<String, String> = HashMap::new();
        for profile in self.profiles() {
            match newest.get(profile.name()) {
                Some(current)
                    if compare_versions(current, profile.version(), scheme)
                        != Ordering::Less => {}
                _ => {
                    newest.insert(profile.name().to_string(), profile.version().to_string());
                }
            }
        }
        newest
    }

    /// Flag every profile that has a newer sibling in the cache.
    pub fn mark_deprecated(&mut self, scheme: VersionScheme) {
        let newest = self.unique_libraries(scheme);
        for entry in self.entries.iter_mut() {
            if let Ok(profile) = entry {
                let deprecated = newest
                    .get(profile.name())
                    .map(|latest| {
                        compare_versions(latest, profile.version(), scheme) == Ordering::Greater
                    })
                    .unwrap_or(false);
                Arc::make_mut(profile).is_deprecated = deprecated;
            }
        }
    }
}
