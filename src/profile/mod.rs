//! Profiles and match results
//!
//! A [`Profile`] bundles everything the matcher needs to know about one
//! artifact: its package tree and its hash tree(s), one per build
//! configuration. Library profiles add identity metadata; match results
//! are ephemeral records consumed by the reporting side.

mod cache;

pub use cache::{CacheEntry, CacheError, ProfileCache};

use crate::hashtree::HashTree;
use crate::pkg::PackageTree;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Score sentinel: every package hash of the library was found verbatim.
pub const FULL_MATCH: f64 = 1.0;

/// Score sentinel: partial matching was not attempted (ambiguous or
/// undeterminable library root). Distinct from 0.0, which means "attempted
/// and nothing found".
pub const MATCH_SKIPPED: f64 = -1.0;

/// How version strings are ordered when deciding deprecation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionScheme {
    /// Lenient semver: "1.9" is padded to "1.9.0" and sorts below "1.10.0".
    /// Unparseable versions fall back to lexicographic order.
    #[default]
    Semantic,
    /// Plain string comparison
    Lexicographic,
}

fn parse_lenient(version: &str) -> Option<Version> {
    let trimmed = version.trim().trim_start_matches('v');
    if let Ok(parsed) = Version::parse(trimmed) {
        return Some(parsed);
    }

    // pad "1" or "1.9" out to a full triple
    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.is_empty() || parts.len() > 2 {
        return None;
    }
    if !parts.iter().all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }

    let padded = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        _ => format!("{}.{}.0", parts[0], parts[1]),
    };
    Version::parse(&padded).ok()
}

/// Compare two version strings under the given scheme.
pub fn compare_versions(a: &str, b: &str, scheme: VersionScheme) -> Ordering {
    match scheme {
        VersionScheme::Lexicographic => a.cmp(b),
        VersionScheme::Semantic => match (parse_lenient(a), parse_lenient(b)) {
            (Some(va), Some(vb)) => va.cmp(&vb),
            _ => a.cmp(b),
        },
    }
}

/// Structural fingerprint of one artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub version: String,
    pub package_tree: PackageTree,
    /// One tree per build configuration; never empty for a usable profile
    pub hash_trees: Vec<HashTree>,
}

/// A known third-party library in the profile cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibProfile {
    #[serde(flatten)]
    pub profile: Profile,
    /// Free-form category label ("Analytics", "Ads", ...)
    #[serde(default)]
    pub category: Option<String>,
    /// True when the cache holds a newer version of the same library.
    /// Computed per run, never persisted.
    #[serde(skip)]
    pub is_deprecated: bool,
}

impl LibProfile {
    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn version(&self) -> &str {
        &self.profile.version
    }
}

/// One matched app package with its similarity score.
#[derive(Debug, Clone)]
pub struct MatchedPackage {
    pub package: String,
    pub score: f64,
}

/// Match result for one (library, app hash tree) pair.
#[derive(Debug, Clone)]
pub struct HashTreeMatch {
    /// App-side configuration this result belongs to
    pub config: String,
    /// [`MATCH_SKIPPED`], or a value in [0.0, 1.0]
    pub score: f64,
    /// Winning partition for a partial match; `None` for full matches
    pub root_package: Option<String>,
    /// App packages that contributed to the score
    pub nodes: Vec<MatchedPackage>,
}

impl HashTreeMatch {
    pub fn is_full_match(&self) -> bool {
        self.score == FULL_MATCH && self.root_package.is_none()
    }

    pub fn is_skipped(&self) -> bool {
        self.score == MATCH_SKIPPED
    }
}

/// Aggregated result for one library across all app hash trees.
#[derive(Debug, Clone)]
pub struct ProfileMatch {
    pub lib: Arc<LibProfile>,
    /// Whether the library's root package exists verbatim in the app
    pub lib_root_present: bool,
    /// One entry per app hash tree, in tree order
    pub results: Vec<HashTreeMatch>,
}

impl ProfileMatch {
    pub fn new(lib: Arc<LibProfile>) -> Self {
        Self {
            lib,
            lib_root_present: false,
            results: Vec::new(),
        }
    }

    /// All configurations matched verbatim.
    pub fn is_full_match(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(HashTreeMatch::is_full_match)
    }

    /// Fully included, yet the library's own root package is nowhere in the
    /// app tree: the inclusion was renamed wholesale.
    pub fn is_lib_obfuscated(&self) -> bool {
        self.is_full_match() && !self.lib_root_present
    }

    /// Highest score across configurations, [`MATCH_SKIPPED`] when no
    /// result exists.
    pub fn best_score(&self) -> f64 {
        self.results
            .iter()
            .map(|r| r.score)
            .fold(MATCH_SKIPPED, f64::max)
    }
}

/// Accumulated matching output for one application.
#[derive(Debug, Clone)]
pub struct AppStats {
    pub file_path: PathBuf,
    pub profile: Profile,
    /// One entry per readable cache profile
    pub matches: Vec<ProfileMatch>,
    /// Heuristic hits: library name -> root package found in the app
    pub package_only_matches: BTreeMap<String, String>,
    /// Library name -> matched app packages; populated only when usage
    /// collection is enabled
    pub lib_usage: BTreeMap<String, Vec<String>>,
    pub processing_time: Duration,
}

impl AppStats {
    pub fn new(file_path: PathBuf, profile: Profile) -> Self {
        Self {
            file_path,
            profile,
            matches: Vec::new(),
            package_only_matches: BTreeMap::new(),
            lib_usage: BTreeMap::new(),
            processing_time: Duration::ZERO,
        }
    }

    pub fn full_matches(&self) -> impl Iterator<Item = &ProfileMatch> {
        self.matches.iter().filter(|m| m.is_full_match())
    }
}
