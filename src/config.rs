//! Configuration loading
//!
//! Matcher thresholds and the excluded/ambiguous package sets, loadable
//! from a `libsleuth.toml` file. CLI flags override file values; file
//! values override the built-in defaults.

use crate::errors::Result;
use crate::hashtree::TreeOptions;
use crate::matcher::{MatcherOptions, MIN_CLASS_SCORE, MIN_PARTIAL_SCORE};
use crate::pkg::PackageTree;
use crate::profile::VersionScheme;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Package names too generic to ever act as a library root, plus the
/// platform namespaces that appear in every app.
pub fn default_excluded() -> Vec<String> {
    [
        "com", "org", "net", "de", "io", "me", "android", "androidx", "java", "javax", "kotlin",
        "kotlinx",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Tool configuration, usually read from `libsleuth.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Partial matches at or below this score are discarded
    pub min_partial_score: f64,
    /// Candidate pairs at or below this similarity are dropped
    pub min_class_score: f64,
    /// Skip the partition search entirely
    pub no_partial_matching: bool,
    /// Record which app packages each matched library occupies
    pub collect_lib_usage: bool,
    /// Names never accepted as a root package
    pub excluded: Vec<String>,
    /// Root packages skipped by the heuristic scan
    pub ambiguous: Vec<String>,
    pub version_scheme: VersionScheme,
    /// Drop compiler-numbered anonymous inner classes before hashing
    pub skip_anonymous_classes: bool,
    /// Drop generated resource classes (R, R$*, BuildConfig)
    pub skip_resource_classes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_partial_score: MIN_PARTIAL_SCORE,
            min_class_score: MIN_CLASS_SCORE,
            no_partial_matching: false,
            collect_lib_usage: false,
            excluded: default_excluded(),
            ambiguous: Vec::new(),
            version_scheme: VersionScheme::default(),
            skip_anonymous_classes: true,
            skip_resource_classes: true,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config = toml::from_str(&text)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Look for `libsleuth.toml` or `.libsleuth.toml` next to the analyzed
    /// artifact; fall back to the defaults.
    pub fn from_default_locations(dir: &Path) -> Result<Self> {
        for name in ["libsleuth.toml", ".libsleuth.toml"] {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Self::from_file(&candidate);
            }
        }
        Ok(Self::default())
    }

    /// Convert into the matcher's option struct.
    pub fn to_matcher_options(&self, framework: Option<PackageTree>) -> MatcherOptions {
        MatcherOptions {
            min_partial_score: self.min_partial_score,
            min_class_score: self.min_class_score,
            no_partial_matching: self.no_partial_matching,
            collect_lib_usage: self.collect_lib_usage,
            excluded: self.excluded.iter().cloned().collect(),
            ambiguous: self.ambiguous.iter().cloned().collect(),
            version_scheme: self.version_scheme,
            tree_options: TreeOptions {
                skip_anonymous_classes: self.skip_anonymous_classes,
                skip_resource_classes: self.skip_resource_classes,
            },
            framework,
        }
    }
}
