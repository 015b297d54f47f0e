//! App profile extraction seam
//!
//! Bytecode parsing lives outside this crate: whatever reads the actual
//! artifact hands over class names with precomputed content digests, and
//! this module assembles them into a [`Profile`]. The matcher never
//! computes a class digest itself.

use crate::errors::{Error, Result};
use crate::hashtree::{ClassEntry, HashTreeBuilder, TreeOptions};
use crate::pkg::{self, PackageTree};
use crate::profile::Profile;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Read-only context handed to extractors.
pub struct ExtractContext<'a> {
    /// Platform namespaces whose classes never belong to the app
    pub framework: Option<&'a PackageTree>,
    /// Packages excluded from root-package determination and tree building
    pub excluded: &'a HashSet<String>,
    pub tree_options: &'a TreeOptions,
}

/// Produces the profile of an application artifact.
///
/// Implementations must deliver fully-computed class digests; the engine
/// only ever derives package and root digests from them.
pub trait AppExtractor: Send + Sync {
    fn extract(&self, path: &Path, ctx: &ExtractContext<'_>) -> Result<Profile>;
}

#[derive(Deserialize)]
struct ClassListFile {
    name: String,
    #[serde(default)]
    version: String,
    configs: Vec<ClassListConfig>,
}

#[derive(Deserialize)]
struct ClassListConfig {
    config: String,
    classes: Vec<ClassEntry>,
}

/// Extractor for pre-digested JSON class lists.
///
/// The input carries one class list per build configuration:
///
/// ```json
/// {
///   "name": "demo-app",
///   "version": "1.0",
///   "configs": [
///     { "config": "classes.dex",
///       "classes": [ { "name": "com.app.Main", "digest": "ab…" } ] }
///   ]
/// }
/// ```
///
/// Class names may be dotted or JVM-internal (`Lcom/app/Main;`).
#[derive(Debug, Clone, Default)]
pub struct ClassListExtractor;

impl ClassListExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl AppExtractor for ClassListExtractor {
    fn extract(&self, path: &Path, ctx: &ExtractContext<'_>) -> Result<Profile> {
        let text = fs::read_to_string(path)?;
        let file: ClassListFile =
            serde_json::from_str(&text).map_err(|err| Error::Extract {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;

        let configs: Vec<(String, Vec<ClassEntry>)> = file
            .configs
            .into_iter()
            .map(|c| (c.config, c.classes))
            .collect();
        build_profile(file.name, file.version, configs, ctx)
    }
}

/// Assemble a [`Profile`] from per-configuration class lists.
///
/// Names are normalized, framework classes dropped, then one hash tree is
/// built per configuration; the package tree spans the union of all
/// configurations.
pub fn build_profile(
    name: String,
    version: String,
    configs: Vec<(String, Vec<ClassEntry>)>,
    ctx: &ExtractContext<'_>,
) -> Result<Profile> {
    if configs.is_empty() {
        return Err(Error::Profile(format!("{name}: no configurations")));
    }

    let builder = HashTreeBuilder::new(ctx.tree_options.clone());
    let mut hash_trees = Vec::with_capacity(configs.len());
    let mut all_classes: Vec<String> = Vec::new();

    for (config, classes) in configs {
        let kept: Vec<ClassEntry> = classes
            .into_iter()
            .map(|entry| ClassEntry {
                name: pkg::normalize_class_name(&entry.name),
                digest: entry.digest,
            })
            .filter(|entry| {
                let package = pkg::package_of(&entry.name);
                let is_framework = ctx
                    .framework
                    .is_some_and(|fw| fw.matches_namespace(package));
                if is_framework {
                    debug!("Dropping framework class {}", entry.name);
                }
                !is_framework
            })
            .collect();

        debug!("Config {}: {} app classes", config, kept.len());
        all_classes.extend(kept.iter().map(|e| e.name.clone()));
        hash_trees.push(builder.build(config, &kept));
    }

    let package_tree = PackageTree::from_classes(&all_classes, ctx.excluded);
    info!(
        "Profile {} {}: {} classes in {} packages, {} config(s)",
        name,
        version,
        package_tree.class_count(),
        package_tree.non_empty_packages(),
        hash_trees.len()
    );

    Ok(Profile {
        name,
        version,
        package_tree,
        hash_trees,
    })
}
