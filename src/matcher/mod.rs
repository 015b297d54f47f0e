//! Library matcher - the core identification engine
//!
//! For every library profile in the cache, the matcher decides whether the
//! library is present in an app, in four escalating steps:
//! 1. **Full match** - every library package hash appears verbatim
//! 2. **Candidate scoring** - per-package similarity above a class-score floor
//! 3. **Partition search** - hypothesize relocated root packages
//! 4. **Combinatorial verification** - best structurally consistent assignment
//!
//! Every `(app, library)` pair is independent, so the full pass fans out
//! across a rayon worker pool and collects in cache order.

mod combin;
mod relation;

pub use combin::MAX_COMBINATIONS;
pub use relation::{relationship, sim_score, Relationship};

use crate::errors::Result;
use crate::extract::{AppExtractor, ExtractContext};
use crate::hashtree::{HashTree, HashTreeNode, TreeOptions};
use crate::pkg::{self, PackageTree};
use crate::profile::{
    AppStats, HashTreeMatch, LibProfile, MatchedPackage, Profile, ProfileCache, ProfileMatch,
    VersionScheme, FULL_MATCH, MATCH_SKIPPED,
};
use combin::Candidate;
use rayon::prelude::*;
use relation::starts_with_package;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Default floor for accepting a partial match.
pub const MIN_PARTIAL_SCORE: f64 = 0.7;

/// Default floor for keeping a per-package candidate pair.
pub const MIN_CLASS_SCORE: f64 = 0.33;

/// Matcher configuration. All fields have working defaults.
#[derive(Debug, Clone)]
pub struct MatcherOptions {
    /// Partial matches at or below this score are discarded
    pub min_partial_score: f64,
    /// Candidate pairs at or below this similarity are never considered
    pub min_class_score: f64,
    /// Stop after the full-match shortcut; never run the partition search
    pub no_partial_matching: bool,
    /// Record which app packages each matched library occupies
    pub collect_lib_usage: bool,
    /// Package names never accepted as a root ("com", "org", ...)
    pub excluded: HashSet<String>,
    /// Root packages known to fingerprint multiple unrelated libraries;
    /// the root-package heuristic skips them
    pub ambiguous: HashSet<String>,
    /// Version ordering used for the deprecation flag
    pub version_scheme: VersionScheme,
    /// Hash-tree construction options handed to the extractor
    pub tree_options: TreeOptions,
    /// Platform/framework namespaces, filtered out of app profiles
    pub framework: Option<PackageTree>,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            min_partial_score: MIN_PARTIAL_SCORE,
            min_class_score: MIN_CLASS_SCORE,
            no_partial_matching: false,
            collect_lib_usage: false,
            excluded: HashSet::new(),
            ambiguous: HashSet::new(),
            version_scheme: VersionScheme::default(),
            tree_options: TreeOptions::default(),
            framework: None,
        }
    }
}

/// Identifies known libraries inside an application profile.
pub struct LibMatcher {
    cache: ProfileCache,
    extractor: Box<dyn AppExtractor>,
    options: MatcherOptions,
}

impl LibMatcher {
    pub fn new(cache: ProfileCache, extractor: Box<dyn AppExtractor>) -> Self {
        Self {
            cache,
            extractor,
            options: MatcherOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MatcherOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &MatcherOptions {
        &self.options
    }

    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }

    /// Top-level orchestration: extract the app profile, run the heuristic
    /// root-package scan, then match every cached library profile.
    ///
    /// Extraction failures propagate; unreadable cache entries and
    /// undeterminable library roots degrade per entry instead.
    pub fn identify_libs(&mut self, file_path: &Path) -> Result<AppStats> {
        let start = Instant::now();
        info!("Processing app: {}", file_path.display());

        self.cache.mark_deprecated(self.options.version_scheme);
        let unique = self.cache.unique_libraries(self.options.version_scheme);
        info!(
            "Found {} unique libraries in {} library profiles",
            unique.len(),
            self.cache.len()
        );

        let ctx = ExtractContext {
            framework: self.options.framework.as_ref(),
            excluded: &self.options.excluded,
            tree_options: &self.options.tree_options,
        };
        let app_profile = self.extractor.extract(file_path, &ctx)?;
        let mut stats = AppStats::new(file_path.to_path_buf(), app_profile);

        // fast scan (heuristic): is the lib root package present in the app?
        info!("Scanning for library root packages (heuristic)");
        for lib in self.cache.profiles() {
            let Some(root) = lib.profile.package_tree.root_package(&self.options.excluded)
            else {
                continue;
            };

            // generic roots would produce a hit for half the cache
            if self.options.ambiguous.contains(&root) {
                continue;
            }

            if stats.profile.package_tree.contains_package(&root)
                && !stats.package_only_matches.contains_key(lib.name())
            {
                info!("- Found lib root package {} ({})", root, lib.name());
                stats
                    .package_only_matches
                    .insert(lib.name().to_string(), root);
            }
        }

        // exact + partial matching, one worker per library
        info!("Matching {} profiles", self.cache.profiles().count());
        let pm_start = Instant::now();
        let profiles: Vec<&Arc<LibProfile>> = self.cache.profiles().collect();
        stats.matches = profiles
            .par_iter()
            .map(|&lib| self.match_profile(&stats.profile, lib))
            .collect();
        info!(">> Profile matching done ({:.2?})", pm_start.elapsed());

        for pm in stats.matches.iter().filter(|pm| pm.is_full_match()) {
            debug!(
                "- {} {}: all configs match (re-obfuscated: {})",
                pm.lib.name(),
                pm.lib.version(),
                pm.is_lib_obfuscated()
            );
        }

        if self.options.collect_lib_usage {
            Self::collect_usage(&mut stats);
        }

        stats.processing_time = start.elapsed();
        info!("App processing time: {:.2?}", stats.processing_time);
        Ok(stats)
    }

    /// Match one library against every hash tree of the app profile.
    pub fn match_profile(&self, app: &Profile, lib: &Arc<LibProfile>) -> ProfileMatch {
        let mut pm = ProfileMatch::new(Arc::clone(lib));
        debug!("Partial match of lib: {} {}", lib.name(), lib.version());

        let lib_root = lib.profile.package_tree.root_package(&self.options.excluded);
        pm.lib_root_present = lib_root
            .as_deref()
            .is_some_and(|root| app.package_tree.contains_package(root));

        for app_tree in &app.hash_trees {
            pm.results
                .push(self.partial_match(app_tree, lib, lib_root.as_deref()));
        }
        pm
    }

    fn partial_match(
        &self,
        app_tree: &HashTree,
        lib: &LibProfile,
        lib_root: Option<&str>,
    ) -> HashTreeMatch {
        let mut result = HashTreeMatch {
            config: app_tree.config.clone(),
            score: 0.0,
            root_package: None,
            nodes: Vec::new(),
        };
        debug!("- Partial match for config: {}", app_tree.config);

        // libraries always match with their single canonical tree
        let Some(lib_tree) = lib.profile.hash_trees.first() else {
            error!("Library {} has no hash tree", lib.name());
            result.score = MATCH_SKIPPED;
            return result;
        };

        // Step 0: shortcut - all lib package hashes present verbatim?
        if lib_tree.root.child_count() > 0
            && lib_tree.packages().iter().all(|lp| app_tree.root.contains(lp))
        {
            debug!(
                "-> All package hashes ({}) of library match",
                lib_tree.root.child_count()
            );
            let lib_set: HashSet<&HashTreeNode> = lib_tree.packages().iter().collect();
            result.score = FULL_MATCH;
            result.nodes = app_tree
                .packages()
                .iter()
                .filter(|ap| lib_set.contains(*ap))
                .map(|ap| MatchedPackage {
                    package: ap.value.clone(),
                    score: 1.0,
                })
                .collect();
            return result;
        }

        if self.options.no_partial_matching {
            return result;
        }

        // Step 0.5: partial matching needs an unambiguous root to bound the
        // search space; multi-rooted libraries are skipped, not guessed
        let Some(lib_root) = lib_root else {
            debug!("-> No partial matching: undeterminable lib root package");
            result.score = MATCH_SKIPPED;
            return result;
        };
        let root_depth = pkg::depth(lib_root);

        // Step 1: per-library-package candidate lists, ascending by score
        let mut candidates: Vec<(&HashTreeNode, Vec<Candidate<'_>>)> = lib_tree
            .packages()
            .iter()
            .map(|lp| {
                let mut clist: Vec<Candidate<'_>> = app_tree
                    .packages()
                    .iter()
                    .filter_map(|ap| {
                        let score = sim_score(lp, ap);
                        (score > self.options.min_class_score).then_some((ap, score))
                    })
                    .collect();
                clist.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
                (lp, clist)
            })
            .collect();

        // hardest-to-place library packages first
        candidates.sort_by(|a, b| {
            let best_a = a.1.last().map(|c| c.1).unwrap_or(-1.0);
            let best_b = b.1.last().map(|c| c.1).unwrap_or(-1.0);
            best_a.partial_cmp(&best_b).unwrap_or(Ordering::Equal)
        });

        // Step 2: partitions - for every candidate pair, strip the lib
        // package's relative depth below the lib root from the app package;
        // the remaining prefix is a potential relocated root
        let mut partitions: BTreeSet<String> = BTreeSet::new();
        for (lp, clist) in &candidates {
            let offset = pkg::depth(&lp.value).saturating_sub(root_depth);
            for (ap, _) in clist {
                let ap_depth = pkg::depth(&ap.value);
                if ap_depth > offset {
                    if let Some(prefix) = pkg::prefix_of_depth(&ap.value, ap_depth - offset) {
                        partitions.insert(prefix.to_string());
                    }
                }
            }
        }
        debug!("Partitions ({}): {:?}", partitions.len(), partitions);

        // precompute relationships between consecutive library packages
        let lib_relationships: Vec<Relationship> = candidates
            .windows(2)
            .map(|w| relationship(&w[0].0.value, &w[1].0.value))
            .collect();

        // Steps 3+4: score each partition, keep the overall maximum
        let mut best: Option<(String, f64, Vec<MatchedPackage>)> = None;
        for partition in &partitions {
            let partition_depth = pkg::depth(partition);
            let filtered: Vec<Vec<Candidate<'_>>> = candidates
                .iter()
                .map(|(lp, clist)| {
                    let offset = pkg::depth(&lp.value).saturating_sub(root_depth);
                    clist
                        .iter()
                        .filter(|(ap, _)| {
                            starts_with_package(&ap.value, partition)
                                && pkg::depth(&ap.value) == partition_depth + offset
                        })
                        .copied()
                        .collect()
                })
                .collect();

            let covered = filtered.iter().filter(|l| !l.is_empty()).count();
            if covered * 2 < filtered.len() {
                debug!(
                    "Only {}/{} lib packages have candidates for partition {} [SKIP]",
                    covered,
                    filtered.len(),
                    partition
                );
                continue;
            }

            if let Some((score, nodes)) =
                combin::best_match(&filtered, &lib_relationships, self.options.min_partial_score)
            {
                debug!("-> Partition: {}, sim score: {:.3}", partition, score);
                if best.as_ref().map_or(true, |(_, s, _)| score > *s) {
                    best = Some((partition.clone(), score, nodes));
                }
            }
        }

        match best {
            Some((partition, score, nodes)) => {
                debug!(
                    "=> Maximum partial matching score: {:.3} (partition: {})",
                    score, partition
                );
                result.score = score;
                result.root_package = Some(partition);
                result.nodes = nodes;
            }
            None => debug!("No partial match for {}", lib.name()),
        }
        result
    }

    fn collect_usage(stats: &mut AppStats) {
        for pm in &stats.matches {
            let packages: BTreeSet<String> = pm
                .results
                .iter()
                .filter(|r| r.score > 0.0)
                .flat_map(|r| r.nodes.iter().map(|n| n.package.clone()))
                .collect();
            if !packages.is_empty() {
                stats
                    .lib_usage
                    .insert(pm.lib.name().to_string(), packages.into_iter().collect());
            }
        }
    }
}
