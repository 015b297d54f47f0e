//! Integration tests for the matching engine
//!
//! These tests drive the public matching API with in-memory fixtures:
//! profiles are assembled exactly the way an extractor would build them,
//! with class digests derived from fixed seeds.

use libsleuth::{
    ClassEntry, Digest, HashTreeBuilder, LibMatcher, LibProfile, MatcherOptions, Profile,
    ProfileCache, VersionScheme,
};
use libsleuth::pkg::PackageTree;
use libsleuth::profile::{FULL_MATCH, MATCH_SKIPPED};
use libsleuth::ClassListExtractor;
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Build a profile from (class name, digest seed) pairs.
fn make_profile(name: &str, version: &str, classes: &[(&str, &str)]) -> Profile {
    let entries: Vec<ClassEntry> = classes
        .iter()
        .map(|(class, seed)| ClassEntry {
            name: class.to_string(),
            digest: Digest::of(seed.as_bytes()),
        })
        .collect();
    let hash_tree = HashTreeBuilder::default().build("release", &entries);
    let package_tree =
        PackageTree::from_classes(classes.iter().map(|(class, _)| *class), &HashSet::new());

    Profile {
        name: name.to_string(),
        version: version.to_string(),
        package_tree,
        hash_trees: vec![hash_tree],
    }
}

fn make_lib(name: &str, version: &str, classes: &[(&str, &str)]) -> LibProfile {
    LibProfile {
        profile: make_profile(name, version, classes),
        category: None,
        is_deprecated: false,
    }
}

fn matcher_with(cache: ProfileCache, options: MatcherOptions) -> LibMatcher {
    LibMatcher::new(cache, Box::new(ClassListExtractor::new())).with_options(options)
}

fn match_one(app: &Profile, lib: LibProfile, options: MatcherOptions) -> libsleuth::ProfileMatch {
    let lib = Arc::new(lib);
    let matcher = matcher_with(ProfileCache::new(), options);
    matcher.match_profile(app, &lib)
}

/// Write an app class list JSON for `identify_libs` round trips.
fn write_app_json(dir: &std::path::Path, classes: &[(&str, &str)]) -> PathBuf {
    let entries: Vec<serde_json::Value> = classes
        .iter()
        .map(|(class, seed)| {
            serde_json::json!({
                "name": class,
                "digest": Digest::of(seed.as_bytes()).to_string(),
            })
        })
        .collect();
    let doc = serde_json::json!({
        "name": "app-under-test",
        "version": "1.0",
        "configs": [ { "config": "classes.dex", "classes": entries } ],
    });

    let path = dir.join("app.json");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, "{doc}").unwrap();
    path
}

const GSON_CLASSES: &[(&str, &str)] = &[
    ("com.google.gson.Gson", "gson-main"),
    ("com.google.gson.stream.JsonReader", "gson-reader"),
    ("com.google.gson.stream.JsonWriter", "gson-writer"),
];

// ============================================================================
// Full matching
// ============================================================================

mod full_match_tests {
    use super::*;

    #[test]
    fn test_full_match_with_extra_app_packages() {
        // library root children are a subset of the app's: still a full match
        let lib = make_lib(
            "vendorlib",
            "1.0.0",
            &[("com.lib.a.One", "h1"), ("com.lib.b.Two", "h2")],
        );
        let app = make_profile(
            "app",
            "1.0",
            &[
                ("com.lib.a.One", "h1"),
                ("com.lib.b.Two", "h2"),
                ("com.app.extra.Three", "h3"),
            ],
        );

        let pm = match_one(&app, lib, MatcherOptions::default());
        assert!(pm.is_full_match());
        assert_eq!(pm.results.len(), 1);
        assert_eq!(pm.results[0].score, FULL_MATCH);
        assert_eq!(pm.results[0].root_package, None);
        assert!(!pm.results[0].nodes.is_empty());
    }

    #[test]
    fn test_wholesale_rename_is_full_match_and_obfuscated() {
        // identical class digests under renamed packages produce identical
        // package digests: the fingerprint sees a verbatim inclusion whose
        // root package is nowhere in the app namespace
        let lib = make_lib(
            "vendorlib",
            "1.0.0",
            &[("com.lib.a.One", "h1"), ("com.lib.b.Two", "h2")],
        );
        let app = make_profile(
            "app",
            "1.0",
            &[("x.y.a.R1", "h1"), ("x.y.b.R2", "h2")],
        );

        let pm = match_one(&app, lib, MatcherOptions::default());
        assert!(pm.is_full_match());
        assert!(!pm.lib_root_present);
        assert!(pm.is_lib_obfuscated());
    }

    #[test]
    fn test_empty_library_tree_never_fully_matches() {
        let lib = make_lib("empty", "1.0.0", &[]);
        let app = make_profile("app", "1.0", &[("com.app.Main", "m")]);

        let pm = match_one(&app, lib, MatcherOptions::default());
        assert!(!pm.is_full_match());
    }
}

// ============================================================================
// Partial matching (partition search)
// ============================================================================

mod partial_match_tests {
    use super::*;

    fn vendor_lib() -> LibProfile {
        make_lib(
            "vendorlib",
            "2.0.0",
            &[
                ("com.lib.core.Engine", "x"),
                ("com.lib.core.Parser", "y"),
                ("com.lib.util.Helper", "z"),
                ("com.lib.util.Cache", "w"),
            ],
        )
    }

    fn renamed_app() -> Profile {
        // the library relocated under org.app.vendor; the util package
        // gained an app-side class, so package digests no longer match
        make_profile(
            "app",
            "1.0",
            &[
                ("org.app.vendor.core.A", "x"),
                ("org.app.vendor.core.B", "y"),
                ("org.app.vendor.util.C", "z"),
                ("org.app.vendor.util.D", "w"),
                ("org.app.vendor.util.Extra", "q"),
                ("com.app.MainActivity", "m"),
                ("com.app.ui.Screen", "u"),
            ],
        )
    }

    #[test]
    fn test_renamed_root_discovered_as_partition() {
        let pm = match_one(&renamed_app(), vendor_lib(), MatcherOptions::default());

        assert_eq!(pm.results.len(), 1);
        let result = &pm.results[0];
        // every library class is present, so the partition scores 1.0 -
        // but it is a relocated inclusion, not a verbatim full match
        assert_eq!(result.score, 1.0);
        assert_eq!(result.root_package.as_deref(), Some("org.app.vendor"));
        assert!(!result.is_full_match());
        assert!(!pm.lib_root_present);

        let matched: Vec<&str> = result.nodes.iter().map(|n| n.package.as_str()).collect();
        assert!(matched.contains(&"org.app.vendor.core"));
        assert!(matched.contains(&"org.app.vendor.util"));
    }

    #[test]
    fn test_no_partial_matching_flag_short_circuits() {
        let options = MatcherOptions {
            no_partial_matching: true,
            ..Default::default()
        };
        let pm = match_one(&renamed_app(), vendor_lib(), options);

        assert_eq!(pm.results[0].score, 0.0);
        assert_eq!(pm.results[0].root_package, None);
    }

    #[test]
    fn test_low_partition_coverage_is_abandoned() {
        // only one of three library packages has any candidate: the
        // partition is dropped before the combinatorial search
        let lib = make_lib(
            "widelib",
            "1.0.0",
            &[
                ("com.lib.a.A1", "a1"),
                ("com.lib.a.A2", "a2"),
                ("com.lib.b.B1", "b1"),
                ("com.lib.b.B2", "b2"),
                ("com.lib.c.C1", "c1"),
                ("com.lib.c.C2", "c2"),
            ],
        );
        let app = make_profile(
            "app",
            "1.0",
            &[
                ("org.v.a.R1", "a1"),
                ("org.v.a.R2", "a2"),
                ("org.v.a.R3", "noise"),
                ("com.app.Main", "m"),
            ],
        );

        let pm = match_one(&app, lib, MatcherOptions::default());
        assert_eq!(pm.results[0].score, 0.0);
        assert_eq!(pm.results[0].root_package, None);
    }

    #[test]
    fn test_min_class_score_filters_candidates_strictly() {
        // one of two library classes is present: per-package similarity 0.5
        let lib = make_lib(
            "halflib",
            "1.0.0",
            &[("com.lib.P", "p"), ("com.lib.Q", "q")],
        );
        let app = make_profile(
            "app",
            "1.0",
            &[("org.vendor.P1", "p"), ("org.vendor.Other", "r")],
        );

        // 0.5 is NOT strictly above a 0.5 class-score floor
        let strict = MatcherOptions {
            min_class_score: 0.5,
            min_partial_score: 0.4,
            ..Default::default()
        };
        let pm = match_one(&app, lib.clone(), strict);
        assert_eq!(pm.results[0].score, 0.0);

        // lowering the floor admits the candidate pair
        let relaxed = MatcherOptions {
            min_class_score: 0.4,
            min_partial_score: 0.4,
            ..Default::default()
        };
        let pm = match_one(&app, lib, relaxed);
        assert_eq!(pm.results[0].score, 0.5);
        assert_eq!(pm.results[0].root_package.as_deref(), Some("org.vendor"));
    }

    #[test]
    fn test_scores_stay_in_bounds() {
        let apps = [renamed_app(), make_profile("empty", "1.0", &[])];
        let libs = [
            vendor_lib(),
            make_lib("tiny", "0.1.0", &[("com.tiny.T", "t")]),
            make_lib(
                "multiroot",
                "1.0.0",
                &[("com.liba.Engine", "e"), ("org.libb.Helper", "h")],
            ),
        ];

        for app in &apps {
            for lib in &libs {
                let pm = match_one(app, lib.clone(), MatcherOptions::default());
                for result in &pm.results {
                    assert!(
                        result.score == MATCH_SKIPPED
                            || (0.0..=1.0).contains(&result.score),
                        "score {} out of bounds for {}",
                        result.score,
                        lib.name()
                    );
                }
            }
        }
    }
}

// ============================================================================
// Skip sentinel (undeterminable root)
// ============================================================================

mod skip_sentinel_tests {
    use super::*;

    #[test]
    fn test_multi_rooted_library_is_skipped_not_zero() {
        // two unrelated top-level namespaces of equal weight: no root
        let lib = make_lib(
            "multiroot",
            "1.0.0",
            &[("com.liba.Engine", "e"), ("org.libb.Helper", "h")],
        );
        let app = make_profile("app", "1.0", &[("com.app.Main", "m")]);

        let pm = match_one(&app, lib, MatcherOptions::default());
        assert_eq!(pm.results.len(), 1);
        assert_eq!(pm.results[0].score, MATCH_SKIPPED);
        assert_eq!(pm.results[0].root_package, None);
        assert!(pm.results[0].is_skipped());
        assert!(!pm.lib_root_present);
    }

    #[test]
    fn test_library_without_hash_tree_is_skipped() {
        let mut lib = make_lib("broken", "1.0.0", &[("com.broken.A", "a")]);
        lib.profile.hash_trees.clear();
        let app = make_profile("app", "1.0", &[("com.app.Main", "m")]);

        let pm = match_one(&app, lib, MatcherOptions::default());
        assert_eq!(pm.results[0].score, MATCH_SKIPPED);
    }
}

// ============================================================================
// identify_libs orchestration
// ============================================================================

mod identify_tests {
    use super::*;

    #[test]
    fn test_unreadable_cache_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let app_path = write_app_json(dir.path(), GSON_CLASSES);

        let mut cache = ProfileCache::from_profiles([
            make_lib("gson", "2.8.0", GSON_CLASSES),
            make_lib("okio", "3.0.0", &[("com.squareup.okio.Buffer", "okio-buf")]),
        ]);
        cache.push_error(PathBuf::from("broken.json"), "bad json".into());

        let mut matcher = matcher_with(cache, MatcherOptions::default());
        let stats = matcher.identify_libs(&app_path).unwrap();

        // one match per readable profile, the broken entry skipped silently
        assert_eq!(stats.matches.len(), 2);
        assert!(stats.matches.iter().any(|pm| pm.lib.name() == "gson" && pm.is_full_match()));
        assert!(stats.matches.iter().any(|pm| pm.lib.name() == "okio" && !pm.is_full_match()));
    }

    #[test]
    fn test_package_only_heuristic_and_ambiguous_roots() {
        let dir = tempfile::tempdir().unwrap();
        let app_path = write_app_json(dir.path(), GSON_CLASSES);

        // same root package, different class hashes: heuristic hit only
        let stale_gson = make_lib(
            "gson",
            "1.0.0",
            &[("com.google.gson.Gson", "older-impl")],
        );
        let ambiguous_lib = make_lib("gson-fork", "1.0.0", GSON_CLASSES);

        let options = MatcherOptions {
            ambiguous: ["com.google.gson".to_string()].into_iter().collect(),
            ..Default::default()
        };
        // the ambiguous set only silences the heuristic for matching roots;
        // gson-fork shares the root, stale_gson keeps its hit? both share
        // com.google.gson, so neither may be reported
        let mut matcher = matcher_with(
            ProfileCache::from_profiles([stale_gson, ambiguous_lib]),
            options,
        );
        let stats = matcher.identify_libs(&app_path).unwrap();
        assert!(stats.package_only_matches.is_empty());

        // without the ambiguous set both libraries produce a hit
        let stale_gson = make_lib(
            "gson",
            "1.0.0",
            &[("com.google.gson.Gson", "older-impl")],
        );
        let mut matcher = matcher_with(
            ProfileCache::from_profiles([stale_gson]),
            MatcherOptions::default(),
        );
        let stats = matcher.identify_libs(&app_path).unwrap();
        assert_eq!(
            stats.package_only_matches.get("gson").map(String::as_str),
            Some("com.google.gson")
        );
    }

    #[test]
    fn test_deprecation_flags_use_semantic_versions() {
        let dir = tempfile::tempdir().unwrap();
        let app_path = write_app_json(dir.path(), GSON_CLASSES);

        let cache = ProfileCache::from_profiles([
            make_lib("gson", "1.9", GSON_CLASSES),
            make_lib("gson", "1.10", GSON_CLASSES),
        ]);
        let mut matcher = matcher_with(cache, MatcherOptions::default());
        let stats = matcher.identify_libs(&app_path).unwrap();

        let deprecated: Vec<(&str, bool)> = stats
            .matches
            .iter()
            .map(|pm| (pm.lib.version(), pm.lib.is_deprecated))
            .collect();
        assert!(deprecated.contains(&("1.9", true)));
        assert!(deprecated.contains(&("1.10", false)));
    }

    #[test]
    fn test_lexicographic_scheme_reverses_the_flags() {
        let dir = tempfile::tempdir().unwrap();
        let app_path = write_app_json(dir.path(), GSON_CLASSES);

        let cache = ProfileCache::from_profiles([
            make_lib("gson", "1.9", GSON_CLASSES),
            make_lib("gson", "1.10", GSON_CLASSES),
        ]);
        let options = MatcherOptions {
            version_scheme: VersionScheme::Lexicographic,
            ..Default::default()
        };
        let mut matcher = matcher_with(cache, options);
        let stats = matcher.identify_libs(&app_path).unwrap();

        let deprecated: Vec<(&str, bool)> = stats
            .matches
            .iter()
            .map(|pm| (pm.lib.version(), pm.lib.is_deprecated))
            .collect();
        assert!(deprecated.contains(&("1.9", false)));
        assert!(deprecated.contains(&("1.10", true)));
    }

    #[test]
    fn test_lib_usage_collection() {
        let dir = tempfile::tempdir().unwrap();
        let app_path = write_app_json(dir.path(), GSON_CLASSES);

        let cache = ProfileCache::from_profiles([make_lib("gson", "2.8.0", GSON_CLASSES)]);
        let options = MatcherOptions {
            collect_lib_usage: true,
            ..Default::default()
        };
        let mut matcher = matcher_with(cache, options);
        let stats = matcher.identify_libs(&app_path).unwrap();

        let usage = stats.lib_usage.get("gson").expect("usage recorded");
        assert!(usage.iter().any(|p| p == "com.google.gson"));
        assert!(usage.iter().any(|p| p == "com.google.gson.stream"));
    }

    #[test]
    fn test_processing_time_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let app_path = write_app_json(dir.path(), GSON_CLASSES);

        let cache = ProfileCache::from_profiles([make_lib("gson", "2.8.0", GSON_CLASSES)]);
        let mut matcher = matcher_with(cache, MatcherOptions::default());
        let stats = matcher.identify_libs(&app_path).unwrap();

        assert!(stats.processing_time > std::time::Duration::ZERO);
        assert_eq!(stats.file_path, app_path);
        assert_eq!(stats.profile.name, "app-under-test");
    }
}
