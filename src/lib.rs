//! libsleuth - library fingerprint matching for Android apps
//!
//! This library decides which known third-party libraries are bundled
//! inside an application, including inclusions that were renamed or
//! partially obfuscated, by comparing merkle-style hash trees of the
//! package/class structure.
//!
//! # Architecture
//!
//! The matching pipeline consists of:
//! 1. **Extraction** - an [`extract::AppExtractor`] turns the artifact into
//!    a [`profile::Profile`] (package tree + one hash tree per build config)
//! 2. **Heuristic scan** - library root packages looked up in the app tree
//! 3. **Full matching** - verbatim package-hash containment
//! 4. **Partial matching** - partition search over relocated root packages
//!    with combinatorial, structure-verified assignment scoring
//! 5. **Results** - one [`profile::ProfileMatch`] per cached library,
//!    aggregated into [`profile::AppStats`] for the reporting side

pub mod config;
pub mod errors;
pub mod extract;
pub mod hashtree;
pub mod matcher;
pub mod pkg;
pub mod profile;

pub use config::Config;
pub use errors::{Error, Result};
pub use extract::{AppExtractor, ClassListExtractor, ExtractContext};
pub use hashtree::{
    ClassEntry, Digest, HashTree, HashTreeBuilder, HashTreeNode, NodeKind, TreeOptions,
};
pub use matcher::{LibMatcher, MatcherOptions, Relationship};
pub use profile::{
    AppStats, HashTreeMatch, LibProfile, Profile, ProfileCache, ProfileMatch, VersionScheme,
};
