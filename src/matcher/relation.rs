//! Package relationships and node similarity scoring
//!
//! The relationship classification is purely string/depth based and is the
//! structural invariant the combinatorial search enforces: a high-scoring
//! assignment whose app packages do not mirror the library's nesting is a
//! coincidence, not a match.

use crate::hashtree::HashTreeNode;
use crate::pkg;

/// Structural relation between two dotted package names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    /// First name nests below the second
    Parent,
    /// Second name nests below the first
    Child,
    /// Identical names
    Sibling,
    Unrelated,
}

/// Segment-aware prefix test: `com.lib.core` starts with `com.lib` but
/// `com.libx` does not.
pub(crate) fn starts_with_package(name: &str, prefix: &str) -> bool {
    if name == prefix {
        return true;
    }
    name.len() > prefix.len()
        && name.starts_with(prefix)
        && name.as_bytes()[prefix.len()] == b'.'
}

/// Classify the relation between `pn1` and `pn2`.
pub fn relationship(pn1: &str, pn2: &str) -> Relationship {
    let d1 = pkg::depth(pn1);
    let d2 = pkg::depth(pn2);

    if starts_with_package(pn1, pn2) && d1 > d2 {
        Relationship::Parent
    } else if starts_with_package(pn2, pn1) && d2 > d1 {
        Relationship::Child
    } else if pn1 == pn2 {
        Relationship::Sibling
    } else {
        Relationship::Unrelated
    }
}

/// Similarity of a library node against an app node.
///
/// Kind mismatch is always 0.0, identical digests 1.0; otherwise the
/// fraction of the library node's direct children found among the app
/// node's children. One level only - deeper similarity is already encoded
/// in the children's digests.
pub fn sim_score(lib_node: &HashTreeNode, app_node: &HashTreeNode) -> f64 {
    if lib_node.kind != app_node.kind {
        return 0.0;
    }

    if lib_node.digest == app_node.digest {
        return 1.0;
    }

    if lib_node.children.is_empty() {
        return 0.0;
    }

    let matched = lib_node
        .children
        .iter()
        .filter(|child| app_node.contains(child))
        .count();
    matched as f64 / lib_node.child_count() as f64
}
