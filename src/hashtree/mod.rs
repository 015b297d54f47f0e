// Hash tree - merkle-style fingerprint of a package/class hierarchy
//
// Every node carries a content digest that is a pure function of its own
// content plus the (order-independent) set of its children's digests, so
// whole subtrees compare in O(1). Class digests are computed by the
// external extractor; this module only assembles package and root digests
// from them.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Fixed-size content digest of a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Digest of raw content. Extractors use this for class-level hashing;
    /// the matcher itself never calls it.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Order-independent combination of child digests: sort, concatenate,
    /// re-hash.
    pub fn combine<'a, I>(digests: I) -> Self
    where
        I: IntoIterator<Item = &'a Digest>,
    {
        let mut sorted: Vec<&Digest> = digests.into_iter().collect();
        sorted.sort();

        let mut hasher = Sha256::new();
        for digest in sorted {
            hasher.update(digest.0);
        }
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &hex::encode(self.0)[..12])
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(de::Error::custom)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| de::Error::custom("digest must be 32 bytes of hex"))?;
        Ok(Self(bytes))
    }
}

/// Granularity of a hash-tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Package,
    Class,
}

/// One package or class in the fingerprint.
///
/// Two nodes are equal iff they have the same kind and the same digest -
/// the `value` (its name) is deliberately excluded so that renamed but
/// structurally identical code still compares equal, and children are not
/// recursed because the digest already encodes the full subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashTreeNode {
    /// Dotted package name or fully-qualified class name
    pub value: String,
    pub kind: NodeKind,
    pub digest: Digest,
    /// Direct children, unique by `value`
    pub children: Vec<HashTreeNode>,
}

impl PartialEq for HashTreeNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.digest == other.digest
    }
}

impl Eq for HashTreeNode {}

impl std::hash::Hash for HashTreeNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.digest.hash(state);
    }
}

impl HashTreeNode {
    pub fn class(value: impl Into<String>, digest: Digest) -> Self {
        Self {
            value: value.into(),
            kind: NodeKind::Class,
            digest,
            children: Vec::new(),
        }
    }

    pub fn package(value: impl Into<String>, digest: Digest, children: Vec<HashTreeNode>) -> Self {
        Self {
            value: value.into(),
            kind: NodeKind::Package,
            digest,
            children,
        }
    }

    /// True iff an equal node (same kind and digest) exists among the
    /// direct children.
    pub fn contains(&self, node: &HashTreeNode) -> bool {
        self.children.iter().any(|c| c == node)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

/// One fingerprint tree per build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashTree {
    /// Obfuscation/build variant label, e.g. "release"
    pub config: String,
    /// Synthetic package root; its children are the package-level nodes
    pub root: HashTreeNode,
}

impl HashTree {
    /// Package-level nodes, one per package.
    pub fn packages(&self) -> &[HashTreeNode] {
        &self.root.children
    }
}

/// Checks if a class name denotes an anonymous inner class (`Foo$1`).
///
/// Named inner classes (`Foo$Bar`) are kept - only compiler-numbered ones
/// vary between toolchains.
pub fn is_anonymous_class(class_name: &str) -> bool {
    match class_name.rsplit_once('$') {
        Some((_, suffix)) => !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Checks if a class is a generated resource class (`R`, `R$id`,
/// `BuildConfig`).
pub fn is_resource_class(class_name: &str) -> bool {
    let simple = class_name.rsplit('.').next().unwrap_or(class_name);
    simple == "R" || simple.starts_with("R$") || simple == "BuildConfig"
}

/// Hash-tree construction options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeOptions {
    /// Drop compiler-numbered anonymous inner classes before hashing;
    /// dx and javac emit them differently for identical sources
    pub skip_anonymous_classes: bool,
    /// Drop generated resource classes (R, R$*, BuildConfig)
    pub skip_resource_classes: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            skip_anonymous_classes: true,
            skip_resource_classes: true,
        }
    }
}

/// A class together with its extractor-computed content digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassEntry {
    /// Fully-qualified class name, dotted form
    pub name: String,
    pub digest: Digest,
}

/// Assembles a [`HashTree`] from extractor-provided class entries.
///
/// Package digests are the order-independent combination of their class
/// digests; the root digest combines the package digests. Package names
/// never enter any digest, which is what makes the fingerprint survive
/// renaming.
#[derive(Debug, Clone, Default)]
pub struct HashTreeBuilder {
    options: TreeOptions,
}

impl HashTreeBuilder {
    pub fn new(options: TreeOptions) -> Self {
        Self { options }
    }

    pub fn build(&self, config: impl Into<String>, classes: &[ClassEntry]) -> HashTree {
        // group classes by package, unique by name
        let mut by_package: BTreeMap<&str, BTreeMap<&str, Digest>> = BTreeMap::new();
        for entry in classes {
            if self.options.skip_anonymous_classes && is_anonymous_class(&entry.name) {
                continue;
            }
            if self.options.skip_resource_classes && is_resource_class(&entry.name) {
                continue;
            }

            let package = crate::pkg::package_of(&entry.name);
            if package.is_empty() {
                debug!("Skipping class in default package: {}", entry.name);
                continue;
            }

            by_package
                .entry(package)
                .or_default()
                .entry(entry.name.as_str())
                .or_insert(entry.digest);
        }

        let mut package_nodes = Vec::with_capacity(by_package.len());
        for (package, class_digests) in by_package {
            let digest = Digest::combine(class_digests.values());
            let children = class_digests
                .into_iter()
                .map(|(name, digest)| HashTreeNode::class(name, digest))
                .collect();
            package_nodes.push(HashTreeNode::package(package, digest, children));
        }

        let root_digest = Digest::combine(package_nodes.iter().map(|n| &n.digest));
        HashTree {
            config: config.into(),
            root: HashTreeNode::package("", root_digest, package_nodes),
        }
    }
}
