//! Package tree - prefix structure over dotted package names
//!
//! Organizes the classes of an app or library into a package hierarchy and
//! answers the two questions the matcher needs: "is this package present?"
//! and "what is the root package of this namespace?".

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Number of dot-separated segments in a package or class name.
pub fn depth(name: &str) -> usize {
    if name.is_empty() {
        0
    } else {
        name.split('.').count()
    }
}

/// Dotted prefix made of the first `n` segments, or `None` if the name is
/// shorter than `n` segments.
pub fn prefix_of_depth(name: &str, n: usize) -> Option<&str> {
    if n == 0 || depth(name) < n {
        return None;
    }

    match name.match_indices('.').nth(n - 1) {
        Some((idx, _)) => Some(&name[..idx]),
        None => Some(name),
    }
}

/// Package part of a fully-qualified class name ("" for the default package).
pub fn package_of(class_name: &str) -> &str {
    match class_name.rfind('.') {
        Some(idx) => &class_name[..idx],
        None => "",
    }
}

/// Normalize a JVM-internal class name to dotted form.
///
/// `Lcom/example/Foo;` becomes `com.example.Foo`. Names that are already
/// dotted pass through unchanged.
pub fn normalize_class_name(name: &str) -> String {
    let trimmed = name
        .strip_prefix('L')
        .and_then(|n| n.strip_suffix(';'))
        .unwrap_or(name);
    trimmed.replace('/', ".")
}

/// A node in the package hierarchy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    /// Single package segment, e.g. "google" in "com.google.gson"
    pub name: String,
    /// Number of classes declared directly in this package
    pub class_count: usize,
    /// Child packages
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_count: 0,
            children: Vec::new(),
        }
    }

    pub fn has_classes(&self) -> bool {
        self.class_count != 0
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn child_index(&self, name: &str) -> Option<usize> {
        self.children.iter().position(|c| c.name == name)
    }

    /// Number of packages in this subtree, the node itself included.
    fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_size).sum::<usize>()
    }
}

/// Prefix tree over the dotted package names of one class list.
///
/// Built once next to each hash tree and read-only during matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageTree {
    root: Node,
}

impl Default for PackageTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageTree {
    pub fn new() -> Self {
        Self {
            root: Node::new("root"),
        }
    }

    /// Build a tree from fully-qualified class names, skipping classes whose
    /// package is in `excluded`.
    pub fn from_classes<I, S>(classes: I, excluded: &HashSet<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for class_name in classes {
            let package = package_of(class_name.as_ref());
            if excluded.contains(package) {
                continue;
            }
            tree.add_class(class_name.as_ref());
        }
        tree
    }

    /// Insert the package path of one class, counting the class on its
    /// terminal package node. A class in the default package counts on the
    /// synthetic root.
    pub fn add_class(&mut self, class_name: &str) {
        let package = package_of(class_name);
        if package.is_empty() {
            self.root.class_count += 1;
            return;
        }

        let mut current = &mut self.root;
        for segment in package.split('.') {
            let idx = match current.child_index(segment) {
                Some(idx) => idx,
                None => {
                    current.children.push(Node::new(segment));
                    current.children.len() - 1
                }
            };
            current = &mut current.children[idx];
        }
        current.class_count += 1;
    }

    /// Prefix-closure membership test for a dotted package name.
    pub fn contains_package(&self, package: &str) -> bool {
        if package.is_empty() {
            return false;
        }

        let mut current = &self.root;
        for segment in package.split('.') {
            match current.child(segment) {
                Some(node) => current = node,
                None => return false,
            }
        }
        true
    }

    /// True iff some dotted prefix of `package` is a class-bearing package
    /// in this tree. This is the namespace test used for framework
    /// filtering: a tree holding `android.view.View` claims everything
    /// under `android.view`, but not `android.webkit`.
    pub fn matches_namespace(&self, package: &str) -> bool {
        if package.is_empty() {
            return false;
        }

        let mut current = &self.root;
        for segment in package.split('.') {
            match current.child(segment) {
                Some(node) => {
                    current = node;
                    if current.has_classes() {
                        return true;
                    }
                }
                None => return false,
            }
        }
        false
    }

    /// All non-empty packages with their class counts, in name order.
    pub fn packages(&self) -> BTreeMap<String, usize> {
        let mut result = BTreeMap::new();
        Self::collect_packages(&self.root, "", false, &mut result);
        result
    }

    fn collect_packages(node: &Node, path: &str, all: bool, out: &mut BTreeMap<String, usize>) {
        for child in &node.children {
            let full = if path.is_empty() {
                child.name.clone()
            } else {
                format!("{}.{}", path, child.name)
            };
            if all || child.has_classes() {
                out.insert(full.clone(), child.class_count);
            }
            Self::collect_packages(child, &full, all, out);
        }
    }

    /// Total number of classes in the tree.
    pub fn class_count(&self) -> usize {
        self.root.class_count + self.packages().values().sum::<usize>()
    }

    /// Number of packages that declare at least one class.
    pub fn non_empty_packages(&self) -> usize {
        self.packages().len()
    }

    /// Determine the root package of this namespace, or `None` when no
    /// unambiguous root exists.
    ///
    /// Walks down the tree while exactly one child exists, stopping at the
    /// first package that declares classes. When several top-level domains
    /// are present (a bundled dependency, usually), the largest subtree wins.
    /// A depth-1 result that is in `excluded` is rejected - names like "com"
    /// would match half the ecosystem.
    pub fn root_package(&self, excluded: &HashSet<String>) -> Option<String> {
        let mut current = &self.root;
        let mut domains: Vec<&str> = Vec::new();

        let first_excluded = current.children.len() == 1
            && excluded.contains(current.children[0].name.as_str());

        if current.children.len() > 1 || first_excluded {
            if current.children.len() == 1 {
                current = &current.children[0];
                domains.push(&current.name);
            }

            // several sibling namespaces: commit to the largest subtree;
            // a tie means there is no meaningful single root
            let mut largest: Option<&Node> = None;
            let mut largest_size = 0;
            let mut tied = false;
            for child in &current.children {
                let size = child.subtree_size();
                if size > largest_size {
                    largest = Some(child);
                    largest_size = size;
                    tied = false;
                } else if size == largest_size {
                    tied = true;
                }
            }
            if tied {
                return None;
            }
            current = largest?;
            domains.push(&current.name);

            if current.has_classes() {
                return Some(domains.join("."));
            }
        }

        while current.children.len() == 1 {
            current = &current.children[0];
            domains.push(&current.name);
            if current.has_classes() {
                break;
            }
        }

        if domains.len() == 1 && excluded.contains(domains[0]) {
            return None;
        }

        if domains.is_empty() {
            None
        } else {
            Some(domains.join("."))
        }
    }
}
