//! Media collections: the backend tree model, the persisted cache, and
//! the library node that answers queries over the bus.
//!
//! A collection tree is an ordered forest of named inner nodes and
//! leaves; a leaf resolves to one media object. The path of a leaf is the
//! `/`-joined sequence of its ancestor names. Child names are unique
//! within a parent — adding a child under an existing name replaces it in
//! place.

pub mod cache;
pub mod library;
pub mod store;

pub use cache::DbCache;
pub use library::LibraryNode;
pub use store::Store;

use crate::error::Result;
use crate::media::MediaRef;
use crate::query::Constraint;

/// A searchable source of media.
pub trait Collection: Send {
    /// Brings the collection up to date if it considers itself stale.
    fn refresh(&self) -> Result<()>;

    /// Media matching `constraint`, at most `limit` when positive.
    fn find_media(&self, constraint: &Constraint, limit: usize) -> Result<Vec<MediaRef>>;
}

/// A slower backend hierarchy a cache can mirror: a tree of media plus
/// the backend's own refresh operation.
pub trait MediaTree: Send {
    /// Runs the backend's own refresh (e.g. re-enumerating a remote).
    fn update(&mut self) -> Result<()>;

    /// The root of the current tree. The root's name is empty.
    fn root(&self) -> &TreeNode;
}

/// An entry in a collection tree.
pub enum TreeEntry {
    Node(TreeNode),
    Leaf(TreeLeaf),
}

impl TreeEntry {
    pub fn name(&self) -> &str {
        match self {
            TreeEntry::Node(n) => &n.name,
            TreeEntry::Leaf(l) => &l.name,
        }
    }
}

/// A terminal entry resolving to one media object.
pub struct TreeLeaf {
    name: String,
    media: MediaRef,
}

impl TreeLeaf {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The media object for this leaf.
    pub fn media(&self) -> MediaRef {
        self.media.clone()
    }
}

/// An inner node with named children, in insertion order.
pub struct TreeNode {
    name: String,
    children: Vec<TreeEntry>,
}

impl TreeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// A root node (empty name).
    pub fn root() -> Self {
        Self::new("")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[TreeEntry] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Adds a child entry. A child with the same name is replaced in
    /// place, keeping its position.
    pub fn add(&mut self, entry: TreeEntry) {
        match self.children.iter().position(|c| c.name() == entry.name()) {
            Some(i) => self.children[i] = entry,
            None => self.children.push(entry),
        }
    }

    /// Adds an inner node child.
    pub fn add_node(&mut self, node: TreeNode) {
        self.add(TreeEntry::Node(node));
    }

    /// Adds a leaf child resolving to `media`.
    pub fn add_leaf(&mut self, name: impl Into<String>, media: MediaRef) {
        self.add(TreeEntry::Leaf(TreeLeaf {
            name: name.into(),
            media,
        }));
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.children.iter().find(|c| c.name() == name)
    }

    /// Finds a child node for in-place extension.
    pub fn get_node_mut(&mut self, name: &str) -> Option<&mut TreeNode> {
        self.children.iter_mut().find_map(|c| match c {
            TreeEntry::Node(n) if n.name == name => Some(n),
            _ => None,
        })
    }

    /// Resolves a `/`-joined path relative to this node down to a leaf.
    pub fn resolve(&self, path: &str) -> Option<&TreeLeaf> {
        let mut node = self;
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        while let Some(component) = components.next() {
            match node.get(component)? {
                TreeEntry::Leaf(leaf) => {
                    return if components.peek().is_none() {
                        Some(leaf)
                    } else {
                        None
                    };
                }
                TreeEntry::Node(child) => node = child,
            }
        }
        None
    }

    /// Visits every leaf under this node with its full logical path
    /// (leading `/`, components joined by `/`).
    pub fn for_each_leaf(
        &self,
        f: &mut dyn FnMut(&str, &TreeLeaf) -> Result<()>,
    ) -> Result<()> {
        fn walk(
            node: &TreeNode,
            prefix: &str,
            f: &mut dyn FnMut(&str, &TreeLeaf) -> Result<()>,
        ) -> Result<()> {
            for child in &node.children {
                match child {
                    TreeEntry::Leaf(leaf) => {
                        let path = format!("{prefix}/{}", leaf.name);
                        f(&path, leaf)?;
                    }
                    TreeEntry::Node(sub) => {
                        let path = format!("{prefix}/{}", sub.name);
                        walk(sub, &path, f)?;
                    }
                }
            }
            Ok(())
        }
        walk(self, "", f)
    }
}

/// A purely in-memory backend tree. Its own refresh is a no-op: the tree
/// holds whatever was built into it.
pub struct MemoryTree {
    root: TreeNode,
}

impl MemoryTree {
    pub fn new(root: TreeNode) -> Self {
        Self { root }
    }

    pub fn root_mut(&mut self) -> &mut TreeNode {
        &mut self.root
    }
}

impl MediaTree for MemoryTree {
    fn update(&mut self) -> Result<()> {
        Ok(())
    }

    fn root(&self) -> &TreeNode {
        &self.root
    }
}
