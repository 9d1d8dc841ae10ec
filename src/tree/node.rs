use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Stable identity of a node within one `Tree`.
///
/// Ids come from a per-tree monotonic counter and are never reused, even
/// after the node they named has been evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lazy-loading state of a composite node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
}

/// Child bookkeeping carried only by composite nodes.
#[derive(Debug, Clone, Default)]
pub struct Branch {
    /// Child ids in sort order. Empty until the first successful load.
    pub children: Vec<NodeId>,
    pub load_state: LoadState,
    /// Whether the view shows this node's children.
    pub expanded: bool,
}

/// A node in the tree arena.
///
/// Plain data: parent and children are ids into the owning tree's registry,
/// and a node without a `branch` is a leaf.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: NodeId,
    /// Display label and sort key.
    pub name: String,
    /// Domain address the resolver uses to fetch children.
    pub path: Option<PathBuf>,
    pub parent: Option<NodeId>,
    pub branch: Option<Branch>,
}

impl TreeNode {
    pub fn is_composite(&self) -> bool {
        self.branch.is_some()
    }

    pub fn children(&self) -> &[NodeId] {
        self.branch
            .as_ref()
            .map(|b| b.children.as_slice())
            .unwrap_or(&[])
    }

    /// Load state; leaves always report `Loaded` since they have nothing to fetch.
    pub fn load_state(&self) -> LoadState {
        self.branch
            .as_ref()
            .map(|b| b.load_state)
            .unwrap_or(LoadState::Loaded)
    }

    pub fn is_expanded(&self) -> bool {
        self.branch.as_ref().is_some_and(|b| b.expanded)
    }
}

/// Description of a node to register, handed to `Tree::create_node`.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub name: String,
    pub path: Option<PathBuf>,
    pub parent: Option<NodeId>,
    pub composite: bool,
}

impl NewNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            parent: None,
            composite: false,
        }
    }

    pub fn composite(name: impl Into<String>) -> Self {
        Self {
            composite: true,
            ..Self::leaf(name)
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }
}
