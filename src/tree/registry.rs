use std::collections::{HashMap, HashSet};

use super::node::{Branch, NewNode, NodeId, TreeNode};

/// Arena of every node in one tree, indexed by id.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<NodeId, TreeNode>,
    next_id: u64,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new node and return its freshly allocated id.
    ///
    /// The node is not added to its parent's child list; that happens when
    /// the parent's load installs it.
    pub fn insert(&mut self, spec: NewNode) -> NodeId {
        self.next_id += 1;
        let id = NodeId::from_raw(self.next_id);
        let branch = spec.composite.then(Branch::default);
        self.nodes.insert(
            id,
            TreeNode {
                id,
                name: spec.name,
                path: spec.path,
                parent: spec.parent,
                branch,
            },
        );
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of ancestors above `id`.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes.get(&parent).and_then(|n| n.parent);
            // Guard against a corrupted parent chain.
            if depth > self.nodes.len() {
                break;
            }
        }
        depth
    }

    /// Drop `id` from its parent's child list, if it has a parent.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent) else {
            return;
        };
        if let Some(branch) = self.nodes.get_mut(&parent).and_then(|p| p.branch.as_mut()) {
            branch.children.retain(|c| *c != id);
        }
    }

    /// Remove `id` and all of its descendants.
    ///
    /// Nodes in `keep` survive together with their own subtrees. Returns the
    /// ids that were removed.
    pub fn remove_subtree(&mut self, id: NodeId, keep: &HashSet<NodeId>) -> Vec<NodeId> {
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if keep.contains(&current) {
                continue;
            }
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children().iter().copied());
                removed.push(current);
            }
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }
}
