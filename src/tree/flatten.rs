use std::path::PathBuf;

use serde::Serialize;

use super::base::Tree;
use super::node::{LoadState, NodeId};
use super::registry::NodeRegistry;

/// A flattened representation of a tree node for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct FlatItem {
    pub id: NodeId,
    pub name: String,
    pub path: Option<PathBuf>,
    pub depth: usize,
    pub is_composite: bool,
    pub is_expanded: bool,
    pub is_last_sibling: bool,
    pub load_state: LoadState,
}

impl Tree {
    /// Depth-first list of the rows a view would show: the root, then the
    /// children of every expanded node, in sort order.
    ///
    /// Children of an expanded node that is still loading are simply absent.
    pub fn flatten(&self) -> Vec<FlatItem> {
        let state = self.lock();
        let mut items = Vec::new();
        if let Some(root) = state.root {
            flatten_node(&state.registry, root, 0, true, &mut items);
        }
        items
    }

    /// The slice of `flatten` starting at `offset`, at most `len` rows long.
    pub fn visible_window(&self, offset: usize, len: usize) -> Vec<FlatItem> {
        self.flatten().into_iter().skip(offset).take(len).collect()
    }

    /// Row index of `id` in the flattened view, if visible.
    pub fn find_index(&self, id: NodeId) -> Option<usize> {
        self.flatten().iter().position(|item| item.id == id)
    }
}

fn flatten_node(
    registry: &NodeRegistry,
    id: NodeId,
    depth: usize,
    is_last: bool,
    items: &mut Vec<FlatItem>,
) {
    let Some(node) = registry.get(id) else {
        return;
    };

    items.push(FlatItem {
        id,
        name: node.name.clone(),
        path: node.path.clone(),
        depth,
        is_composite: node.is_composite(),
        is_expanded: node.is_expanded(),
        is_last_sibling: is_last,
        load_state: node.load_state(),
    });

    if node.is_expanded() {
        let children = node.children();
        for (i, child) in children.iter().enumerate() {
            let is_last_child = i == children.len() - 1;
            flatten_node(registry, *child, depth + 1, is_last_child, items);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::error::Result;
    use crate::tree::{NewNode, ResolveChildren};

    /// Every composite `dN` has children `d{N+1}` (composite) and `fN.txt`.
    struct Ladder;

    #[async_trait]
    impl ResolveChildren for Ladder {
        async fn resolve_children(
            &self,
            tree: &Arc<Tree>,
            parent: Option<NodeId>,
        ) -> Result<Option<Vec<NodeId>>> {
            let Some(parent) = parent else {
                return Ok(None);
            };
            let name = tree.node(parent).map(|n| n.name).unwrap_or_default();
            let level: usize = name.trim_start_matches('d').parse().unwrap_or(0);
            let dir = tree.create_node(NewNode::composite(format!("d{}", level + 1)).with_parent(parent))?;
            let file = tree.create_node(NewNode::leaf(format!("f{level}.txt")).with_parent(parent))?;
            Ok(Some(vec![file, dir]))
        }
    }

    async fn ladder() -> (Arc<Tree>, NodeId) {
        let tree = Tree::new(Arc::new(Ladder));
        let root = tree.create_node(NewNode::composite("d0")).unwrap();
        tree.set_root(Some(root)).unwrap();
        tree.expand(root).await.unwrap();
        (tree, root)
    }

    #[tokio::test]
    async fn flatten_shows_expanded_children_only() {
        let (tree, _root) = ladder().await;
        let names: Vec<String> = tree.flatten().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["d0", "d1", "f0.txt"]);
    }

    #[tokio::test]
    async fn flatten_tracks_depth_and_last_sibling() {
        let (tree, root) = ladder().await;
        let d1 = tree.children(root)[0];
        tree.expand(d1).await.unwrap();

        let items = tree.flatten();
        let by_name: HashMap<&str, &FlatItem> =
            items.iter().map(|i| (i.name.as_str(), i)).collect();
        assert_eq!(by_name["d0"].depth, 0);
        assert_eq!(by_name["d2"].depth, 2);
        assert!(by_name["f0.txt"].is_last_sibling);
        assert!(!by_name["d1"].is_last_sibling);
        assert_eq!(items.len(), 5);
    }

    #[tokio::test]
    async fn collapse_hides_children_but_keeps_them_loaded() {
        let (tree, root) = ladder().await;
        tree.collapse(root).unwrap();
        assert_eq!(tree.flatten().len(), 1);
        assert_eq!(tree.children(root).len(), 2);
    }

    #[tokio::test]
    async fn visible_window_slices_rows() {
        let (tree, root) = ladder().await;
        let d1 = tree.children(root)[0];
        tree.expand(d1).await.unwrap();

        let window: Vec<String> = tree
            .visible_window(1, 2)
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(window, vec!["d1", "d2"]);
        assert_eq!(tree.find_index(d1), Some(1));
    }

    #[test]
    fn flatten_without_root_is_empty() {
        let tree = Tree::new(Arc::new(Ladder));
        assert!(tree.flatten().is_empty());
    }
}
