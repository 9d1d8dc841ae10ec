use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use super::node::{LoadState, NewNode, NodeId, TreeNode};
use super::registry::NodeRegistry;
use super::sort::default_sort_comparator;
use crate::error::{Result, TreeError};
use crate::event::{EventEmitter, EventStream, TreeEvent};

/// An in-flight child resolution that any number of callers can await.
type PendingLoad = Shared<BoxFuture<'static, Result<Vec<NodeId>>>>;

/// Data source plugged into a `Tree`.
///
/// `resolve_children` registers (or reuses) nodes through the tree's
/// registry methods and returns their ids unsorted. `None` means the parent
/// has no children. A `None` parent asks for the root.
///
/// The tree never calls `resolve_children` twice concurrently for the same
/// parent; calls for different parents may overlap.
#[async_trait]
pub trait ResolveChildren: Send + Sync {
    async fn resolve_children(
        &self,
        tree: &Arc<Tree>,
        parent: Option<NodeId>,
    ) -> Result<Option<Vec<NodeId>>>;

    /// Ordering applied to siblings after every load.
    fn sort_comparator(&self, a: &TreeNode, b: &TreeNode) -> Ordering {
        default_sort_comparator(a, b)
    }

    /// Release secondary caches. Called once from `Tree::dispose`.
    fn dispose(&self) {}
}

pub(super) struct TreeState {
    pub(super) registry: NodeRegistry,
    pub(super) root: Option<NodeId>,
    pending: HashMap<NodeId, PendingLoad>,
    disposed: bool,
}

enum LoadStep {
    Ready(Vec<NodeId>),
    Join(PendingLoad),
    Started(PendingLoad),
}

/// Lazily resolved composite tree.
///
/// Nodes live in an arena keyed by `NodeId`; parent and child links are ids.
/// Children of a composite node are fetched on first `ensure_loaded` and at
/// most one fetch per node is ever in flight: concurrent callers share it.
///
/// Loads are spawned onto the current Tokio runtime so they run to completion
/// even if every caller stops waiting.
pub struct Tree {
    state: Mutex<TreeState>,
    resolver: Arc<dyn ResolveChildren>,
    events: EventEmitter,
}

impl Tree {
    pub fn new(resolver: Arc<dyn ResolveChildren>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TreeState {
                registry: NodeRegistry::new(),
                root: None,
                pending: HashMap::new(),
                disposed: false,
            }),
            resolver,
            events: EventEmitter::new(),
        })
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to `Changed` and `NodeRefreshed` notifications.
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.lock().root
    }

    /// Replace the root and start loading it in the background.
    ///
    /// Assigning the current root again is a no-op apart from making sure it
    /// is loaded. Replacing the root with a different node evicts the old
    /// root's subtree, keeping the new root and its descendants.
    pub fn set_root(self: &Arc<Self>, root: Option<NodeId>) -> Result<()> {
        let (changed, started) = {
            let mut state = self.lock();
            if state.disposed {
                return Err(TreeError::Disposed);
            }
            if let Some(id) = root {
                let node = state.registry.get(id).ok_or(TreeError::NodeNotFound(id))?;
                if !node.is_composite() {
                    return Err(TreeError::NotComposite(id));
                }
            }

            let previous = state.root;
            let changed = previous != root;
            state.root = root;

            if let Some(id) = root {
                state.registry.detach(id);
                if let Some(node) = state.registry.get_mut(id) {
                    node.parent = None;
                }
            }
            if let (Some(old), true) = (previous, changed) {
                let keep: HashSet<NodeId> = root.into_iter().collect();
                let removed = state.registry.remove_subtree(old, &keep);
                for id in &removed {
                    state.pending.remove(id);
                }
                debug!(old_root = %old, evicted = removed.len(), "root replaced");
            }

            let started = match root {
                Some(id) => match self.begin_load(&mut state, id, false)? {
                    LoadStep::Started(load) => Some(load),
                    LoadStep::Ready(_) | LoadStep::Join(_) => None,
                },
                None => None,
            };
            (changed, started)
        };

        if changed {
            self.fire_changed();
        }
        if let Some(load) = started {
            Self::drive(load);
        }
        Ok(())
    }

    /// Ask the data source for the children of `parent` directly.
    ///
    /// Bypasses the load-state guard; expansion should go through
    /// `ensure_loaded` instead.
    pub async fn resolve_children(
        self: &Arc<Self>,
        parent: Option<NodeId>,
    ) -> Result<Option<Vec<NodeId>>> {
        if self.is_disposed() {
            return Err(TreeError::Disposed);
        }
        self.resolver.resolve_children(self, parent).await
    }

    /// Load the children of `id` unless they are already loaded.
    ///
    /// Joins the pending load if one is in flight. Returns the installed,
    /// sorted child ids.
    pub async fn ensure_loaded(self: &Arc<Self>, id: NodeId) -> Result<Vec<NodeId>> {
        self.load(id, false).await
    }

    /// Re-resolve the children of `id` even if they are already loaded.
    pub async fn refresh(self: &Arc<Self>, id: NodeId) -> Result<Vec<NodeId>> {
        self.load(id, true).await
    }

    /// Mark `id` expanded and make sure its children are loaded.
    pub async fn expand(self: &Arc<Self>, id: NodeId) -> Result<Vec<NodeId>> {
        self.set_expanded(id, true)?;
        self.ensure_loaded(id).await
    }

    /// Mark `id` collapsed. An in-flight load for it keeps running.
    pub fn collapse(&self, id: NodeId) -> Result<()> {
        self.set_expanded(id, false)
    }

    fn set_expanded(&self, id: NodeId, expanded: bool) -> Result<()> {
        let mut state = self.lock();
        let node = state
            .registry
            .get_mut(id)
            .ok_or(TreeError::NodeNotFound(id))?;
        let branch = node.branch.as_mut().ok_or(TreeError::NotComposite(id))?;
        branch.expanded = expanded;
        Ok(())
    }

    async fn load(self: &Arc<Self>, id: NodeId, force: bool) -> Result<Vec<NodeId>> {
        let step = {
            let mut state = self.lock();
            self.begin_load(&mut state, id, force)?
        };
        match step {
            LoadStep::Ready(children) => Ok(children),
            LoadStep::Join(load) => load.await,
            LoadStep::Started(load) => {
                Self::drive(load.clone());
                load.await
            }
        }
    }

    fn begin_load(
        self: &Arc<Self>,
        state: &mut TreeState,
        id: NodeId,
        force: bool,
    ) -> Result<LoadStep> {
        if state.disposed {
            return Err(TreeError::Disposed);
        }
        let node = state
            .registry
            .get_mut(id)
            .ok_or(TreeError::NodeNotFound(id))?;
        let branch = node.branch.as_mut().ok_or(TreeError::NotComposite(id))?;

        match branch.load_state {
            LoadState::Loading => {
                if let Some(pending) = state.pending.get(&id) {
                    return Ok(LoadStep::Join(pending.clone()));
                }
            }
            LoadState::Loaded if !force => {
                return Ok(LoadStep::Ready(branch.children.clone()));
            }
            _ => {}
        }

        branch.load_state = LoadState::Loading;
        let tree = Arc::clone(self);
        let load = async move { tree.run_load(id).await }.boxed().shared();
        state.pending.insert(id, load.clone());
        Ok(LoadStep::Started(load))
    }

    /// Run `load` to completion on the ambient runtime regardless of who awaits it.
    fn drive(load: PendingLoad) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(load);
            }
            Err(_) => debug!("no tokio runtime; load runs when awaited"),
        }
    }

    async fn run_load(self: Arc<Self>, id: NodeId) -> Result<Vec<NodeId>> {
        debug!(node = %id, "resolving children");
        let resolved = self.resolver.resolve_children(&self, Some(id)).await;

        let outcome = {
            let mut state = self.lock();
            state.pending.remove(&id);
            match resolved {
                Ok(children) => self.install_children(&mut state, id, children.unwrap_or_default()),
                Err(err) => {
                    if let Some(branch) = state.registry.get_mut(id).and_then(|n| n.branch.as_mut()) {
                        branch.load_state = LoadState::Unloaded;
                    }
                    Err(err)
                }
            }
        };

        match &outcome {
            Ok(children) => {
                debug!(node = %id, children = children.len(), "children installed");
                self.events.fire(TreeEvent::NodeRefreshed(id));
            }
            Err(err) => warn!(node = %id, error = %err, "failed to resolve children"),
        }
        outcome
    }

    fn install_children(
        &self,
        state: &mut TreeState,
        id: NodeId,
        children: Vec<NodeId>,
    ) -> Result<Vec<NodeId>> {
        if !state.registry.contains(id) {
            // Evicted while loading: drop whatever was created for it.
            let keep = HashSet::new();
            for child in children {
                if state.registry.get(child).and_then(|n| n.parent) == Some(id) {
                    state.registry.remove_subtree(child, &keep);
                }
            }
            return Err(TreeError::NodeNotFound(id));
        }

        let mut seen = HashSet::new();
        let mut fresh: Vec<NodeId> = children
            .into_iter()
            .filter(|child| {
                state.registry.contains(*child)
                    && !is_ancestor_or_self(&state.registry, *child, id)
                    && seen.insert(*child)
            })
            .collect();

        let registry = &state.registry;
        let resolver = &self.resolver;
        fresh.sort_by(|a, b| match (registry.get(*a), registry.get(*b)) {
            (Some(a), Some(b)) => resolver.sort_comparator(a, b),
            _ => Ordering::Equal,
        });

        for child in &fresh {
            let old_parent = state.registry.get(*child).and_then(|n| n.parent);
            if old_parent.is_some() && old_parent != Some(id) {
                state.registry.detach(*child);
            }
            if let Some(node) = state.registry.get_mut(*child) {
                node.parent = Some(id);
            }
        }

        let previous = state
            .registry
            .get(id)
            .map(|n| n.children().to_vec())
            .unwrap_or_default();
        let keep: HashSet<NodeId> = fresh.iter().copied().collect();
        let mut evicted = 0;
        for old in previous.into_iter().filter(|c| !keep.contains(c)) {
            for removed in state.registry.remove_subtree(old, &keep) {
                state.pending.remove(&removed);
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(node = %id, evicted, "evicted stale children");
        }

        let branch = state
            .registry
            .get_mut(id)
            .and_then(|n| n.branch.as_mut())
            .ok_or(TreeError::NotComposite(id))?;
        branch.children = fresh.clone();
        branch.load_state = LoadState::Loaded;
        Ok(fresh)
    }

    /// Re-apply the comparator to every loaded composite.
    pub fn sort_all_children(&self) {
        {
            let mut state = self.lock();
            let ids: Vec<NodeId> = state
                .registry
                .iter()
                .filter(|n| n.children().len() > 1)
                .map(|n| n.id)
                .collect();
            for id in ids {
                let mut children = state
                    .registry
                    .get(id)
                    .map(|n| n.children().to_vec())
                    .unwrap_or_default();
                let registry = &state.registry;
                children.sort_by(|a, b| match (registry.get(*a), registry.get(*b)) {
                    (Some(a), Some(b)) => self.resolver.sort_comparator(a, b),
                    _ => Ordering::Equal,
                });
                if let Some(branch) = state.registry.get_mut(id).and_then(|n| n.branch.as_mut()) {
                    branch.children = children;
                }
            }
        }
        self.fire_changed();
    }

    pub fn sort_comparator(&self, a: &TreeNode, b: &TreeNode) -> Ordering {
        self.resolver.sort_comparator(a, b)
    }

    // ── Registry access ─────────────────────────────────────────────────────

    /// Register a node. It joins its parent's children on the parent's next load.
    pub fn create_node(&self, spec: NewNode) -> Result<NodeId> {
        let mut state = self.lock();
        if let Some(parent) = spec.parent {
            if !state.registry.contains(parent) {
                return Err(TreeError::NodeNotFound(parent));
            }
        }
        Ok(state.registry.insert(spec))
    }

    /// Rename / re-address a node in place, keeping its identity.
    pub fn update_node(&self, id: NodeId, name: impl Into<String>, path: Option<PathBuf>) -> Result<()> {
        let mut state = self.lock();
        let node = state
            .registry
            .get_mut(id)
            .ok_or(TreeError::NodeNotFound(id))?;
        node.name = name.into();
        node.path = path;
        Ok(())
    }

    /// Remove a node and its descendants from the tree.
    pub fn remove_node(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let (removed, was_root) = {
            let mut state = self.lock();
            if !state.registry.contains(id) {
                return Err(TreeError::NodeNotFound(id));
            }
            state.registry.detach(id);
            let removed = state.registry.remove_subtree(id, &HashSet::new());
            for r in &removed {
                state.pending.remove(r);
            }
            let was_root = state.root == Some(id);
            if was_root {
                state.root = None;
            }
            (removed, was_root)
        };
        if was_root {
            self.fire_changed();
        }
        Ok(removed)
    }

    /// Snapshot of a node.
    pub fn node(&self, id: NodeId) -> Option<TreeNode> {
        self.lock().registry.get(id).cloned()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.lock()
            .registry
            .get(id)
            .map(|n| n.children().to_vec())
            .unwrap_or_default()
    }

    pub fn load_state(&self, id: NodeId) -> Option<LoadState> {
        self.lock().registry.get(id).map(TreeNode::load_state)
    }

    pub fn depth(&self, id: NodeId) -> Option<usize> {
        let state = self.lock();
        state.registry.contains(id).then(|| state.registry.depth(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.lock().registry.contains(id)
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.lock().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().registry.is_empty()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    pub fn fire_changed(&self) {
        self.events.fire(TreeEvent::Changed);
    }

    /// Release all subscriptions and the data source's caches.
    ///
    /// Nodes stay readable; further loads fail with `TreeError::Disposed`.
    pub fn dispose(&self) {
        {
            let mut state = self.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
        }
        self.events.dispose();
        self.resolver.dispose();
        debug!("tree disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }
}

fn is_ancestor_or_self(registry: &NodeRegistry, candidate: NodeId, id: NodeId) -> bool {
    let mut current = Some(id);
    let mut steps = 0;
    while let Some(node) = current {
        if node == candidate {
            return true;
        }
        current = registry.get(node).and_then(|n| n.parent);
        steps += 1;
        if steps > registry.len() {
            break;
        }
    }
    false
}
