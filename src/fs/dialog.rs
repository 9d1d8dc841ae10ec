use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, info};

use super::api::{FileStat, FileTreeApi, WorkspaceService};
use crate::error::{Result, TreeError};
use crate::tree::{LoadState, NewNode, NodeId, ResolveChildren, SortMode, SortOptions, Tree, TreeNode};

/// A directory tree for pickers and dialogs, rooted at a workspace folder.
///
/// Wraps a `Tree` whose children come from a `FileTreeApi`. Node ids are
/// cached by path so that re-resolving a directory, or renaming an entry
/// through `re_cache_node`, keeps existing node identities (and with them
/// the view's selection and expansion state).
///
/// Symlinks can make two paths name the same file; each path gets its own
/// node.
pub struct FileTreeDialog {
    tree: Arc<Tree>,
    service: Arc<DialogService>,
}

struct DialogService {
    api: Arc<dyn FileTreeApi>,
    workspace: Arc<dyn WorkspaceService>,
    sort: Mutex<SortOptions>,
    state: Mutex<DialogState>,
}

#[derive(Default)]
struct DialogState {
    workspace_root: Option<FileStat>,
    cache: HashMap<PathBuf, NodeId>,
}

impl FileTreeDialog {
    /// Dialog tree with natural, directories-first ordering.
    pub fn new(api: Arc<dyn FileTreeApi>, workspace: Arc<dyn WorkspaceService>) -> Self {
        Self::with_sort(
            api,
            workspace,
            SortOptions {
                mode: SortMode::Natural,
                dirs_first: true,
            },
        )
    }

    pub fn with_sort(
        api: Arc<dyn FileTreeApi>,
        workspace: Arc<dyn WorkspaceService>,
        sort: SortOptions,
    ) -> Self {
        let service = Arc::new(DialogService {
            api,
            workspace,
            sort: Mutex::new(sort),
            state: Mutex::new(DialogState::default()),
        });
        let tree = Tree::new(service.clone());
        Self { tree, service }
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    /// Record `path` (plain path or `file://` URI) as the workspace root.
    ///
    /// Returns `None` and leaves the current root alone if nothing exists there.
    pub async fn resolve_workspace_root(&self, path: &str) -> Result<Option<FileStat>> {
        let root_path = parse_root_path(path)?;
        let stat = self.service.api.resolve_file_stat(&root_path).await?;
        if let Some(stat) = &stat {
            info!(root = %stat.path.display(), "workspace root resolved");
            self.service.lock_state().workspace_root = Some(stat.clone());
        }
        Ok(stat)
    }

    pub fn workspace_root(&self) -> Option<FileStat> {
        self.service.lock_state().workspace_root.clone()
    }

    /// Resolve the root node, expand it and wait for its children.
    pub async fn load_root(&self) -> Result<NodeId> {
        self.tree.resolve_children(None).await?;
        let root = self.tree.root().ok_or(TreeError::NoWorkspaceRoot)?;
        self.tree.expand(root).await?;
        Ok(root)
    }

    /// Re-root the tree at `path` without changing the workspace root.
    pub async fn resolve_root(&self, path: &str) -> Result<Option<Vec<NodeId>>> {
        let root_path = parse_root_path(path)?;
        let Some(stat) = self.service.api.resolve_file_stat(&root_path).await? else {
            return Ok(None);
        };
        if !stat.is_directory {
            return Err(TreeError::InvalidPath(format!("{} is not a directory", root_path.display())));
        }
        let ids = self.service.materialize(&self.tree, None, vec![stat])?;
        self.tree.set_root(ids.first().copied())?;
        self.service.sweep_evicted(&self.tree);
        Ok(Some(ids))
    }

    /// The workspace root path followed by its ancestors, stopping before `/`.
    pub fn directory_list(&self) -> Vec<String> {
        let mut directories = Vec::new();
        if self.tree.root().is_none() {
            return directories;
        }
        let Some(root) = self.workspace_root() else {
            return directories;
        };
        let top = Path::new("/");
        if root.path == top {
            directories.push(top.to_string_lossy().to_string());
            return directories;
        }
        for ancestor in root.path.ancestors() {
            if ancestor == top || ancestor.as_os_str().is_empty() {
                break;
            }
            directories.push(ancestor.to_string_lossy().to_string());
        }
        directories
    }

    /// Cached node for `path`, if any and still registered in the tree.
    pub fn cached_node(&self, path: &Path) -> Option<NodeId> {
        self.service.cached(&self.tree, path)
    }

    pub fn cache_len(&self) -> usize {
        self.service.lock_state().cache.len()
    }

    /// Forget the cached node for `path`, e.g. after it was deleted.
    pub fn remove_node_cache_by_path(&self, path: &Path) -> Option<NodeId> {
        let removed = self.service.lock_state().cache.remove(path);
        debug!(path = %path.display(), removed = removed.is_some(), "cache entry removed");
        removed
    }

    /// Associate an existing node with `path`, e.g. after it was renamed.
    ///
    /// The next resolution that lists `path` reuses `node` instead of
    /// creating a new one.
    pub fn re_cache_node(&self, node: NodeId, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(node = %node, path = %path.display(), "node re-cached");
        self.service.lock_state().cache.insert(path, node);
    }

    pub fn sort_options(&self) -> SortOptions {
        *self.service.lock_sort()
    }

    /// Change the ordering and re-sort every loaded directory.
    pub fn set_sort_options(&self, sort: SortOptions) {
        *self.service.lock_sort() = sort;
        self.tree.sort_all_children();
    }

    /// Re-synchronize after external changes to `paths`.
    ///
    /// Paths that no longer exist drop out of the cache. Every loaded
    /// directory containing a changed path is refreshed once.
    pub async fn handle_fs_change(&self, paths: Vec<PathBuf>) -> Result<()> {
        let root = self.tree.root();
        let root_path = root.and_then(|id| self.tree.node(id)).and_then(|n| n.path);
        let mut targets: Vec<NodeId> = Vec::new();

        for path in paths {
            if self.service.api.resolve_file_stat(&path).await?.is_none() {
                self.remove_node_cache_by_path(&path);
            }
            let target = if root_path.as_deref() == Some(path.as_path()) {
                root
            } else {
                path.parent().and_then(|parent| self.cached_node(parent))
            };
            if let Some(id) = target {
                if self.tree.load_state(id) == Some(LoadState::Loaded) && !targets.contains(&id) {
                    targets.push(id);
                }
            }
        }

        debug!(directories = targets.len(), "refreshing after filesystem change");
        let refreshed = try_join_all(targets.into_iter().map(|id| self.tree.refresh(id))).await;
        self.service.sweep_evicted(&self.tree);
        refreshed.map(|_| ())
    }

    /// Clear the path cache and dispose the tree.
    pub fn dispose(&self) {
        self.tree.dispose();
    }
}

impl DialogService {
    fn lock_state(&self) -> MutexGuard<'_, DialogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_sort(&self) -> MutexGuard<'_, SortOptions> {
        self.sort.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached(&self, tree: &Tree, path: &Path) -> Option<NodeId> {
        let id = self.lock_state().cache.get(path).copied()?;
        tree.contains(id).then_some(id)
    }

    async fn workspace_root(&self) -> Result<FileStat> {
        let configured = self.lock_state().workspace_root.clone();
        if let Some(root) = configured {
            return Ok(root);
        }
        let root = self
            .workspace
            .roots()
            .await?
            .into_iter()
            .next()
            .ok_or(TreeError::NoWorkspaceRoot)?;
        self.lock_state().workspace_root = Some(root.clone());
        Ok(root)
    }

    /// Turn stats into node ids, reusing cached nodes of the same kind.
    fn materialize(&self, tree: &Tree, parent: Option<NodeId>, stats: Vec<FileStat>) -> Result<Vec<NodeId>> {
        let mut ids = Vec::with_capacity(stats.len());
        for stat in stats {
            let reused = self.cached(tree, &stat.path).filter(|id| {
                tree.node(*id)
                    .is_some_and(|n| n.is_composite() == stat.is_directory)
            });
            let id = match reused {
                Some(id) => {
                    tree.update_node(id, stat.name.clone(), Some(stat.path.clone()))?;
                    id
                }
                None => {
                    let spec = if stat.is_directory {
                        NewNode::composite(stat.name.clone())
                    } else {
                        NewNode::leaf(stat.name.clone())
                    };
                    let spec = spec.with_path(stat.path.clone());
                    let spec = match parent {
                        Some(p) => spec.with_parent(p),
                        None => spec,
                    };
                    tree.create_node(spec)?
                }
            };
            self.lock_state().cache.insert(stat.path, id);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Drop cache entries whose node is no longer registered in the tree.
    fn sweep_evicted(&self, tree: &Tree) {
        let mut state = self.lock_state();
        let before = state.cache.len();
        state.cache.retain(|_, id| tree.contains(*id));
        let swept = before - state.cache.len();
        if swept > 0 {
            debug!(swept, "dropped cache entries of evicted nodes");
        }
    }

    /// Drop cache entries directly under `dir` that the latest listing no longer has.
    fn prune_missing(&self, dir: &Path, listed: &HashSet<PathBuf>) {
        let mut state = self.lock_state();
        let before = state.cache.len();
        state
            .cache
            .retain(|path, _| path.parent() != Some(dir) || listed.contains(path));
        let pruned = before - state.cache.len();
        if pruned > 0 {
            debug!(dir = %dir.display(), pruned, "pruned stale cache entries");
        }
    }
}

#[async_trait]
impl ResolveChildren for DialogService {
    async fn resolve_children(
        &self,
        tree: &Arc<Tree>,
        parent: Option<NodeId>,
    ) -> Result<Option<Vec<NodeId>>> {
        let Some(parent) = parent else {
            let root = self.workspace_root().await?;
            let ids = self.materialize(tree, None, vec![root])?;
            tree.set_root(ids.first().copied())?;
            return Ok(Some(ids));
        };

        let Some(path) = tree.node(parent).and_then(|n| n.path) else {
            return Ok(Some(Vec::new()));
        };
        // Subtrees evicted by earlier loads leave their ids behind.
        self.sweep_evicted(tree);
        let stats = self.api.resolve_children(&path).await?;
        let listed: HashSet<PathBuf> = stats.iter().map(|s| s.path.clone()).collect();
        let ids = self.materialize(tree, Some(parent), stats)?;
        self.prune_missing(&path, &listed);
        Ok(Some(ids))
    }

    fn sort_comparator(&self, a: &TreeNode, b: &TreeNode) -> Ordering {
        self.lock_sort().compare(a, b)
    }

    fn dispose(&self) {
        self.lock_state().cache.clear();
    }
}

/// Accept either a plain path or a `file://` URI.
fn parse_root_path(path: &str) -> Result<PathBuf> {
    let path = path.strip_prefix("file://").unwrap_or(path);
    if path.is_empty() {
        return Err(TreeError::InvalidPath("empty root path".into()));
    }
    Ok(PathBuf::from(path))
}
