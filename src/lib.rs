//! Lazy-loading, incrementally cached composite tree model.
//!
//! [`Tree`] owns a registry of nodes whose children are resolved on demand
//! through a [`ResolveChildren`] strategy, with concurrent requests for the
//! same node joined onto one load. [`FileTreeDialog`] specializes it for
//! directory pickers backed by a [`FileTreeApi`].

pub mod config;
pub mod error;
pub mod event;
pub mod fs;
pub mod tree;

pub use error::{Result, TreeError};
pub use event::{EventEmitter, EventStream, TreeEvent};
pub use fs::{FileStat, FileTreeApi, FileTreeDialog, FsWatcher, LocalFileTreeApi, LocalWorkspace, WorkspaceService};
pub use tree::{FlatItem, LoadState, NewNode, NodeId, ResolveChildren, SortMode, SortOptions, Tree, TreeNode};
