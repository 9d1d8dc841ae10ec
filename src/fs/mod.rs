//! Filesystem side of the tree: data provider, dialog tree and watcher.

pub mod api;
pub mod dialog;
pub mod watcher;

pub use api::{FileStat, FileTreeApi, LocalFileTreeApi, LocalWorkspace, WorkspaceService};
pub use dialog::FileTreeDialog;
pub use watcher::FsWatcher;
