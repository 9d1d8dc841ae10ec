use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;

/// Default patterns to ignore when watching the filesystem.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    "target",
];

/// Default debounce interval in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Default flood threshold (events per debounce window).
pub const DEFAULT_FLOOD_THRESHOLD: usize = 100;

/// Watches a root directory and forwards batches of changed paths.
///
/// Batches are meant for `FileTreeDialog::handle_fs_change`.
pub struct FsWatcher {
    /// Handle to the debouncer (dropped to stop watching).
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
}

impl FsWatcher {
    /// Create a new FsWatcher that watches `root` recursively.
    ///
    /// Events are debounced by `debounce_duration` and sent via `change_tx`.
    /// Paths matching any of `ignore_patterns` are silently dropped.
    /// If more than `flood_threshold` events arrive in a single debounce window,
    /// they are collapsed into a single batch holding only `root`.
    pub fn new(
        root: &Path,
        debounce_duration: Duration,
        ignore_patterns: Vec<String>,
        flood_threshold: usize,
        change_tx: mpsc::UnboundedSender<Vec<PathBuf>>,
    ) -> Result<Self> {
        let root_path = root.to_path_buf();

        let mut debouncer = new_debouncer(
            debounce_duration,
            move |result: std::result::Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                match result {
                    Ok(events) => {
                        let paths = events
                            .iter()
                            .filter(|e| e.kind == DebouncedEventKind::Any)
                            .map(|e| e.path.clone())
                            .collect();
                        if let Some(batch) =
                            collapse_batch(paths, &root_path, &ignore_patterns, flood_threshold)
                        {
                            debug!(paths = batch.len(), "filesystem change batch");
                            let _ = change_tx.send(batch);
                        }
                    }
                    Err(e) => warn!(error = %e, "watcher error"),
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(root, notify::RecursiveMode::Recursive)?;

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

/// Filter one debounce window of paths into the batch to forward.
///
/// Returns `None` when nothing is left after filtering, and `[root]` when the
/// window exceeds `flood_threshold`.
pub fn collapse_batch(
    paths: Vec<PathBuf>,
    root: &Path,
    ignore_patterns: &[String],
    flood_threshold: usize,
) -> Option<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = paths
        .into_iter()
        .filter(|p| !should_ignore(p, ignore_patterns))
        .collect();
    paths.dedup();

    if paths.is_empty() {
        return None;
    }
    if paths.len() > flood_threshold {
        return Some(vec![root.to_path_buf()]);
    }
    Some(paths)
}

/// Check if a path should be ignored based on ignore patterns.
///
/// A path is ignored if any of its components match any ignore pattern exactly.
pub fn should_ignore(path: &Path, patterns: &[String]) -> bool {
    for component in path.components() {
        if let std::path::Component::Normal(name) = component {
            let name_str = name.to_string_lossy();
            for pattern in patterns {
                if name_str == *pattern {
                    return true;
                }
            }
        }
    }
    false
}
