use std::sync::Arc;

use thiserror::Error;

use crate::tree::NodeId;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Tree error types.
///
/// Cloneable so a single failed load can be handed to every caller that
/// joined it.
#[derive(Debug, Clone, Error)]
pub enum TreeError {
    /// I/O errors from the data provider.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// No node is registered under this id.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// The node is a leaf and cannot own children.
    #[error("Node is not composite: {0}")]
    NotComposite(NodeId),

    /// The data provider reported a failure.
    #[error("Failed to resolve children: {0}")]
    Resolve(String),

    /// Neither an explicit root nor a workspace root is available.
    #[error("No workspace root available")]
    NoWorkspaceRoot,

    /// Invalid path provided by the caller.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The tree was disposed and accepts no further loads.
    #[error("Tree has been disposed")]
    Disposed,

    /// Filesystem watcher setup errors.
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Configuration file errors.
    #[error("Config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for TreeError {
    fn from(err: std::io::Error) -> Self {
        TreeError::Io(Arc::new(err))
    }
}

impl From<notify::Error> for TreeError {
    fn from(err: notify::Error) -> Self {
        TreeError::Watcher(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TreeError = io_err.into();
        assert!(matches!(err, TreeError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn cloned_error_keeps_message() {
        let err = TreeError::Resolve("provider offline".into());
        let cloned = err.clone();
        assert_eq!(cloned.to_string(), "Failed to resolve children: provider offline");
    }

    #[test]
    fn node_not_found_display() {
        let err = TreeError::NodeNotFound(NodeId::from_raw(7));
        assert_eq!(err.to_string(), "Node not found: #7");
    }

    #[test]
    fn invalid_path_error_display() {
        let err = TreeError::InvalidPath("/nonexistent".into());
        assert_eq!(err.to_string(), "Invalid path: /nonexistent");
    }
}
