use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;

/// What the data provider knows about one filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub path: PathBuf,
    pub name: String,
    /// True for directories and for symlinks that point at one.
    pub is_directory: bool,
    pub is_symlink: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileStat {
    /// Build a stat from `symlink_metadata` plus whether the target is a directory.
    pub fn from_metadata(path: &Path, metadata: &Metadata, is_directory: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            name: display_name(path),
            is_directory,
            is_symlink: metadata.is_symlink(),
            size: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }

    /// A stat carrying only a path and a kind, for providers without metadata.
    pub fn new(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        let path = path.into();
        Self {
            name: display_name(&path),
            path,
            is_directory,
            is_symlink: false,
            size: 0,
            modified: None,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// External data provider the dialog tree resolves children through.
#[async_trait]
pub trait FileTreeApi: Send + Sync {
    /// Stat `path`; `None` if nothing exists there.
    async fn resolve_file_stat(&self, path: &Path) -> Result<Option<FileStat>>;

    /// Immediate children of the directory at `path`, in any order.
    async fn resolve_children(&self, path: &Path) -> Result<Vec<FileStat>>;
}

/// Source of workspace roots, used when no explicit root was configured.
#[async_trait]
pub trait WorkspaceService: Send + Sync {
    async fn roots(&self) -> Result<Vec<FileStat>>;
}

/// `FileTreeApi` backed by the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalFileTreeApi {
    show_hidden: bool,
}

impl LocalFileTreeApi {
    pub fn new(show_hidden: bool) -> Self {
        Self { show_hidden }
    }
}

#[async_trait]
impl FileTreeApi for LocalFileTreeApi {
    async fn resolve_file_stat(&self, path: &Path) -> Result<Option<FileStat>> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let is_directory = if metadata.is_symlink() {
            // Broken links count as plain entries.
            tokio::fs::metadata(path)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false)
        } else {
            metadata.is_dir()
        };
        Ok(Some(FileStat::from_metadata(path, &metadata, is_directory)))
    }

    /// Permission-denied entries are skipped; hidden entries unless enabled.
    async fn resolve_children(&self, path: &Path) -> Result<Vec<FileStat>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut children = Vec::new();

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(e)) => e,
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "stopped reading directory");
                    break;
                }
            };
            match self.resolve_file_stat(&entry.path()).await {
                Ok(Some(stat)) if self.show_hidden || !stat.is_hidden() => children.push(stat),
                Ok(_) => {}
                Err(e) => debug!(path = %entry.path().display(), error = %e, "skipping entry"),
            }
        }

        Ok(children)
    }
}

/// Workspace made of a fixed list of local directories.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    roots: Vec<PathBuf>,
    api: LocalFileTreeApi,
}

impl LocalWorkspace {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            api: LocalFileTreeApi::new(true),
        }
    }
}

#[async_trait]
impl WorkspaceService for LocalWorkspace {
    /// Stats of the configured roots; missing ones are dropped.
    async fn roots(&self) -> Result<Vec<FileStat>> {
        let mut stats = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            if let Some(stat) = self.api.resolve_file_stat(root).await? {
                stats.push(stat);
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn setup_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("alpha")).unwrap();
        fs::create_dir(dir.path().join("beta")).unwrap();
        File::create(dir.path().join("file_a.txt")).unwrap();
        File::create(dir.path().join("file_b.rs")).unwrap();
        File::create(dir.path().join(".hidden")).unwrap();
        File::create(dir.path().join("alpha").join("inner.txt")).unwrap();
        dir
    }

    fn names(stats: &[FileStat]) -> Vec<String> {
        let mut names: Vec<String> = stats.iter().map(|s| s.name.clone()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn stat_file_and_directory() {
        let dir = setup_test_dir();
        let api = LocalFileTreeApi::default();

        let file = api
            .resolve_file_stat(&dir.path().join("file_a.txt"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.name, "file_a.txt");
        assert!(!file.is_directory);

        let alpha = api
            .resolve_file_stat(&dir.path().join("alpha"))
            .await
            .unwrap()
            .unwrap();
        assert!(alpha.is_directory);
    }

    #[tokio::test]
    async fn stat_missing_path_is_none() {
        let dir = setup_test_dir();
        let api = LocalFileTreeApi::default();
        let stat = api
            .resolve_file_stat(&dir.path().join("nonexistent.txt"))
            .await
            .unwrap();
        assert!(stat.is_none());
    }

    #[tokio::test]
    async fn children_skip_hidden_by_default() {
        let dir = setup_test_dir();
        let api = LocalFileTreeApi::default();
        let children = api.resolve_children(dir.path()).await.unwrap();
        assert_eq!(names(&children), vec!["alpha", "beta", "file_a.txt", "file_b.rs"]);
    }

    #[tokio::test]
    async fn children_include_hidden_when_enabled() {
        let dir = setup_test_dir();
        let api = LocalFileTreeApi::new(true);
        let children = api.resolve_children(dir.path()).await.unwrap();
        assert!(names(&children).contains(&".hidden".to_string()));
    }

    #[tokio::test]
    async fn children_of_missing_directory_fail() {
        let dir = setup_test_dir();
        let api = LocalFileTreeApi::default();
        assert!(api.resolve_children(&dir.path().join("gone")).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_to_directory_is_directory() {
        let dir = setup_test_dir();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(dir.path().join("alpha"), &link).unwrap();
        let api = LocalFileTreeApi::default();
        let stat = api.resolve_file_stat(&link).await.unwrap().unwrap();
        assert!(stat.is_symlink);
        assert!(stat.is_directory);
    }

    #[tokio::test]
    async fn local_workspace_drops_missing_roots() {
        let dir = setup_test_dir();
        let workspace = LocalWorkspace::new(vec![dir.path().join("missing"), dir.path().to_path_buf()]);
        let roots = workspace.roots().await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].path, dir.path());
    }
}
