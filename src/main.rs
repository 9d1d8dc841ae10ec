use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use lazy_file_tree::config::{AppConfig, GeneralConfig, TreeConfig};
use lazy_file_tree::error::{Result, TreeError};
use lazy_file_tree::fs::{FileTreeDialog, FsWatcher, LocalFileTreeApi, LocalWorkspace};
use lazy_file_tree::tree::{FlatItem, LoadState, NodeId, Tree};

const DEFAULT_LOG_FILTER: &str = "lazy_file_tree=info,ftree=info";
const VERBOSE_LOG_FILTER: &str = "lazy_file_tree=debug,ftree=debug";

/// Print a lazily loaded directory tree.
#[derive(Parser, Debug)]
#[command(name = "ftree", version, about)]
struct Cli {
    /// Root path to display (defaults to the configured path, then the current directory)
    path: Option<PathBuf>,

    /// Directory levels to expand
    #[arg(short, long)]
    depth: Option<usize>,

    /// Include hidden entries
    #[arg(short, long)]
    all: bool,

    /// Sibling ordering
    #[arg(long, value_parser = ["name", "natural"])]
    sort: Option<String>,

    /// List files before directories
    #[arg(long)]
    files_first: bool,

    /// Print the flattened view as JSON
    #[arg(long)]
    json: bool,

    /// Keep running and reprint after filesystem changes
    #[arg(short, long)]
    watch: bool,

    /// Explicit config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Partial config holding only the flags that were given.
    fn overrides(&self) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                default_path: self.path.as_ref().map(|p| p.to_string_lossy().to_string()),
            },
            tree: TreeConfig {
                sort_by: self.sort.clone(),
                dirs_first: self.files_first.then_some(false),
                show_hidden: self.all.then_some(true),
                expand_depth: self.depth,
            },
            ..Default::default()
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_env("FTREE_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()))?;

    let requested = PathBuf::from(config.general.default_path.as_deref().unwrap_or("."));
    let path = requested.canonicalize().map_err(|_| {
        TreeError::InvalidPath(format!("{} does not exist", requested.display()))
    })?;

    let dialog = FileTreeDialog::with_sort(
        Arc::new(LocalFileTreeApi::new(config.show_hidden())),
        Arc::new(LocalWorkspace::new(vec![path.clone()])),
        config.sort_options(),
    );

    let root_stat = dialog
        .resolve_workspace_root(&path.to_string_lossy())
        .await?
        .ok_or(TreeError::NoWorkspaceRoot)?;
    if !root_stat.is_directory {
        return Err(TreeError::InvalidPath(format!(
            "{} is not a directory",
            path.display()
        )));
    }

    let tree = dialog.tree().clone();
    let root = dialog.load_root().await?;
    expand_to_depth(&tree, root, config.expand_depth()).await?;
    print_view(&tree, cli.json)?;

    if cli.watch {
        if config.watcher_enabled() {
            watch(&dialog, &root_stat.path, &config, cli.json).await?;
        } else {
            warn!("--watch given but the watcher is disabled in config");
        }
    }

    dialog.dispose();
    Ok(())
}

/// Expand every directory down to `depth` levels below the root, one level
/// at a time with all directories of a level loading concurrently.
async fn expand_to_depth(tree: &Arc<Tree>, root: NodeId, depth: usize) -> Result<()> {
    if depth == 0 {
        return tree.collapse(root);
    }

    let mut frontier = vec![root];
    for _ in 1..depth {
        let dirs: Vec<NodeId> = frontier
            .iter()
            .flat_map(|id| tree.children(*id))
            .filter(|id| tree.node(*id).is_some_and(|n| n.is_composite()))
            .collect();
        if dirs.is_empty() {
            break;
        }

        let results = join_all(dirs.iter().map(|id| tree.expand(*id))).await;
        for (id, result) in dirs.iter().zip(results) {
            if let Err(e) = result {
                warn!(node = %id, error = %e, "failed to expand directory");
            }
        }
        frontier = dirs;
    }
    Ok(())
}

/// Re-synchronize from watcher batches until Ctrl-C, reprinting whenever a
/// directory was refreshed.
async fn watch(
    dialog: &FileTreeDialog,
    root: &std::path::Path,
    config: &AppConfig,
    json: bool,
) -> Result<()> {
    let (change_tx, mut change_rx) = mpsc::unbounded_channel();
    let _watcher = FsWatcher::new(
        root,
        config.debounce(),
        config.ignore_patterns(),
        config.flood_threshold(),
        change_tx,
    )?;
    let mut events = dialog.tree().subscribe();
    info!(root = %root.display(), "watching for changes");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            batch = change_rx.recv() => {
                let Some(paths) = batch else { break };
                if let Err(e) = dialog.handle_fs_change(paths).await {
                    warn!(error = %e, "failed to apply filesystem change");
                }
                let mut refreshed = false;
                while let Some(event) = events.try_next() {
                    debug!(?event, "tree event");
                    refreshed = true;
                }
                if refreshed {
                    print_view(dialog.tree(), json)?;
                }
            }
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }
    }
    Ok(())
}

fn print_view(tree: &Tree, json: bool) -> Result<()> {
    let items = tree.flatten();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &items).map_err(io::Error::from)?;
        writeln!(out)?;
    } else {
        render_text(&items, &mut out)?;
    }
    out.flush()?;
    Ok(())
}

fn render_text(items: &[FlatItem], out: &mut impl Write) -> io::Result<()> {
    // Whether each ancestor on the current path was the last of its siblings.
    let mut lasts: Vec<bool> = Vec::new();

    for item in items {
        lasts.truncate(item.depth);
        let mut line = String::new();
        if item.depth > 0 {
            for last in lasts.iter().skip(1) {
                line.push_str(if *last { "    " } else { "│   " });
            }
            line.push_str(if item.is_last_sibling { "└── " } else { "├── " });
        }
        line.push_str(&item.name);
        if item.is_composite {
            line.push('/');
        }
        if item.load_state == LoadState::Loading {
            line.push_str(" (loading)");
        }
        writeln!(out, "{line}")?;
        lasts.push(item.is_last_sibling);
    }
    Ok(())
}
