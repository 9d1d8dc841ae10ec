//! Configuration for the `ftree` binary: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--sort`, `--all`, `--depth`, etc.)
//! 2. Explicit `--config` file
//! 3. `$FTREE_CONFIG` environment variable (path to config file)
//! 4. Project-local `.ftree.toml` in the current working directory
//! 5. Global `~/.config/ftree/config.toml`
//! 6. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Result, TreeError};
use crate::fs::watcher::{DEFAULT_DEBOUNCE_MS, DEFAULT_FLOOD_THRESHOLD, DEFAULT_IGNORE_PATTERNS};
use crate::tree::{SortMode, SortOptions};

// ── Section configs ──────────────────────────────────────────────────────────

/// General settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Starting directory (overridden by CLI positional arg).
    pub default_path: Option<String>,
}

/// Tree ordering and loading settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TreeConfig {
    /// Sort order: "name" or "natural".
    pub sort_by: Option<String>,
    /// Directories always listed first.
    pub dirs_first: Option<bool>,
    /// Include dot-files in listings.
    pub show_hidden: Option<bool>,
    /// How many directory levels to expand on startup.
    pub expand_depth: Option<usize>,
}

/// Filesystem watcher settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WatcherConfig {
    /// Enable filesystem watcher for `--watch`.
    pub enabled: Option<bool>,
    /// Debounce interval in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Events per debounce window above which a full root refresh is issued.
    pub flood_threshold: Option<usize>,
    /// Path components to ignore.
    pub ignore: Option<Vec<String>>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub tree: TreeConfig,
    pub watcher: WatcherConfig,
}

/// Default number of directory levels expanded on startup.
pub const DEFAULT_EXPAND_DEPTH: usize = 1;

// ── Config file locator ──────────────────────────────────────────────────────

/// Return the list of candidate config file paths in priority order.
///
/// Does NOT include the CLI `--config` path; that is handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("FTREE_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".ftree.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("ftree").join("config.toml"));
    }

    paths
}

/// Read and parse a TOML config file.
fn parse_file(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| TreeError::Config(format!("{}: {}", path.display(), e)))?;
    toml::from_str::<AppConfig>(&content)
        .map_err(|e| TreeError::Config(format!("{}: {}", path.display(), e)))
}

/// Try to load a candidate config file. Returns `None` if the file
/// doesn't exist or can't be parsed (with a warning logged).
fn load_file(path: &Path) -> Option<AppConfig> {
    if !path.exists() {
        return None;
    }
    match parse_file(path) {
        Ok(cfg) => {
            debug!(path = %path.display(), "loaded config file");
            Some(cfg)
        }
        Err(e) => {
            warn!(error = %e, "ignoring config file");
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                default_path: other
                    .general
                    .default_path
                    .clone()
                    .or(self.general.default_path),
            },
            tree: TreeConfig {
                sort_by: other.tree.sort_by.clone().or(self.tree.sort_by),
                dirs_first: other.tree.dirs_first.or(self.tree.dirs_first),
                show_hidden: other.tree.show_hidden.or(self.tree.show_hidden),
                expand_depth: other.tree.expand_depth.or(self.tree.expand_depth),
            },
            watcher: WatcherConfig {
                enabled: other.watcher.enabled.or(self.watcher.enabled),
                debounce_ms: other.watcher.debounce_ms.or(self.watcher.debounce_ms),
                flood_threshold: other
                    .watcher
                    .flood_threshold
                    .or(self.watcher.flood_threshold),
                ignore: other.watcher.ignore.clone().or(self.watcher.ignore),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`; unlike
    /// the candidate files, it must exist and parse.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> Result<AppConfig> {
        let mut config = AppConfig::default();

        // Walk in reverse so that highest-priority (env var) overwrites lower.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            config = config.merge(&parse_file(cli_path)?);
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        Ok(config)
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    /// Sort mode name: "name" or "natural".
    pub fn sort_by(&self) -> &str {
        self.tree.sort_by.as_deref().unwrap_or("natural")
    }

    /// Whether directories are listed before files.
    pub fn dirs_first(&self) -> bool {
        self.tree.dirs_first.unwrap_or(true)
    }

    pub fn sort_options(&self) -> SortOptions {
        SortOptions {
            mode: SortMode::from_str(self.sort_by()),
            dirs_first: self.dirs_first(),
        }
    }

    /// Whether to show hidden files.
    pub fn show_hidden(&self) -> bool {
        self.tree.show_hidden.unwrap_or(false)
    }

    pub fn expand_depth(&self) -> usize {
        self.tree.expand_depth.unwrap_or(DEFAULT_EXPAND_DEPTH)
    }

    /// Whether the watcher is enabled.
    pub fn watcher_enabled(&self) -> bool {
        self.watcher.enabled.unwrap_or(true)
    }

    /// Watcher debounce interval in milliseconds.
    pub fn debounce_ms(&self) -> u64 {
        self.watcher.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms())
    }

    pub fn flood_threshold(&self) -> usize {
        self.watcher.flood_threshold.unwrap_or(DEFAULT_FLOOD_THRESHOLD)
    }

    /// Ignored path components; the built-in list unless configured.
    pub fn ignore_patterns(&self) -> Vec<String> {
        match &self.watcher.ignore {
            Some(patterns) => patterns.clone(),
            None => DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.sort_by(), "natural");
        assert_eq!(cfg.dirs_first(), true);
        assert_eq!(cfg.show_hidden(), false);
        assert_eq!(cfg.expand_depth(), 1);
        assert_eq!(cfg.watcher_enabled(), true);
        assert_eq!(cfg.debounce_ms(), 300);
        assert_eq!(cfg.flood_threshold(), 100);
        assert!(cfg.ignore_patterns().contains(&".git".to_string()));
        assert_eq!(cfg.sort_options().mode, SortMode::Natural);
    }

    #[test]
    fn test_toml_parsing_full() {
        let toml = r#"
[general]
default_path = "/srv/data"

[tree]
sort_by = "name"
dirs_first = false
show_hidden = true
expand_depth = 3

[watcher]
enabled = false
debounce_ms = 500
flood_threshold = 20
ignore = ["build"]
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(cfg.general.default_path.as_deref(), Some("/srv/data"));
        assert_eq!(
            cfg.sort_options(),
            SortOptions {
                mode: SortMode::Name,
                dirs_first: false
            }
        );
        assert_eq!(cfg.show_hidden(), true);
        assert_eq!(cfg.expand_depth(), 3);
        assert_eq!(cfg.watcher_enabled(), false);
        assert_eq!(cfg.debounce(), Duration::from_millis(500));
        assert_eq!(cfg.flood_threshold(), 20);
        assert_eq!(cfg.ignore_patterns(), vec!["build".to_string()]);
    }

    #[test]
    fn test_toml_parsing_partial() {
        let toml = r#"
[tree]
show_hidden = true
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(cfg.show_hidden(), true);
        // Everything else should be defaults
        assert_eq!(cfg.dirs_first(), true);
        assert_eq!(cfg.debounce_ms(), 300);
    }

    #[test]
    fn test_unknown_sort_falls_back_to_name() {
        let cfg: AppConfig = toml::from_str("[tree]\nsort_by = \"size\"").expect("parse");
        assert_eq!(cfg.sort_options().mode, SortMode::Name);
    }

    #[test]
    fn test_merge_overrides() {
        let base = AppConfig {
            tree: TreeConfig {
                show_hidden: Some(false),
                dirs_first: Some(false),
                ..Default::default()
            },
            ..Default::default()
        };

        let over = AppConfig {
            tree: TreeConfig {
                show_hidden: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = base.merge(&over);
        assert_eq!(merged.show_hidden(), true); // overridden
        assert_eq!(merged.dirs_first(), false); // from base
    }

    #[test]
    fn test_merge_none_does_not_clear_some() {
        let base = AppConfig {
            watcher: WatcherConfig {
                enabled: Some(false),
                debounce_ms: Some(500),
                ignore: Some(vec!["dist".to_string()]),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = base.merge(&AppConfig::default());
        assert_eq!(merged.watcher_enabled(), false);
        assert_eq!(merged.debounce_ms(), 500);
        assert_eq!(merged.ignore_patterns(), vec!["dist".to_string()]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("test-config.toml");
        let mut f = std::fs::File::create(&cfg_path).expect("create");
        writeln!(
            f,
            r#"
[tree]
sort_by = "name"
expand_depth = 2
"#
        )
        .expect("write");

        let cfg = load_file(&cfg_path).expect("load");
        assert_eq!(cfg.sort_by(), "name");
        assert_eq!(cfg.expand_depth(), 2);
        assert_eq!(cfg.flood_threshold(), 100);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_file(Path::new("/nonexistent/config.toml")).is_none());
    }

    #[test]
    fn test_load_invalid_toml_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("bad.toml");
        std::fs::write(&cfg_path, "this is { not valid toml").expect("write");
        assert!(load_file(&cfg_path).is_none());
    }

    #[test]
    fn test_explicit_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("bad.toml");
        std::fs::write(&cfg_path, "[tree\nsort_by =").expect("write");
        assert!(matches!(
            AppConfig::load(Some(&cfg_path), None),
            Err(TreeError::Config(_))
        ));
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/ftree.toml")), None);
        assert!(matches!(result, Err(TreeError::Config(_))));
    }

    #[test]
    fn test_load_with_cli_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("config.toml");
        std::fs::write(
            &cfg_path,
            r#"
[tree]
show_hidden = true
expand_depth = 2
"#,
        )
        .expect("write");

        let cli_overrides = AppConfig {
            tree: TreeConfig {
                expand_depth: Some(5),
                ..Default::default()
            },
            ..Default::default()
        };

        let cfg = AppConfig::load(Some(&cfg_path), Some(&cli_overrides)).expect("load");
        // CLI override wins
        assert_eq!(cfg.expand_depth(), 5);
        // File value preserved (not overridden by CLI)
        assert_eq!(cfg.show_hidden(), true);
    }
}
