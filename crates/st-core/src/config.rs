//! Configuration structures for synaptree.
//!
//! The configuration document is a JSON object with one section per concern:
//!
//! - [`ColorConfig`] - Node colors (root, directories, files by extension)
//! - [`GeneralConfig`] - Ignore patterns and the auto-focus toggle
//! - [`ScanConfig`] - Concurrency budget and symlink policy for full scans
//! - [`ProcessorConfig`] - Debounce, chunking, and watchdog timings
//! - [`WatchConfig`] - File watcher and status refresh settings
//! - [`Config`] - Root document combining all sections
//!
//! Every section is `#[serde(default)]`, so a partial document only overrides
//! what it names. Scanning and node creation never read [`Config`] directly;
//! they consume the immutable [`WorkspaceConfig`] snapshot derived from it.

use std::collections::BTreeMap;
use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::hash::{FxHashMap, fx_hash_map_with_capacity};
use crate::ignore::IgnoreMatcher;

/// Default color for directories below the root.
pub const DEFAULT_DIRECTORY_COLOR: &str = "#0088ff";

/// Default color for the root node.
pub const DEFAULT_ROOT_COLOR: &str = "#ffffff";

/// Default color for files without an extension mapping.
pub const DEFAULT_FILE_COLOR: &str = "#aaaaaa";

/// A single `{extension, color}` entry in list form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionColor {
    /// Extension, with or without the leading dot.
    pub extension: String,
    /// Display color.
    pub color: String,
}

/// Extension-to-color mapping as it appears in the configuration document.
///
/// Both the list form and the object form are accepted:
///
/// ```
/// use st_core::ExtensionColors;
///
/// let list: ExtensionColors =
///     serde_json::from_str(r##"[{"extension": ".ts", "color": "#3178c6"}]"##).unwrap();
/// let map: ExtensionColors = serde_json::from_str(r##"{".ts": "#3178c6"}"##).unwrap();
/// assert_eq!(list.normalized(), map.normalized());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionColors {
    /// `[{"extension": ".ts", "color": "#3178c6"}]`
    List(Vec<ExtensionColor>),
    /// `{".ts": "#3178c6"}`
    Map(BTreeMap<String, String>),
}

impl Default for ExtensionColors {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl ExtensionColors {
    /// Flattens either form into a map keyed by normalized extension.
    ///
    /// Entries with an empty extension or color are dropped. Later entries
    /// win when two keys normalize to the same extension.
    #[must_use]
    pub fn normalized(&self) -> FxHashMap<String, String> {
        let pairs: Vec<(&str, &str)> = match self {
            Self::List(items) => items
                .iter()
                .map(|item| (item.extension.as_str(), item.color.as_str()))
                .collect(),
            Self::Map(map) => map.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
        };

        let mut out = fx_hash_map_with_capacity(pairs.len());
        for (ext, color) in pairs {
            let key = normalize_extension(ext);
            if key.is_empty() || color.is_empty() {
                continue;
            }
            out.insert(key, color.to_owned());
        }
        out
    }
}

/// Lowercases an extension and strips one leading dot.
///
/// Both the configured keys and looked-up extensions go through this, so
/// `".TS"`, `"ts"` and `".ts"` all address the same entry.
#[must_use]
pub fn normalize_extension(ext: &str) -> String {
    ext.strip_prefix('.').unwrap_or(ext).to_lowercase()
}

/// Node colors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColorConfig {
    /// Color of the root node.
    pub root: String,
    /// Color of every directory below the root.
    pub directory: String,
    /// Color of files whose extension has no mapping.
    pub default_file: String,
    /// Per-extension file colors.
    pub extensions: ExtensionColors,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT_COLOR.to_owned(),
            directory: DEFAULT_DIRECTORY_COLOR.to_owned(),
            default_file: DEFAULT_FILE_COLOR.to_owned(),
            extensions: ExtensionColors::default(),
        }
    }
}

/// General behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneralConfig {
    /// Basename patterns excluded from the graph (`*` is the only wildcard).
    pub ignore_patterns: Vec<String>,

    /// Emit focus hints for newly created entries and the active editor.
    pub auto_focus: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: vec!["node_modules".to_owned(), ".git".to_owned()],
            auto_focus: true,
        }
    }
}

/// Configuration for full scans.
///
/// # Examples
///
/// ```
/// use st_core::ScanConfig;
///
/// let config = ScanConfig::default();
/// assert_eq!(config.max_concurrent_ops, 50);
/// assert!(!config.follow_links);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanConfig {
    /// Maximum filesystem operations (stat/readdir) in flight at once.
    pub max_concurrent_ops: usize,

    /// Follow symbolic links into their targets.
    pub follow_links: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent_ops: 50,
            follow_links: false,
        }
    }
}

/// Timings and limits of the change processor.
///
/// # Examples
///
/// ```
/// use st_core::ProcessorConfig;
/// use std::time::Duration;
///
/// let config = ProcessorConfig::default();
/// assert_eq!(config.debounce(), Duration::from_millis(100));
/// assert_eq!(config.chunk_size, 50);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessorConfig {
    /// Quiet period after the last queued event before a drain starts.
    pub debounce_ms: u64,

    /// Maximum events taken from the queue per drain chunk.
    pub chunk_size: usize,

    /// Maximum node lookups in flight while resolving creations.
    pub create_concurrency: usize,

    /// Pause between consecutive chunks when the queue is still non-empty.
    pub redrain_delay_ms: u64,

    /// Period of the stall watchdog.
    pub watchdog_interval_ms: u64,

    /// Time without drain progress after which the drain counts as stalled.
    pub stall_threshold_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            chunk_size: 50,
            create_concurrency: 5,
            redrain_delay_ms: 10,
            watchdog_interval_ms: 5_000,
            stall_threshold_ms: 15_000,
        }
    }
}

impl ProcessorConfig {
    /// Debounce window.
    #[inline]
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Delay before the next chunk.
    #[inline]
    #[must_use]
    pub const fn redrain_delay(&self) -> Duration {
        Duration::from_millis(self.redrain_delay_ms)
    }

    /// Watchdog period.
    #[inline]
    #[must_use]
    pub const fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    /// Stall threshold.
    #[inline]
    #[must_use]
    pub const fn stall_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_threshold_ms)
    }
}

/// Configuration for the file watcher.
///
/// # Examples
///
/// ```
/// use st_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert!(config.enabled);
/// assert!(config.recursive);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchConfig {
    /// Whether live updates are enabled at all.
    pub enabled: bool,

    /// Whether to watch subdirectories recursively.
    pub recursive: bool,

    /// Minimum spacing between repository status refreshes.
    pub status_refresh_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recursive: true,
            status_refresh_ms: 300,
        }
    }
}

impl WatchConfig {
    /// Status refresh period.
    #[inline]
    #[must_use]
    pub const fn status_refresh(&self) -> Duration {
        Duration::from_millis(self.status_refresh_ms)
    }
}

/// Root configuration document.
///
/// # Examples
///
/// ```
/// use st_core::Config;
///
/// let config = Config::from_json_str(r#"{"general": {"autoFocus": false}}"#).unwrap();
/// assert!(!config.general.auto_focus);
/// assert_eq!(config.scan.max_concurrent_ops, 50);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node colors.
    pub colors: ColorConfig,

    /// Ignore patterns and focus behavior.
    pub general: GeneralConfig,

    /// Full scan settings.
    pub scan: ScanConfig,

    /// Change processor settings.
    pub processor: ProcessorConfig,

    /// Watcher settings.
    pub watch: WatchConfig,
}

impl Config {
    /// Parses and validates a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a JSON configuration file.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Rejects values that would stall scanning or draining.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("scan.maxConcurrentOps", self.scan.max_concurrent_ops),
            ("processor.chunkSize", self.processor.chunk_size),
            ("processor.createConcurrency", self.processor.create_concurrency),
        ];
        for (option, value) in positive {
            if value == 0 {
                return Err(ConfigError::invalid_option(option, "must be at least 1"));
            }
        }

        let periods = [
            ("processor.watchdogIntervalMs", self.processor.watchdog_interval_ms),
            ("watch.statusRefreshMs", self.watch.status_refresh_ms),
        ];
        for (option, value) in periods {
            if value == 0 {
                return Err(ConfigError::invalid_option(option, "must be at least 1"));
            }
        }

        Ok(())
    }

    /// Resolves the immutable snapshot used by scanning and node creation.
    pub fn workspace_config(&self) -> Result<WorkspaceConfig, ConfigError> {
        WorkspaceConfig::from_config(self)
    }
}

/// Immutable display snapshot consumed by scanning and node creation.
///
/// Built once per scan or per batch of creations and shared read-only
/// (typically behind an `Arc`) across concurrent traversal tasks.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    dir_color: String,
    root_color: String,
    default_file_color: String,
    extension_map: FxHashMap<String, String>,
    ignore: IgnoreMatcher,
}

impl WorkspaceConfig {
    /// Builds the snapshot from a configuration document.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            dir_color: config.colors.directory.clone(),
            root_color: config.colors.root.clone(),
            default_file_color: config.colors.default_file.clone(),
            extension_map: config.colors.extensions.normalized(),
            ignore: IgnoreMatcher::new(&config.general.ignore_patterns)?,
        })
    }

    /// Replaces the ignore matcher.
    #[must_use]
    pub fn with_ignore(mut self, ignore: IgnoreMatcher) -> Self {
        self.ignore = ignore;
        self
    }

    /// Adds or replaces one extension color.
    #[must_use]
    pub fn with_extension_color(mut self, extension: &str, color: &str) -> Self {
        self.extension_map
            .insert(normalize_extension(extension), color.to_owned());
        self
    }

    /// Color for directories below the root.
    #[inline]
    #[must_use]
    pub fn dir_color(&self) -> &str {
        &self.dir_color
    }

    /// Color for the root node.
    #[inline]
    #[must_use]
    pub fn root_color(&self) -> &str {
        &self.root_color
    }

    /// Fallback file color.
    #[inline]
    #[must_use]
    pub fn default_file_color(&self) -> &str {
        &self.default_file_color
    }

    /// Normalized extension map.
    #[inline]
    #[must_use]
    pub fn extension_map(&self) -> &FxHashMap<String, String> {
        &self.extension_map
    }

    /// The compiled ignore patterns.
    #[inline]
    #[must_use]
    pub fn ignore(&self) -> &IgnoreMatcher {
        &self.ignore
    }

    /// Returns `true` if an entry with this basename is excluded.
    #[inline]
    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.is_ignored(name)
    }

    /// Resolves the color of a file from its basename.
    ///
    /// Dotfiles such as `.gitignore` have no extension and get the default.
    #[must_use]
    pub fn file_color(&self, name: &str) -> &str {
        Utf8Path::new(name)
            .extension()
            .and_then(|ext| self.extension_map.get(&normalize_extension(ext)))
            .map_or(self.default_file_color.as_str(), String::as_str)
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        let config = Config::default();
        Self {
            dir_color: config.colors.directory,
            root_color: config.colors.root,
            default_file_color: config.colors.default_file,
            extension_map: config.colors.extensions.normalized(),
            ignore: IgnoreMatcher::new(&config.general.ignore_patterns).unwrap_or_default(),
        }
    }
}
