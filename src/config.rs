//! Configuration management for opencup using the prefer crate.
//!
//! Precedence, lowest first: built-in defaults, the discovered config file,
//! `OPENCUP_*` environment variables (a `.env` file is loaded by `main`), and
//! command-line flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ingest::SourceLayout;
use crate::store::{EngineOptions, StorePaths};

/// Default engine memory budget in megabytes.
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 4096;

/// Default bind address for `serve`.
pub const DEFAULT_BIND: &str = "127.0.0.1:3030";

/// Data directory subfolder name under the platform data dir.
const DATA_SUBDIR: &str = "opencup";

/// Resolved application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding the Parquet store and `stats.json`.
    pub data_dir: PathBuf,
    /// Directory holding the OpenCUP CSV extracts.
    pub source_dir: PathBuf,
    /// Directory holding the procurement mapping and archives
    /// (defaults to `<source_dir>/cup_json`).
    pub cig_source_dir: Option<PathBuf>,
    /// Engine memory budget; `0` disables the limit.
    pub memory_limit_mb: u64,
    /// Engine parallelism; the core count when unset.
    pub threads: Option<usize>,
    /// Default bind address for the HTTP server.
    pub bind: String,
}

impl Default for Settings {
    fn default() -> Self {
        // Platform data dir, then home, then the working directory.
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DATA_SUBDIR);

        Self {
            data_dir,
            source_dir: PathBuf::from("."),
            cig_source_dir: None,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            threads: None,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl Settings {
    pub fn store_paths(&self) -> StorePaths {
        StorePaths::new(&self.data_dir)
    }

    pub fn source_layout(&self) -> SourceLayout {
        SourceLayout::new(&self.source_dir, self.cig_source_dir.clone())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            memory_limit: (self.memory_limit_mb > 0)
                .then(|| (self.memory_limit_mb as usize).saturating_mul(1024 * 1024)),
            target_partitions: self.threads,
        }
    }

    /// Apply `OPENCUP_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = var("OPENCUP_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("OPENCUP_SOURCE_DIR") {
            self.source_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("OPENCUP_CIG_SOURCE_DIR") {
            self.cig_source_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = var("OPENCUP_MEMORY_LIMIT_MB") {
            match raw.trim().parse() {
                Ok(mb) => self.memory_limit_mb = mb,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid OPENCUP_MEMORY_LIMIT_MB"),
            }
        }
        if let Some(raw) = var("OPENCUP_THREADS") {
            match raw.trim().parse() {
                Ok(n) => self.threads = Some(n),
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid OPENCUP_THREADS"),
            }
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cig_source_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover an `opencup` config file in the standard locations.
    pub async fn load() -> Self {
        // prefer finds the file, serde parses it.
        match prefer::load("opencup").await {
            Ok(found) => match found.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load a specific file; TOML by extension, JSON otherwise.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;
        let mut config = Self::parse(path, &contents)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, String> {
        match path.extension().and_then(|e| e.to_str()).unwrap_or("json") {
            "toml" => {
                toml::from_str(contents).map_err(|e| format!("Failed to parse TOML config: {}", e))
            }
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Directory relative paths in this file resolve against.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(Path::to_path_buf))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved against `base_dir`
    pub fn resolve_path(path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref dir) = self.data_dir {
            settings.data_dir = Self::resolve_path(dir, base_dir);
        }
        if let Some(ref dir) = self.source_dir {
            settings.source_dir = Self::resolve_path(dir, base_dir);
        }
        if let Some(ref dir) = self.cig_source_dir {
            settings.cig_source_dir = Some(Self::resolve_path(dir, base_dir));
        }
        if let Some(mb) = self.memory_limit_mb {
            settings.memory_limit_mb = mb;
        }
        if let Some(threads) = self.threads {
            settings.threads = Some(threads);
        }
        if let Some(ref bind) = self.bind {
            settings.bind = bind.clone();
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file (`--config`); skips discovery.
    pub config_path: Option<PathBuf>,
    /// `--data` override.
    pub data_dir: Option<PathBuf>,
    /// `--source` override.
    pub source_dir: Option<PathBuf>,
    /// `--cig-source` override.
    pub cig_source_dir: Option<PathBuf>,
}

/// Load settings with explicit options.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Config::default()
        }),
        None => Config::load().await,
    };

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = config.base_dir().unwrap_or_else(|| cwd.clone());

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env(|name| std::env::var(name).ok());

    // Flags win over everything else.
    if let Some(dir) = options.data_dir {
        settings.data_dir = cwd.join(dir);
    }
    if let Some(dir) = options.source_dir {
        settings.source_dir = cwd.join(dir);
    }
    if let Some(dir) = options.cig_source_dir {
        settings.cig_source_dir = Some(cwd.join(dir));
    }

    tracing::debug!(
        data_dir = %settings.data_dir.display(),
        source_dir = %settings.source_dir.display(),
        config = ?config.source_path,
        "settings resolved"
    );
    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_parse_toml_and_json() {
        let toml = Config::parse(
            Path::new("opencup.toml"),
            "data_dir = \"store\"\nmemory_limit_mb = 512\nthreads = 4\n",
        )
        .unwrap();
        assert_eq!(toml.data_dir.as_deref(), Some("store"));
        assert_eq!(toml.memory_limit_mb, Some(512));
        assert_eq!(toml.threads, Some(4));

        let json = Config::parse(Path::new("opencup.json"), "{\"bind\": \"0.0.0.0:8000\"}").unwrap();
        assert_eq!(json.bind.as_deref(), Some("0.0.0.0:8000"));

        assert!(Config::parse(Path::new("bad.toml"), "data_dir = [").is_err());
    }

    #[tokio::test]
    async fn test_relative_paths_resolve_against_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("opencup.toml");
        std::fs::write(&path, "data_dir = \"data\"\nsource_dir = \"/srv/opencup\"\n").unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, &config.base_dir().unwrap());
        assert_eq!(settings.data_dir, dir.path().join("data"));
        assert_eq!(settings.source_dir, PathBuf::from("/srv/opencup"));
    }

    #[test]
    fn test_resolve_path_expands_home() {
        let base = Path::new("/etc/opencup");
        assert_eq!(Config::resolve_path("data", base), base.join("data"));
        assert_eq!(Config::resolve_path("/abs", base), PathBuf::from("/abs"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(Config::resolve_path("~", base), home);
            assert_eq!(Config::resolve_path("~/opencup", base), home.join("opencup"));
        }
    }

    #[test]
    fn test_env_overrides_and_invalid_values() {
        let env: HashMap<&str, &str> = [
            ("OPENCUP_DATA_DIR", "/var/lib/opencup"),
            ("OPENCUP_CIG_SOURCE_DIR", "/mnt/anac"),
            ("OPENCUP_MEMORY_LIMIT_MB", "molto"),
            ("OPENCUP_THREADS", "8"),
            ("OPENCUP_SOURCE_DIR", "  "),
        ]
        .into_iter()
        .collect();
        let mut settings = Settings::default();
        settings.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/opencup"));
        assert_eq!(settings.cig_source_dir, Some(PathBuf::from("/mnt/anac")));
        assert_eq!(settings.memory_limit_mb, DEFAULT_MEMORY_LIMIT_MB);
        assert_eq!(settings.threads, Some(8));
        assert_eq!(settings.source_dir, PathBuf::from("."));
    }

    #[test]
    fn test_engine_options() {
        let mut settings = Settings::default();
        assert_eq!(
            settings.engine_options().memory_limit,
            Some(4096 * 1024 * 1024)
        );
        settings.memory_limit_mb = 0;
        assert_eq!(settings.engine_options().memory_limit, None);
    }

    #[test]
    fn test_source_layout_defaults_cig_dir() {
        let settings = Settings {
            source_dir: PathBuf::from("/src"),
            ..Default::default()
        };
        assert_eq!(settings.source_layout().cig_dir, PathBuf::from("/src/cup_json"));
    }
}
