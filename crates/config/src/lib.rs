//! Layered configuration for arcache.
//!
//! Values are merged, later layers winning:
//! 1. built-in defaults,
//! 2. an optional config file (TOML, YAML or JSON, picked by extension),
//! 3. environment variables prefixed with `ARCACHE_`, using `__` to nest
//!    (`ARCACHE_CACHE__MAX_ENTRIES=5` sets `cache.max_entries`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "ARCACHE_";
const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding cached archive files. Owned by the cache: stale
    /// cache files in it are deleted on start. Only files named `arcache-*`
    /// are removed; anything else in the directory is left in place.
    pub directory: PathBuf,
    /// Ceiling on the summed declared size of cached archives, in MiB.
    pub max_size_mb: u64,
    /// Ceiling on the number of cached archives.
    pub max_entries: usize,
}
impl CacheConfig {
    pub fn max_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(BYTES_PER_MB)
    }
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("arcache"),
            max_size_mb: 100,
            max_entries: 100,
        }
    }
}

impl Config {
    /// Platform config file location, e.g. `~/.config/arcache/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "arcache").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from defaults, a config file and the environment.
    ///
    /// An explicit `path` must exist. Without one, the file at
    /// [`default_path()`](Self::default_path) is used if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path)?)
    }

    /// The merged provider stack, before extraction.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let file = match path {
            Some(path) if !path.exists() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.exists()),
        };
        match file {
            Some(file) => {
                tracing::debug!(path = %file.display(), "Loading config file");
                figment = merge_file(figment, &file)?;
            },
            None => tracing::debug!("No config file; using defaults and environment"),
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Invalid)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let cache = &self.cache;
        if cache.max_size_mb == 0 {
            exn::bail!(ErrorKind::Validation("cache.max_size_mb", "must be at least 1".to_string()));
        }
        if cache.max_entries == 0 {
            exn::bail!(ErrorKind::Validation("cache.max_entries", "must be at least 1".to_string()));
        }
        if !cache.directory.is_absolute() {
            exn::bail!(ErrorKind::Validation(
                "cache.directory",
                format!("must be an absolute path, got `{}`", cache.directory.display())
            ));
        }
        Ok(())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}
