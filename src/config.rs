use crate::allocator::DEFAULT_MAX_ATTEMPTS;
use crate::slug::DEFAULT_FALLBACK_PREFIX;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const LOCAL_CONFIG_FILE: &str = "catalog.toml";
const APP_DIR: &str = "listing-catalog";
const DEFAULT_DB_PATH: &str = "catalog.db";
const DEFAULT_POOL_SIZE: u32 = 4;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Deserialize, Default)]
pub struct CatalogConfig {
    pub store: Option<StoreConfig>,
    pub slugs: Option<SlugsConfig>,
    pub log: Option<LogConfig>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StoreConfig {
    pub backend: Option<String>,
    pub path: Option<PathBuf>,
    pub pool_size: Option<u32>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SlugsConfig {
    pub max_attempts: Option<usize>,
    pub fallback_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LogConfig {
    pub filter: Option<String>,
    pub json: Option<bool>,
    pub audit_log: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Sqlite {
        path: PathBuf,
        pool_size: u32,
        busy_timeout: Duration,
    },
    Memory,
}

/// Fully resolved settings plus the warnings produced while resolving them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backend: Backend,
    pub max_attempts: usize,
    pub fallback_prefix: String,
    pub log_filter: String,
    pub log_json: bool,
    pub audit_log: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Explicit path first, then `catalog.toml` in the working directory, then the
/// per-user config directory.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

/// Reads and parses the config file. A missing file is `Ok(None)`; a file
/// that cannot be read or parsed comes back as a warning message.
pub fn load_config(path: &Path) -> Result<Option<CatalogConfig>, String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(format!(
                "Failed to read config file at {}: {}; using defaults.",
                path.display(),
                error
            ))
        }
    };

    toml::from_str::<CatalogConfig>(&raw).map(Some).map_err(|error| {
        format!(
            "Failed to parse config file at {}: {}; using defaults.",
            path.display(),
            error
        )
    })
}

/// Locates, loads and resolves the config. A load failure becomes the first
/// entry of `Settings::warnings`.
pub fn load_settings(explicit: Option<&Path>) -> Settings {
    let (config, load_warning) = match config_path(explicit).map(|path| load_config(&path)) {
        None | Some(Ok(None)) => (None, None),
        Some(Ok(Some(config))) => (Some(config), None),
        Some(Err(warning)) => (None, Some(warning)),
    };
    let mut settings = resolve_settings(config.as_ref());
    if let Some(warning) = load_warning {
        settings.warnings.insert(0, warning);
    }
    settings
}

pub fn resolve_settings(config: Option<&CatalogConfig>) -> Settings {
    let mut warnings = Vec::new();
    let store = config.and_then(|c| c.store.as_ref());
    let slugs = config.and_then(|c| c.slugs.as_ref());
    let log = config.and_then(|c| c.log.as_ref());

    let pool_size = match store.and_then(|s| s.pool_size) {
        Some(0) => {
            warnings.push(format!(
                "Config [store].pool_size must be positive; using {}.",
                DEFAULT_POOL_SIZE
            ));
            DEFAULT_POOL_SIZE
        }
        Some(size) => size,
        None => DEFAULT_POOL_SIZE,
    };
    let busy_timeout = Duration::from_millis(
        store
            .and_then(|s| s.busy_timeout_ms)
            .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
    );
    let sqlite = Backend::Sqlite {
        path: store
            .and_then(|s| s.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
        pool_size,
        busy_timeout,
    };

    let backend = match store.and_then(|s| s.backend.as_deref()).map(str::trim) {
        None | Some("sqlite") => sqlite,
        Some("memory") => Backend::Memory,
        Some(other) => {
            warnings.push(format!(
                "Config [store].backend '{}' is unknown; using sqlite.",
                other
            ));
            sqlite
        }
    };

    let max_attempts = match slugs.and_then(|s| s.max_attempts) {
        Some(0) => {
            warnings.push(format!(
                "Config [slugs].max_attempts must be positive; using {}.",
                DEFAULT_MAX_ATTEMPTS
            ));
            DEFAULT_MAX_ATTEMPTS
        }
        Some(attempts) => attempts,
        None => DEFAULT_MAX_ATTEMPTS,
    };

    let fallback_prefix = match slugs.and_then(|s| s.fallback_prefix.as_deref()) {
        Some(prefix) if !crate::slug::is_normalized(prefix) => {
            warnings.push(format!(
                "Config [slugs].fallback_prefix '{}' is not a slug; using '{}'.",
                prefix, DEFAULT_FALLBACK_PREFIX
            ));
            DEFAULT_FALLBACK_PREFIX.to_string()
        }
        Some(prefix) => prefix.to_string(),
        None => DEFAULT_FALLBACK_PREFIX.to_string(),
    };

    Settings {
        backend,
        max_attempts,
        fallback_prefix,
        log_filter: log
            .and_then(|l| l.filter.clone())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        log_json: log.and_then(|l| l.json).unwrap_or(false),
        audit_log: log.and_then(|l| l.audit_log.clone()),
        warnings,
    }
}
