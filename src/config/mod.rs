//! Configuration and credential storage

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::CredentialStore;

/// API root used when neither the flag, the environment nor the config
/// file name one.
pub const DEFAULT_API_URL: &str = "http://localhost:8081/v1";

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the center API, including the version prefix
    pub api_url: Option<String>,
    /// Stored credentials, keyed by `accessToken` / `refreshToken`
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "center-cli", "center-cli")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`; a missing file is an empty config.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Pick the API URL: explicit value first, then the config file, then
    /// the default. The result has no trailing slash.
    pub fn resolve_api_url(&self, explicit: Option<&str>) -> Result<String> {
        let raw = explicit
            .or(self.api_url.as_deref())
            .unwrap_or(DEFAULT_API_URL);

        let url = Url::parse(raw).with_context(|| format!("Invalid API URL: {}", raw))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("API URL must use http or https: {}", raw);
        }
        Ok(raw.trim_end_matches('/').to_string())
    }
}

/// Credential store backed by the `[credentials]` table of the config file.
///
/// Every operation re-reads the file so concurrent invocations see each
/// other's writes.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut config = Config::load_from(&self.path)?;
        apply(&mut config.credentials);
        config.save_to(&self.path)
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match Config::load_from(&self.path) {
            Ok(config) => config.credentials.get(key).cloned(),
            Err(e) => {
                tracing::warn!("Failed to read credentials: {:#}", e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|credentials| {
            credentials.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|credentials| {
            credentials.remove(key);
        })
    }
}
