use bookwiki_editor_core::PageGeometry;
use serde::{Deserialize, Serialize};

use std::future::Future;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BookwikiError, Result};

/// Environment variable that overrides [`Config::endpoint`].
pub const ENDPOINT_ENV: &str = "BOOKWIKI_ENDPOINT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the story backend.
    pub endpoint: String,
    /// Story used when a command does not name one.
    pub story_id: Option<u64>,
    /// Page box used for image bounds and page estimates.
    pub page: PageGeometry,
    pub pagination_debounce_ms: u64,
    pub runaway_threshold: usize,
}

impl Config {
    /// Loads the configuration from the provided loader.
    pub async fn load(loader: &impl Loader) -> Result<Self> {
        loader.load().await
    }

    /// Saves the configuration using the provided saver.
    pub async fn save(&self, saver: &impl Saver) -> Result<()> {
        saver.save(self).await
    }

    /// Apply environment overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                tracing::debug!(%endpoint, "endpoint overridden from environment");
                self.endpoint = endpoint;
            }
        }
        self
    }

    pub fn pagination_debounce(&self) -> Duration {
        Duration::from_millis(self.pagination_debounce_ms)
    }
}

impl Default for Config {
    /// Creates a new default configuration.
    ///
    /// The default configuration talks to a backend on `http://localhost:3906`.
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3906".to_owned(),
            story_id: None,
            page: PageGeometry::default(),
            pagination_debounce_ms: 1000,
            runaway_threshold: 100,
        }
    }
}

/// The trait for loading configuration data.
pub trait Loader {
    /// Loads the configuration data.
    fn load(&self) -> impl Future<Output = Result<Config>> + Send;
}

/// The trait for saving configuration data.
pub trait Saver {
    /// Saves the configuration data.
    fn save(&self, config: &Config) -> impl Future<Output = Result<()>> + Send;
}

/// An implementation of [`Loader`] and [`Saver`] that reads and writes a configuration file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a new [`FileStore`] with the given path.
    ///
    /// Only `.json` files are supported.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_format(&self) -> Result<()> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(()),
            _ => Err(BookwikiError::Config(format!(
                "unsupported config file format: {}",
                self.path.display()
            ))),
        }
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new(config_path())
    }
}

impl Loader for FileStore {
    async fn load(&self) -> Result<Config> {
        self.check_format()?;
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no config file, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Saver for FileStore {
    async fn save(&self, config: &Config) -> Result<()> {
        self.check_format()?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(config)?).await?;
        Ok(())
    }
}

/// `$CONFIG_DIR/bookwiki/config.json`, or `./bookwiki/config.json` when the
/// platform has no config directory.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("./"))
        .join("bookwiki/config.json")
}
