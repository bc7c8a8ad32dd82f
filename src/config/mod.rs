//! Configuration management for the chunk runtime
//!
//! Handles configuration loading and validation. The only inputs the runtime
//! needs are the base URL, the two static asset tables and a few load
//! settings; everything is defaulted so an empty file is a valid config.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::assets::{AssetManifest, AssetResolver};
use crate::chunk::LoaderSettings;
use crate::ids::ChunkId;

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "chunk_runtime::chunk=debug")
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Public URL prefix every asset path starts with
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Prefix of the correlation id attached to chunk loads
    #[serde(default = "default_load_namespace")]
    pub load_namespace: String,

    /// Seconds a chunk load may take before it is failed with `timeout`
    #[serde(default = "default_chunk_timeout_secs")]
    pub chunk_timeout_secs: u64,

    /// Script nonce passed along with every load
    #[serde(default)]
    pub nonce: Option<String>,

    /// Chunks shipped with the runtime itself, ready from the start
    #[serde(default)]
    pub installed_chunks: Vec<ChunkId>,

    /// Chunks without a script of their own, satisfied without fetching
    #[serde(default)]
    pub inline_chunks: Vec<ChunkId>,

    /// Chunk id → public name / content hash tables
    #[serde(default)]
    pub assets: AssetManifest,

    /// Logging configuration
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

fn default_base_url() -> String {
    "/".to_string()
}

fn default_load_namespace() -> String {
    "docs:".to_string()
}

fn default_chunk_timeout_secs() -> u64 {
    120
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            load_namespace: default_load_namespace(),
            chunk_timeout_secs: default_chunk_timeout_secs(),
            nonce: None,
            installed_chunks: Vec::new(),
            inline_chunks: Vec::new(),
            assets: AssetManifest::default(),
            logging: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: RuntimeConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: RuntimeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.is_empty() {
            bail!("base_url must not be empty");
        }
        if !self.base_url.ends_with('/') {
            bail!("base_url must end with '/', got {:?}", self.base_url);
        }
        if self.load_namespace.is_empty() {
            bail!("load_namespace must not be empty");
        }
        if self.chunk_timeout_secs == 0 {
            bail!("chunk_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_assets(mut self, assets: AssetManifest) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_installed_chunks<I, C>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ChunkId>,
    {
        self.installed_chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_inline_chunks<I, C>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ChunkId>,
    {
        self.inline_chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn asset_resolver(&self) -> AssetResolver {
        AssetResolver::new(self.base_url.clone(), self.assets.clone())
    }

    pub fn loader_settings(&self) -> LoaderSettings {
        LoaderSettings {
            load_namespace: self.load_namespace.clone(),
            timeout: self.chunk_timeout(),
            nonce: self.nonce.clone(),
            inline_chunks: self.inline_chunks.iter().cloned().collect::<HashSet<_>>(),
        }
    }
}
