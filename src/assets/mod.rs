//! Asset path resolution
//!
//! Maps chunk ids to the public file names produced by the build step:
//! `<base_url>assets/js/<name>.<hash>.js`. The name table is best-effort and
//! falls back to the raw chunk id.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::ids::ChunkId;

/// Directory all chunk scripts are emitted into, relative to the base URL
pub const SCRIPT_DIR: &str = "assets/js/";

/// Static chunk id → (public name, content hash) tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    /// Friendlier public names; chunks absent here use their id
    #[serde(default)]
    pub names: HashMap<ChunkId, String>,
    /// Content hashes baked into each file name
    #[serde(default)]
    pub hashes: HashMap<ChunkId, String>,
}

impl AssetManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chunk's public name and hash
    pub fn with_chunk(
        mut self,
        id: impl Into<ChunkId>,
        name: Option<&str>,
        hash: impl Into<String>,
    ) -> Self {
        let id = id.into();
        if let Some(name) = name {
            self.names.insert(id.clone(), name.to_string());
        }
        self.hashes.insert(id, hash.into());
        self
    }

    pub fn public_name<'a>(&'a self, id: &'a ChunkId) -> &'a str {
        self.names
            .get(id)
            .map(|s| s.as_str())
            .unwrap_or_else(|| id.as_str())
    }

    pub fn hash(&self, id: &ChunkId) -> Option<&str> {
        self.hashes.get(id).map(|s| s.as_str())
    }

    /// Chunk id whose public name is `name`
    pub fn chunk_for_name(&self, name: &str) -> Option<&ChunkId> {
        self.names
            .iter()
            .find(|(_, public)| public.as_str() == name)
            .map(|(id, _)| id)
    }
}

/// Builds network paths for chunks
#[derive(Debug, Clone)]
pub struct AssetResolver {
    base_url: String,
    manifest: AssetManifest,
}

impl AssetResolver {
    pub fn new(base_url: impl Into<String>, manifest: AssetManifest) -> Self {
        Self {
            base_url: base_url.into(),
            manifest,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    /// Script file name relative to the base URL
    ///
    /// A chunk with no recorded hash degrades to `<name>.js`.
    pub fn filename(&self, id: &ChunkId) -> String {
        let name = self.manifest.public_name(id);
        match self.manifest.hash(id) {
            Some(hash) => format!("{}{}.{}.js", SCRIPT_DIR, name, hash),
            None => {
                warn!("No content hash recorded for chunk {}", id);
                format!("{}{}.js", SCRIPT_DIR, name)
            }
        }
    }

    /// Full network path of a chunk's script
    pub fn resolve(&self, id: &ChunkId) -> String {
        format!("{}{}", self.base_url, self.filename(id))
    }

    /// Full path for either a public asset name or a chunk id
    pub fn asset_path(&self, name_or_id: &str) -> String {
        let id = self
            .manifest
            .chunk_for_name(name_or_id)
            .cloned()
            .unwrap_or_else(|| ChunkId::from(name_or_id));
        self.resolve(&id)
    }
}
