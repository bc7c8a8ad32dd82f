//! Runtime error types
//!
//! Fetch failures have their own structured type ([`ChunkLoadError`]); module
//! instantiation and startup failures are [`ModuleError`]s. [`RuntimeError`]
//! wraps both for operations that can hit either.

use thiserror::Error;

use crate::chunk::ChunkLoadError;
use crate::ids::ModuleId;

/// Module instantiation errors
#[derive(Debug, Clone, Error)]
pub enum ModuleError {
    #[error("Module not found: {0}")]
    NotFound(ModuleId),

    #[error("Module {id} factory failed: {message}")]
    FactoryFailed { id: ModuleId, message: String },

    #[error("Startup failed: {0}")]
    StartupFailed(String),

    #[error("Not a module id: {0}")]
    InvalidModuleId(String),
}

impl ModuleError {
    /// Factory failure for `id`
    pub fn factory(id: impl Into<ModuleId>, message: impl Into<String>) -> Self {
        ModuleError::FactoryFailed {
            id: id.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the runtime's public operations
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    ChunkLoad(#[from] ChunkLoadError),

    #[error("Chunk intake already has a live runtime attached")]
    IntakeAlreadyInstalled,

    #[error("Invalid runtime configuration: {0}")]
    Config(String),
}

impl From<anyhow::Error> for RuntimeError {
    fn from(e: anyhow::Error) -> Self {
        RuntimeError::Config(e.to_string())
    }
}
