//! Chunk Runtime - lazy module loading and code splitting for bundled sites
//!
//! This crate provides the runtime a bundled site ships alongside its code:
//! a module registry with instantiate-once semantics, on-demand fetching of
//! code chunks, and a startup queue that runs entry points once the chunks
//! they depend on have arrived.
//!
//! ## Architecture
//!
//! 1. **Assets**: chunk id → public script path
//! 2. **Chunks**: per-chunk state, deduplicated loads, structured failures
//! 3. **Intake**: chunks announce themselves, before or after the runtime exists
//! 4. **Modules**: factory registry, export namespaces, interop helpers
//! 5. **Startup**: dependency- and priority-gated deferred entries
//!
//! ## Design Principles
//!
//! 1. **Single Owner**: all mutable state lives in one [`ChunkRuntime`]
//! 2. **Injectable Fetching**: the actual script fetch is a [`ChunkFetcher`]
//! 3. **Reentrancy**: no lock is held while user code runs

pub mod assets;
pub mod chunk;
pub mod config;
pub mod error;
pub mod ids;
pub mod intake;
pub mod module;
pub mod runtime;
pub mod startup;
pub mod utils;

pub use assets::{AssetManifest, AssetResolver};
pub use chunk::{ChunkFetcher, ChunkLoadError, ChunkState, FailureType, LoadEvent, LoadRequest};
pub use config::{LoggingConfig, RuntimeConfig};
pub use error::{ModuleError, RuntimeError};
pub use ids::{ChunkId, ModuleId};
pub use intake::{ChunkDefinition, ChunkIntake};
pub use module::{Exports, ModuleRegistry, NamespaceMode, Value};
pub use runtime::ChunkRuntime;
pub use startup::DeferredEntry;
