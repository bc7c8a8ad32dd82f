//! Chunk fetching
//!
//! Handles chunk state, the fetch capability, deduplication of in-flight
//! loads and structured load failures.

pub mod error;
pub mod fetcher;
pub mod loader;
pub mod state;

pub use error::{ChunkLoadError, FailureType};
pub use fetcher::{ChunkFetcher, CorrelationId, LoadEvent, LoadRequest, ResourceTracker, TrackedLoad};
pub use loader::{ChunkLoader, LoaderSettings, NO_RUNTIME_EVENT};
pub use state::{ChunkOutcome, ChunkState, ChunkStateTable};
