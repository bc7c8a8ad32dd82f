//! Structured chunk load failures

use std::fmt;
use thiserror::Error;

use crate::ids::ChunkId;

/// Why a chunk load failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// The script loaded but never registered the chunk
    Missing,
    /// No load or error signal arrived within the timeout
    Timeout,
    /// Raw event kind reported by the fetcher
    Event(String),
}

impl FailureType {
    pub fn as_str(&self) -> &str {
        match self {
            FailureType::Missing => "missing",
            FailureType::Timeout => "timeout",
            FailureType::Event(kind) => kind,
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error delivered to every waiter of a failed chunk load
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Loading chunk {chunk_id} failed.\n({failure_type}: {request_path})")]
pub struct ChunkLoadError {
    pub chunk_id: ChunkId,
    pub failure_type: FailureType,
    pub request_path: String,
}

impl ChunkLoadError {
    pub const NAME: &'static str = "ChunkLoadError";

    pub fn new(chunk_id: ChunkId, failure_type: FailureType, request_path: impl Into<String>) -> Self {
        Self {
            chunk_id,
            failure_type,
            request_path: request_path.into(),
        }
    }

    /// Error kind, always `"ChunkLoadError"`
    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}
