//! Timeout utilities
//!
//! Chunk loads are the only operations the runtime bounds in time. The default
//! matches the window scripts are given before a load is declared timed out;
//! `RuntimeConfig::chunk_timeout_secs` overrides it.

use std::time::Duration;
use tokio::time::timeout;

/// Default window for a chunk load to signal completion
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(120);

/// Execute operation with default chunk timeout
pub async fn with_chunk_timeout<F, T>(
    operation: F,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(DEFAULT_CHUNK_TIMEOUT, operation).await
}

/// Execute operation with custom timeout
pub async fn with_custom_timeout<F, T>(
    operation: F,
    duration: Duration,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(duration, operation).await
}
