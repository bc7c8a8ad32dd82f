//! Utility modules for logging and timeouts

pub mod logging;
pub mod timeout;

// Re-export commonly used items
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use logging::{init_logging, init_logging_from_config};
pub use timeout::{with_chunk_timeout, with_custom_timeout, DEFAULT_CHUNK_TIMEOUT};
