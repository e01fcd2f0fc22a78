//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engines and their configuration.
///
/// A cache miss is not an error: lookups return `Option`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Argument rejected at the call site (e.g. a zero TTL)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// TTL does not match any configured queue bucket
    #[error("Invalid ttl: {0}")]
    InvalidTtl(String),

    /// Malformed construction parameters
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Heap insert attempted at capacity
    #[error("Heap full: capacity {0} reached")]
    Full(usize),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CacheError::InvalidTtl("7s".to_string()).to_string(),
            "Invalid ttl: 7s"
        );
        assert_eq!(CacheError::Full(4).to_string(), "Heap full: capacity 4 reached");
    }
}
