//! Error taxonomy shared by every nearstore operation.

use thiserror::Error;

/// Errors returned by index, collection, persistence, and catalog operations.
///
/// Every variant is recoverable by the caller; none of them leave a handle in a
/// partially mutated state.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid creation parameters (unsupported metric/quantization/topology,
    /// out-of-range `max_nbrs`, malformed names, duplicate names).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Operation not valid for the handle's lifecycle state
    /// (second build, save before build, query on an unbuilt handle).
    #[error("invalid state: {0}")]
    State(String),

    /// A referenced name, directory, or id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// On-disk descriptor and data blocks are inconsistent.
    #[error("corrupted data: {0}")]
    Corruption(String),

    /// Caller-supplied vectors or parameters do not match the handle's schema.
    #[error("validation error: {0}")]
    Validation(String),

    /// Filesystem failure not attributable to corruption.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::State(_) => "state",
            Error::NotFound(_) => "not_found",
            Error::Corruption(_) => "corruption",
            Error::Validation(_) => "validation",
            Error::Io(_) => "io",
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        fn open_missing() -> Result<()> {
            std::fs::read("/definitely/not/here/nearstore")?;
            Ok(())
        }
        let err = open_missing().unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_display_includes_class() {
        let err = Error::State("index 'a' is already built".into());
        assert_eq!(err.to_string(), "invalid state: index 'a' is already built");
    }
}
