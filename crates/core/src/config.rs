//! Global configuration constants for nearstore.
//!
//! Tuning defaults, input validation limits, and the on-disk layout names are
//! defined here. The only runtime setting is the storage root, resolved from
//! the environment by [`storage_root_from_env`].

use std::path::PathBuf;

/// Default bound on the adjacency list size of a graph node.
///
/// Higher values improve recall but increase memory and build time.
pub const DEFAULT_MAX_NBRS: usize = 32;

/// Smallest accepted `max_nbrs`.
pub const MIN_MAX_NBRS: usize = 2;

/// Largest accepted `max_nbrs`. Creation with a larger bound is a configuration error.
pub const MAX_NBRS_CEILING: usize = 256;

/// Default candidate list size while inserting nodes during a build.
pub const DEFAULT_EF_CONSTRUCTION: usize = 100;

/// Default candidate list size during search.
pub const DEFAULT_EF_SEARCH: usize = 100;

/// Maximum allowed vector dimension.
pub const MAX_DIMENSION: usize = 4096;

/// Maximum number of results (`limit`) per query.
pub const MAX_K: usize = 10_000;

/// Maximum `ef_search` accepted by a query.
pub const MAX_EF_SEARCH: usize = 100_000;

/// Maximum worker threads for a single batch query.
pub const MAX_QUERY_THREADS: usize = 512;

/// Maximum length of an index or collection name in bytes.
pub const MAX_NAME_LEN: usize = 128;

/// Tombstone share of a collection graph above which writes log a reindex warning.
pub const TOMBSTONE_WARN_RATIO: f64 = 0.5;

/// Environment variable selecting the storage root.
pub const DATA_DIR_ENV: &str = "NEARSTORE_DATA_DIR";

/// Storage root used when [`DATA_DIR_ENV`] is unset.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Descriptor file written into every saved index or collection directory.
pub const SCHEMA_FILE: &str = "schema.json";

/// Binary block holding graph adjacency, codec parameters, and vector arenas.
pub const GRAPH_FILE: &str = "graph.bin";

/// Binary block holding collection documents and id mappings.
pub const DOCUMENTS_FILE: &str = "documents.bin";

/// Version of the on-disk layout. Loading any other version is a corruption error.
pub const FORMAT_VERSION: u32 = 1;

/// Prefix of the hidden staging directories used for atomic saves.
pub const STAGING_PREFIX: &str = ".staging-";

/// Prefix of the hidden backup directories used while swapping a save into place.
pub const BACKUP_PREFIX: &str = ".backup-";

/// Resolve the storage root from [`DATA_DIR_ENV`], defaulting to [`DEFAULT_DATA_DIR`].
pub fn storage_root_from_env() -> PathBuf {
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(DEFAULT_DATA_DIR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_root_from_env() {
        // Only this test touches the variable.
        std::env::set_var(DATA_DIR_ENV, "/srv/nearstore");
        assert_eq!(storage_root_from_env(), PathBuf::from("/srv/nearstore"));
        std::env::set_var(DATA_DIR_ENV, "  ");
        assert_eq!(storage_root_from_env(), PathBuf::from(DEFAULT_DATA_DIR));
        std::env::remove_var(DATA_DIR_ENV);
        assert_eq!(storage_root_from_env(), PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn test_defaults_within_limits() {
        assert!((MIN_MAX_NBRS..=MAX_NBRS_CEILING).contains(&DEFAULT_MAX_NBRS));
        assert!(DEFAULT_EF_SEARCH <= MAX_EF_SEARCH);
    }
}
