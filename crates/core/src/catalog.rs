//! Name registry for the indices and collections under one storage root.
//!
//! A [`Catalog`] is an explicit value: open one per storage root and pass it
//! (or clones of it) to whatever needs handles. Opening scans the root and
//! loads every valid saved directory, so previously saved names are listed
//! without an explicit load. Indices and collections share one namespace.

use crate::collection::Collection;
use crate::config;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::params::{self, IndexParams};
use crate::schema::{HandleKind, IndexSchema};
use crate::storage::persistence;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A registered handle.
#[derive(Debug, Clone)]
pub enum CatalogEntry {
    Index(Index),
    Collection(Collection),
}

impl CatalogEntry {
    pub fn kind(&self) -> HandleKind {
        match self {
            CatalogEntry::Index(_) => HandleKind::Index,
            CatalogEntry::Collection(_) => HandleKind::Collection,
        }
    }

    pub fn schema(&self) -> IndexSchema {
        match self {
            CatalogEntry::Index(index) => index.schema(),
            CatalogEntry::Collection(collection) => collection.schema(),
        }
    }
}

/// Registry of named handles scoped to one storage root.
///
/// Cloning produces another handle to the same registry.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
    entries: Arc<RwLock<BTreeMap<String, CatalogEntry>>>,
}

impl Catalog {
    /// Open the catalog rooted at `root`, creating the directory if needed.
    ///
    /// Interrupted saves are recovered first. Directories that fail to load
    /// are logged and skipped.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        persistence::recover(&root)?;

        let mut entries = BTreeMap::new();
        for dir_entry in fs::read_dir(&root)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            let Some(name) = dir_entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !path.is_dir() || persistence::is_transient(&name) || name.starts_with('.') {
                continue;
            }
            match load_entry(&path, &name) {
                Ok(entry) => {
                    entries.insert(name, entry);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable directory");
                }
            }
        }

        tracing::info!(
            root = %root.display(),
            handles = entries.len(),
            "catalog opened"
        );
        Ok(Self {
            root,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    /// Open the catalog at the root named by `NEARSTORE_DATA_DIR` (default `./data`).
    pub fn from_env() -> Result<Self> {
        Self::open(config::storage_root_from_env())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn register(&self, name: &str, entry: CatalogEntry) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(Error::Configuration(format!("name '{name}' already exists")));
        }
        tracing::info!(name, kind = %entry.kind(), "handle created");
        entries.insert(name.to_string(), entry);
        Ok(())
    }

    /// Create and register an unbuilt index.
    pub fn create_index(&self, name: &str, params: IndexParams) -> Result<Index> {
        let index = Index::new(name, params)?;
        self.register(name, CatalogEntry::Index(index.clone()))?;
        Ok(index)
    }

    /// Create and register an empty collection.
    pub fn create_collection(
        &self,
        name: &str,
        params: IndexParams,
        dimension: Option<usize>,
    ) -> Result<Collection> {
        let collection = Collection::new(name, params, dimension)?;
        self.register(name, CatalogEntry::Collection(collection.clone()))?;
        Ok(collection)
    }

    pub fn get(&self, name: &str) -> Option<CatalogEntry> {
        self.entries.read().get(name).cloned()
    }

    pub fn get_index(&self, name: &str) -> Result<Index> {
        match self.get(name) {
            Some(CatalogEntry::Index(index)) => Ok(index),
            _ => Err(Error::NotFound(format!("index '{name}'"))),
        }
    }

    pub fn get_collection(&self, name: &str) -> Result<Collection> {
        match self.get(name) {
            Some(CatalogEntry::Collection(collection)) => Ok(collection),
            _ => Err(Error::NotFound(format!("collection '{name}'"))),
        }
    }

    fn names_of(&self, kind: HandleKind) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.kind() == kind)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Index names in ascending order.
    pub fn list_indices(&self) -> Vec<String> {
        self.names_of(HandleKind::Index)
    }

    /// Collection names in ascending order.
    pub fn list_collections(&self) -> Vec<String> {
        self.names_of(HandleKind::Collection)
    }

    fn unregister(&self, name: &str, kind: HandleKind, delete_on_disk: bool) -> Result<()> {
        {
            let mut entries = self.entries.write();
            match entries.get(name) {
                Some(entry) if entry.kind() == kind => {
                    entries.remove(name);
                }
                _ => return Err(Error::NotFound(format!("{kind} '{name}'"))),
            }
        }
        let dir = self.dir_of(name);
        if delete_on_disk && dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        tracing::info!(name, kind = %kind, delete_on_disk, "handle deleted");
        Ok(())
    }

    /// Drop an index from the registry, and its directory when `delete_on_disk`.
    pub fn delete_index(&self, name: &str, delete_on_disk: bool) -> Result<()> {
        self.unregister(name, HandleKind::Index, delete_on_disk)
    }

    /// Drop a collection from the registry, and its directory when `delete_on_disk`.
    pub fn delete_collection(&self, name: &str, delete_on_disk: bool) -> Result<()> {
        self.unregister(name, HandleKind::Collection, delete_on_disk)
    }

    /// Save a registered index to `<root>/<name>`.
    pub fn save_index(&self, name: &str) -> Result<IndexSchema> {
        let index = self.get_index(name)?;
        persistence::save_index(&index, &self.dir_of(name))
    }

    /// Save a registered collection to `<root>/<name>`.
    pub fn save_collection(&self, name: &str) -> Result<IndexSchema> {
        let collection = self.get_collection(name)?;
        persistence::save_collection(&collection, &self.dir_of(name))
    }

    /// Reload an index from `<root>/<name>`, replacing any in-memory entry.
    pub fn load_index(&self, name: &str) -> Result<Index> {
        params::validate_name(name)?;
        match load_entry(&self.dir_of(name), name)? {
            CatalogEntry::Index(index) => {
                self.entries
                    .write()
                    .insert(name.to_string(), CatalogEntry::Index(index.clone()));
                Ok(index)
            }
            CatalogEntry::Collection(_) => Err(Error::NotFound(format!("index '{name}'"))),
        }
    }

    /// Reload a collection from `<root>/<name>`, replacing any in-memory entry.
    pub fn load_collection(&self, name: &str) -> Result<Collection> {
        params::validate_name(name)?;
        match load_entry(&self.dir_of(name), name)? {
            CatalogEntry::Collection(collection) => {
                self.entries
                    .write()
                    .insert(name.to_string(), CatalogEntry::Collection(collection.clone()));
                Ok(collection)
            }
            CatalogEntry::Index(_) => Err(Error::NotFound(format!("collection '{name}'"))),
        }
    }

    /// Remove every handle, every saved directory, and any interrupted-save
    /// leftovers under the root. Unrelated files are left alone. Returns the
    /// number of directories removed.
    pub fn reset(&self) -> Result<usize> {
        let mut entries = self.entries.write();
        entries.clear();

        let mut removed = 0;
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if !path.is_dir() {
                continue;
            }
            let transient = dir_entry
                .file_name()
                .to_str()
                .is_some_and(persistence::is_transient);
            if transient || path.join(config::SCHEMA_FILE).is_file() {
                fs::remove_dir_all(&path)?;
                removed += 1;
            }
        }
        tracing::info!(root = %self.root.display(), removed, "catalog reset");
        Ok(removed)
    }
}

/// Load whatever handle `dir` holds, checking it was saved under `name`.
fn load_entry(dir: &Path, name: &str) -> Result<CatalogEntry> {
    let schema = persistence::read_schema(dir)?;
    if schema.name != name {
        return Err(Error::Corruption(format!(
            "directory {:?} holds '{}'",
            dir, schema.name
        )));
    }
    Ok(match schema.kind {
        HandleKind::Index => CatalogEntry::Index(persistence::load_index(dir)?),
        HandleKind::Collection => CatalogEntry::Collection(persistence::load_collection(dir)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use tempfile::TempDir;

    #[test]
    fn test_create_get_list() {
        let tmp = TempDir::new().unwrap();
        let catalog = Catalog::open(tmp.path()).unwrap();
        catalog.create_index("b", IndexParams::default()).unwrap();
        catalog.create_index("a", IndexParams::default()).unwrap();
        catalog
            .create_collection("c", IndexParams::default(), None)
            .unwrap();

        assert_eq!(catalog.list_indices(), vec!["a", "b"]);
        assert_eq!(catalog.list_collections(), vec!["c"]);
        assert!(catalog.get_index("a").is_ok());
        assert!(matches!(catalog.get_index("c"), Err(Error::NotFound(_))));
        assert!(matches!(catalog.get_collection("zz"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_names_are_unique_across_kinds() {
        let tmp = TempDir::new().unwrap();
        let catalog = Catalog::open(tmp.path()).unwrap();
        catalog.create_index("shared", IndexParams::default()).unwrap();
        let err = catalog
            .create_collection("shared", IndexParams::default(), None)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(matches!(
            catalog.create_index("../escape", IndexParams::default()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_rejected_creation_registers_nothing() {
        let tmp = TempDir::new().unwrap();
        let catalog = Catalog::open(tmp.path()).unwrap();
        let params = IndexParams::default().with_max_nbrs(1000);
        assert!(matches!(
            catalog.create_index("big", params),
            Err(Error::Configuration(_))
        ));
        assert!(catalog.get("big").is_none());
    }

    #[test]
    fn test_open_skips_foreign_and_broken_directories() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("notes")).unwrap();
        fs::create_dir(tmp.path().join("broken")).unwrap();
        fs::write(tmp.path().join("broken").join(config::SCHEMA_FILE), b"{").unwrap();
        fs::write(tmp.path().join("README"), b"hi").unwrap();

        let catalog = Catalog::open(tmp.path()).unwrap();
        assert!(catalog.list_indices().is_empty());
        assert!(catalog.list_collections().is_empty());

        assert_eq!(catalog.reset().unwrap(), 1);
        assert!(tmp.path().join("notes").exists());
        assert!(tmp.path().join("README").exists());
        assert!(!tmp.path().join("broken").exists());
    }

    #[test]
    fn test_load_collection_replaces_entry() {
        let tmp = TempDir::new().unwrap();
        let catalog = Catalog::open(tmp.path()).unwrap();
        let coll = catalog
            .create_collection("docs", IndexParams::default(), None)
            .unwrap();
        coll.insert(vec![Document::new(1, "one", vec![1.0, 0.0])])
            .unwrap();
        catalog.save_collection("docs").unwrap();

        coll.insert(vec![Document::new(2, "two", vec![0.0, 1.0])])
            .unwrap();
        assert_eq!(catalog.get_collection("docs").unwrap().len(), 2);

        let reloaded = catalog.load_collection("docs").unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(catalog.get_collection("docs").unwrap().len(), 1);
        assert!(matches!(catalog.load_index("docs"), Err(Error::NotFound(_))));
    }
}
