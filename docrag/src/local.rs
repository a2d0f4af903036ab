//! Persistent vector store on the local filesystem.
//!
//! [`LocalVectorStore`] keeps every collection in memory and mirrors it to
//! `{directory}/{collection}.json`. Each mutation rewrites the collection
//! file through a temporary file and a rename, so a crash leaves either the
//! old or the new snapshot. Mutations are applied to a copy of the collection
//! and only replace the in-memory state once the file is written. Search is a
//! brute-force cosine scan.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::inmemory::{check_dimensions, missing_collection, rank};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "Local";

/// The default storage directory.
pub const DEFAULT_STORE_DIR: &str = "./chroma_db";

#[derive(Debug, Default, Clone)]
struct Collection {
    dimensions: usize,
    chunks: BTreeMap<String, Chunk>,
}

#[derive(Serialize)]
struct CollectionFileRef<'a> {
    name: &'a str,
    dimensions: usize,
    chunks: Vec<&'a Chunk>,
}

#[derive(Deserialize)]
struct CollectionFile {
    name: String,
    #[serde(default)]
    dimensions: usize,
    chunks: Vec<Chunk>,
}

/// A [`VectorStore`] persisted as JSON files under a directory.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::LocalVectorStore;
///
/// let store = LocalVectorStore::open("./chroma_db").await?;
/// store.create_collection("rag_documents", 1536).await?;
/// ```
#[derive(Debug)]
pub struct LocalVectorStore {
    directory: PathBuf,
    collections: RwLock<HashMap<String, Collection>>,
}

impl LocalVectorStore {
    /// Open (creating if needed) a store rooted at `directory` and load every
    /// collection file found there.
    ///
    /// Unreadable collection files are skipped with a warning.
    pub async fn open(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&directory).await.map_err(|e| io_error(&directory, e))?;

        let mut collections = HashMap::new();
        let mut entries =
            tokio::fs::read_dir(&directory).await.map_err(|e| io_error(&directory, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&directory, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_collection(&path).await {
                Ok(file) => {
                    let chunks = file.chunks.into_iter().map(|c| (c.id.clone(), c)).collect();
                    collections
                        .insert(file.name, Collection { dimensions: file.dimensions, chunks });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable collection")
                }
            }
        }

        info!(
            directory = %directory.display(),
            collections = collections.len(),
            "opened local vector store"
        );
        Ok(Self { directory, collections: RwLock::new(collections) })
    }

    /// The directory backing this store.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.json"))
    }

    async fn persist(&self, name: &str, collection: &Collection) -> Result<()> {
        let path = self.collection_path(name);
        let tmp = self.directory.join(format!("{name}.json.tmp"));
        let file = CollectionFileRef {
            name,
            dimensions: collection.dimensions,
            chunks: collection.chunks.values().collect(),
        };
        let json = serde_json::to_vec(&file).map_err(|e| RagError::VectorStoreError {
            backend: BACKEND.to_string(),
            message: format!("failed to serialize collection '{name}': {e}"),
        })?;

        tokio::fs::write(&tmp, json).await.map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| io_error(&path, e))?;
        debug!(collection = name, chunks = collection.chunks.len(), "persisted collection");
        Ok(())
    }

    /// Apply `change` to a copy of `name`, write it out, then swap it in.
    async fn modify(
        &self,
        name: &str,
        change: impl FnOnce(&mut Collection) -> Result<()>,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let mut staged =
            collections.get(name).cloned().ok_or_else(|| missing_collection(BACKEND, name))?;
        change(&mut staged)?;
        self.persist(name, &staged).await?;
        collections.insert(name.to_string(), staged);
        Ok(())
    }
}

async fn read_collection(path: &Path) -> Result<CollectionFile> {
    let raw = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;
    serde_json::from_slice(&raw).map_err(|e| RagError::VectorStoreError {
        backend: BACKEND.to_string(),
        message: format!("failed to parse {}: {e}", path.display()),
    })
}

fn io_error(path: &Path, e: std::io::Error) -> RagError {
    RagError::VectorStoreError {
        backend: BACKEND.to_string(),
        message: format!("{}: {e}", path.display()),
    }
}

/// Collection names become file names, so keep them to a safe alphabet.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(RagError::VectorStoreError {
            backend: BACKEND.to_string(),
            message: format!("invalid collection name '{name}'"),
        })
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        validate_name(name)?;
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            debug!(collection = name, "collection already exists, skipping creation");
            return Ok(());
        }
        let collection = Collection { dimensions, chunks: BTreeMap::new() };
        self.persist(name, &collection).await?;
        collections.insert(name.to_string(), collection);
        info!(collection = name, dimensions, "created collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut collections = self.collections.write().await;
        let path = self.collection_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&path, e)),
        }
        collections.remove(name);
        info!(collection = name, "deleted collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        self.modify(collection, |store| {
            for chunk in chunks {
                check_dimensions(BACKEND, collection, store.dimensions, &chunk.embedding)?;
                store.chunks.insert(chunk.id.clone(), chunk.clone());
            }
            Ok(())
        })
        .await?;
        info!(collection, count = chunks.len(), "added chunks");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        self.modify(collection, |store| {
            for id in ids {
                store.chunks.remove(*id);
            }
            Ok(())
        })
        .await
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()> {
        self.modify(collection, |store| {
            store.chunks.retain(|_, chunk| chunk.document_id != document_id);
            Ok(())
        })
        .await?;
        debug!(collection, document_id, "removed document chunks");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let store =
            collections.get(collection).ok_or_else(|| missing_collection(BACKEND, collection))?;
        check_dimensions(BACKEND, collection, store.dimensions, embedding)?;
        Ok(rank(store.chunks.values(), embedding, top_k))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        let store =
            collections.get(collection).ok_or_else(|| missing_collection(BACKEND, collection))?;
        Ok(store.chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn chunk(id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: format!("text of {id}"),
            embedding,
            metadata: HashMap::from([("source".into(), "a.txt".into())]),
            document_id: "a.txt".into(),
        }
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalVectorStore::open(dir.path()).await.unwrap();
            store.create_collection("docs", 2).await.unwrap();
            let chunks = [chunk("a.txt_0", vec![1.0, 0.0]), chunk("a.txt_1", vec![0.0, 1.0])];
            store.upsert("docs", &chunks).await.unwrap();
        }

        let reopened = LocalVectorStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.count("docs").await.unwrap(), 2);
        let results = reopened.search("docs", &[0.9, 0.1], 1).await.unwrap();
        assert_eq!(results[0].chunk.id, "a.txt_0");
        assert_eq!(results[0].chunk.source(), Some("a.txt"));
    }

    #[tokio::test]
    async fn delete_collection_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).await.unwrap();
        store.create_collection("docs", 2).await.unwrap();
        assert!(dir.path().join("docs.json").exists());

        store.delete_collection("docs").await.unwrap();
        assert!(!dir.path().join("docs.json").exists());
        assert!(store.count("docs").await.is_err());
        // Deleting twice is fine.
        store.delete_collection("docs").await.unwrap();
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        let store = LocalVectorStore::open(&root).await.unwrap();
        store.create_collection("docs", 2).await.unwrap();
        store.upsert("docs", &[chunk("a.txt_0", vec![1.0, 0.0])]).await.unwrap();

        std::fs::remove_dir_all(&root).unwrap();

        assert!(store.upsert("docs", &[chunk("a.txt_1", vec![0.0, 1.0])]).await.is_err());
        assert_eq!(store.count("docs").await.unwrap(), 1);
        assert!(store.delete("docs", &["a.txt_0"]).await.is_err());
        assert_eq!(store.count("docs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejects_vectors_of_the_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).await.unwrap();
        store.create_collection("docs", 2).await.unwrap();

        let result = store.upsert("docs", &[chunk("a.txt_0", vec![1.0, 0.0, 0.0, 0.0])]).await;
        assert!(matches!(result, Err(RagError::VectorStoreError { .. })));
        assert_eq!(store.count("docs").await.unwrap(), 0);

        store.upsert("docs", &[chunk("a.txt_0", vec![1.0, 0.0])]).await.unwrap();
        assert!(store.search("docs", &[1.0, 0.0, 0.0, 0.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn delete_document_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).await.unwrap();
        store.create_collection("docs", 2).await.unwrap();
        let mut other = chunk("b.txt_0", vec![0.5, 0.5]);
        other.document_id = "b.txt".into();
        let chunks = [chunk("a.txt_0", vec![1.0, 0.0]), chunk("a.txt_1", vec![0.0, 1.0]), other];
        store.upsert("docs", &chunks).await.unwrap();

        store.delete_document("docs", "a.txt").await.unwrap();

        let reopened = LocalVectorStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.count("docs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejects_path_like_collection_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).await.unwrap();
        assert!(store.create_collection("../escape", 2).await.is_err());
        assert!(store.create_collection("", 2).await.is_err());
    }
}
