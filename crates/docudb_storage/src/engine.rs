//! File-per-document storage engine.

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::layout::{validate_name, Layout, INDEX_SUFFIX, METADATA_SUFFIX};
use crate::metadata::CollectionMetadata;
use docudb_codec::{CodecError, Document, DocumentCodec, ID_FIELD};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Persists documents as individual files under per-collection directories.
///
/// The engine is independent of any in-memory representation: every call
/// goes to the file system. Missing files are reported as `None`/`false`,
/// never as errors.
///
/// # Concurrency
///
/// Document writes, deletes and collection creation share one engine-wide
/// lock, held from the existence check through the metadata counter
/// update, so document counts stay exact. Two concurrent writes of the
/// same document end with whichever took the lock last. Reads never take
/// the lock.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> docudb_storage::StorageResult<()> {
/// use docudb_storage::{StorageConfig, StorageEngine};
/// use serde_json::json;
///
/// let engine = StorageEngine::new(StorageConfig::new("data"));
/// engine.init().await?;
/// engine.create_collection("users").await?;
///
/// let doc = json!({"_id": "u1", "name": "Alice"}).as_object().cloned().unwrap();
/// engine.insert("users", &doc).await?;
/// assert!(engine.find_by_id("users", "u1").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StorageEngine {
    config: StorageConfig,
    codec: DocumentCodec,
    layout: Layout,
    metadata_lock: Mutex<()>,
}

impl StorageEngine {
    /// Creates an engine. Nothing touches the disk until [`init`](Self::init).
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        Self {
            codec: config.codec(),
            layout: Layout::new(config.base_path.clone()),
            config,
            metadata_lock: Mutex::new(()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns the directory layout.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the document codec.
    #[must_use]
    pub fn codec(&self) -> DocumentCodec {
        self.codec
    }

    /// Creates the base directory layout.
    pub async fn init(&self) -> StorageResult<()> {
        fs::create_dir_all(self.layout.collections_dir()).await?;
        fs::create_dir_all(self.layout.metadata_dir()).await?;
        fs::create_dir_all(self.layout.indexes_dir()).await?;
        debug!(
            base = %self.layout.base().display(),
            format = %self.codec.format(),
            compression = self.codec.compression(),
            "storage initialized"
        );
        Ok(())
    }

    /// Creates a collection directory and its metadata file.
    ///
    /// Returns the existing metadata when the collection already exists.
    pub async fn create_collection(&self, name: &str) -> StorageResult<CollectionMetadata> {
        validate_name("collection", name)?;
        let _guard = self.metadata_lock.lock().await;
        self.ensure_collection(name).await
    }

    async fn ensure_collection(&self, name: &str) -> StorageResult<CollectionMetadata> {
        fs::create_dir_all(self.layout.collection_dir(name)).await?;
        if let Some(meta) = self.read_metadata(name).await? {
            return Ok(meta);
        }
        let meta = CollectionMetadata::new(name, self.codec.format(), self.codec.compression());
        self.write_metadata(&meta).await?;
        debug!(collection = name, "collection created");
        Ok(meta)
    }

    /// Returns true if the collection has a metadata file.
    pub async fn collection_exists(&self, name: &str) -> StorageResult<bool> {
        validate_name("collection", name)?;
        Ok(fs::try_exists(self.layout.metadata_path(name)).await?)
    }

    /// Lists collection names, sorted.
    pub async fn list_collections(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = list_file_names(&self.layout.metadata_dir())
            .await?
            .into_iter()
            .filter_map(|file| file.strip_suffix(METADATA_SUFFIX).map(str::to_string))
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Reads a collection's metadata.
    pub async fn metadata(&self, name: &str) -> StorageResult<Option<CollectionMetadata>> {
        validate_name("collection", name)?;
        self.read_metadata(name).await
    }

    /// Returns the document count recorded in metadata.
    pub async fn count(&self, name: &str) -> StorageResult<usize> {
        Ok(self
            .metadata(name)
            .await?
            .map_or(0, |meta| meta.document_count))
    }

    /// Writes a new document.
    pub async fn insert(&self, collection: &str, doc: &Document) -> StorageResult<()> {
        self.write_document(collection, doc).await
    }

    /// Rewrites an existing document. Behaves as insert when the file is missing.
    pub async fn update(&self, collection: &str, doc: &Document) -> StorageResult<()> {
        self.write_document(collection, doc).await
    }

    async fn write_document(&self, collection: &str, doc: &Document) -> StorageResult<()> {
        validate_name("collection", collection)?;
        let id = document_id(doc)?;
        validate_name("document", id)?;

        let bytes = self.codec.encode(doc)?;
        let path = self.document_path(collection, id);

        let _guard = self.metadata_lock.lock().await;
        let mut meta = self.ensure_collection(collection).await?;
        let existed = fs::try_exists(&path).await?;
        write_atomic(&path, &bytes).await?;
        if !existed {
            meta.adjust_count(1);
            self.write_metadata(&meta).await?;
        }
        Ok(())
    }

    /// Reads a document by id.
    pub async fn find_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        validate_name("collection", collection)?;
        validate_name("document", id)?;
        let path = self.document_path(collection, id);
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };
        self.decode_document(collection, id, &bytes).map(Some)
    }

    /// Lists document ids in file-name order.
    pub async fn list_document_ids(&self, collection: &str) -> StorageResult<Vec<String>> {
        validate_name("collection", collection)?;
        let mut files: Vec<String> = list_file_names(&self.layout.collection_dir(collection))
            .await?
            .into_iter()
            .filter(|file| self.codec.parse_file_name(file).is_some())
            .collect();
        files.sort();
        Ok(files
            .iter()
            .filter_map(|file| self.codec.parse_file_name(file).map(str::to_string))
            .collect())
    }

    /// Reads documents in file-name order, skipping `offset` and returning at most `limit`.
    ///
    /// Files that are not documents in the configured encoding are ignored.
    pub async fn list_documents(
        &self,
        collection: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> StorageResult<Vec<Document>> {
        let ids = self.list_document_ids(collection).await?;
        let page = ids.iter().skip(offset).take(limit.unwrap_or(usize::MAX));

        let mut docs = Vec::new();
        for id in page {
            let path = self.document_path(collection, id);
            // A file removed between listing and reading is skipped.
            if let Some(bytes) = read_optional(&path).await? {
                docs.push(self.decode_document(collection, id, &bytes)?);
            }
        }
        Ok(docs)
    }

    /// Deletes a document file. Returns false if it did not exist.
    pub async fn delete(&self, collection: &str, id: &str) -> StorageResult<bool> {
        validate_name("collection", collection)?;
        validate_name("document", id)?;
        let path = self.document_path(collection, id);

        let _guard = self.metadata_lock.lock().await;
        if !remove_optional(&path).await? {
            return Ok(false);
        }
        if let Some(mut meta) = self.read_metadata(collection).await? {
            meta.adjust_count(-1);
            self.write_metadata(&meta).await?;
        }
        Ok(true)
    }

    /// Removes a collection's documents, metadata and index files.
    ///
    /// Returns false if nothing existed.
    pub async fn drop_collection(&self, name: &str) -> StorageResult<bool> {
        validate_name("collection", name)?;
        let _guard = self.metadata_lock.lock().await;
        let docs = remove_dir_optional(&self.layout.collection_dir(name)).await?;
        let meta = remove_optional(&self.layout.metadata_path(name)).await?;
        let indexes = remove_dir_optional(&self.layout.index_dir(name)).await?;
        let existed = docs || meta || indexes;
        if existed {
            debug!(collection = name, "collection dropped from storage");
        }
        Ok(existed)
    }

    /// Path of the index file for `(collection, field)`.
    pub fn index_path(&self, collection: &str, field: &str) -> StorageResult<PathBuf> {
        validate_name("collection", collection)?;
        validate_name("index", field)?;
        Ok(self.layout.index_path(collection, field))
    }

    /// Writes an index file.
    pub async fn write_index_file(
        &self,
        collection: &str,
        field: &str,
        bytes: &[u8],
    ) -> StorageResult<()> {
        let path = self.index_path(collection, field)?;
        fs::create_dir_all(self.layout.index_dir(collection)).await?;
        write_atomic(&path, bytes).await
    }

    /// Reads an index file, `None` if missing.
    pub async fn read_index_file(
        &self,
        collection: &str,
        field: &str,
    ) -> StorageResult<Option<Vec<u8>>> {
        read_optional(&self.index_path(collection, field)?).await
    }

    /// Deletes an index file. Returns false if it did not exist.
    pub async fn delete_index_file(&self, collection: &str, field: &str) -> StorageResult<bool> {
        remove_optional(&self.index_path(collection, field)?).await
    }

    /// Lists the fields that have an index file for `collection`, sorted.
    pub async fn list_index_files(&self, collection: &str) -> StorageResult<Vec<String>> {
        validate_name("collection", collection)?;
        let mut fields: Vec<String> = list_file_names(&self.layout.index_dir(collection))
            .await?
            .into_iter()
            .filter_map(|file| file.strip_suffix(INDEX_SUFFIX).map(str::to_string))
            .filter(|field| !field.is_empty())
            .collect();
        fields.sort();
        Ok(fields)
    }

    pub(crate) fn document_path(&self, collection: &str, id: &str) -> PathBuf {
        self.layout
            .collection_dir(collection)
            .join(self.codec.file_name(id))
    }

    pub(crate) fn decode_document(
        &self,
        collection: &str,
        id: &str,
        bytes: &[u8],
    ) -> StorageResult<Document> {
        decode_with(&self.codec, collection, id, bytes)
    }

    async fn read_metadata(&self, name: &str) -> StorageResult<Option<CollectionMetadata>> {
        read_metadata_file(&self.layout.metadata_path(name)).await
    }

    async fn write_metadata(&self, meta: &CollectionMetadata) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(meta)?;
        write_atomic(&self.layout.metadata_path(&meta.name), &bytes).await
    }
}

pub(crate) fn decode_with(
    codec: &DocumentCodec,
    collection: &str,
    id: &str,
    bytes: &[u8],
) -> StorageResult<Document> {
    codec.decode(bytes).map_err(|source| {
        if source.is_corruption() {
            warn!(collection, id, error = %source, "corrupted document file");
        }
        StorageError::Document {
            collection: collection.to_string(),
            id: id.to_string(),
            source,
        }
    })
}

pub(crate) async fn read_metadata_file(path: &Path) -> StorageResult<Option<CollectionMetadata>> {
    match read_optional(path).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Returns the string `_id` of a document.
pub fn document_id(doc: &Document) -> StorageResult<&str> {
    doc.get(ID_FIELD)
        .and_then(|id| id.as_str())
        .ok_or_else(|| CodecError::invalid_document("document has no string _id").into())
}

/// Writes through a temporary sibling file and renames it into place.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut temp = OsString::from(path.as_os_str());
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    fs::write(&temp, bytes).await?;
    fs::rename(&temp, path).await?;
    Ok(())
}

pub(crate) async fn read_optional(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn remove_optional(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

async fn remove_dir_optional(path: &Path) -> StorageResult<bool> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Names of the regular files directly inside `dir`; empty if `dir` is missing.
pub(crate) async fn list_file_names(dir: &Path) -> StorageResult<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docudb_codec::checksum::CHECKSUM_LEN;
    use docudb_codec::StorageFormat;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn engine(path: &Path, format: StorageFormat, compression: bool) -> StorageEngine {
        let engine = StorageEngine::new(
            StorageConfig::new(path)
                .format(format)
                .compression(compression),
        );
        engine.init().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn init_creates_layout() {
        let dir = tempdir().unwrap();
        engine(dir.path(), StorageFormat::Json, false).await;
        assert!(dir.path().join("collections").is_dir());
        assert!(dir.path().join("metadata").is_dir());
        assert!(dir.path().join("indexes").is_dir());
    }

    #[tokio::test]
    async fn create_collection_writes_metadata() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), StorageFormat::Binary, true).await;

        let meta = engine.create_collection("users").await.unwrap();
        assert_eq!(meta.format, StorageFormat::Binary);
        assert!(meta.compression);
        assert!(dir.path().join("collections/users").is_dir());
        assert!(dir.path().join("metadata/users.meta.json").is_file());

        let again = engine.create_collection("users").await.unwrap();
        assert_eq!(again.created, meta.created);
        assert_eq!(engine.list_collections().await.unwrap(), vec!["users"]);
    }

    #[tokio::test]
    async fn insert_find_delete_every_format() {
        for format in StorageFormat::ALL {
            for compression in [false, true] {
                let dir = tempdir().unwrap();
                let engine = engine(dir.path(), format, compression).await;
                let d = doc(json!({"_id": "a", "n": 1, "big": "z".repeat(2000)}));

                engine.insert("c", &d).await.unwrap();
                let file = dir
                    .path()
                    .join("collections/c")
                    .join(engine.codec().file_name("a"));
                assert!(file.is_file(), "{}", file.display());
                assert_eq!(engine.find_by_id("c", "a").await.unwrap(), Some(d));
                assert_eq!(engine.count("c").await.unwrap(), 1);

                assert!(engine.delete("c", "a").await.unwrap());
                assert!(!engine.delete("c", "a").await.unwrap());
                assert_eq!(engine.find_by_id("c", "a").await.unwrap(), None);
                assert_eq!(engine.count("c").await.unwrap(), 0);
            }
        }
    }

    #[tokio::test]
    async fn update_does_not_double_count() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), StorageFormat::Json, false).await;
        engine.insert("c", &doc(json!({"_id": "a", "v": 1}))).await.unwrap();
        engine.update("c", &doc(json!({"_id": "a", "v": 2}))).await.unwrap();

        assert_eq!(engine.count("c").await.unwrap(), 1);
        let found = engine.find_by_id("c", "a").await.unwrap().unwrap();
        assert_eq!(found["v"], 2);
    }

    #[tokio::test]
    async fn missing_things_are_not_errors() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), StorageFormat::Json, false).await;
        assert_eq!(engine.find_by_id("nope", "x").await.unwrap(), None);
        assert!(engine.list_documents("nope", None, 0).await.unwrap().is_empty());
        assert!(!engine.delete("nope", "x").await.unwrap());
        assert!(!engine.drop_collection("nope").await.unwrap());
        assert_eq!(engine.metadata("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_documents_paginates_by_file_name() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), StorageFormat::Json, false).await;
        for id in ["d", "b", "a", "c", "e"] {
            engine.insert("c", &doc(json!({"_id": id}))).await.unwrap();
        }
        std::fs::write(dir.path().join("collections/c/notes.txt"), b"x").unwrap();

        let page = engine.list_documents("c", Some(2), 1).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|d| d["_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let all = engine.list_documents("c", None, 0).await.unwrap();
        assert_eq!(all.len(), 5);
        assert!(engine.list_documents("c", None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupted_binary_file_fails_the_read() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), StorageFormat::Binary, false).await;
        engine.insert("c", &doc(json!({"_id": "a", "v": "hello"}))).await.unwrap();

        let path = dir.path().join("collections/c/a.bin");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[CHECKSUM_LEN + 3] ^= 0x04;
        std::fs::write(&path, bytes).unwrap();

        let err = engine.find_by_id("c", "a").await.unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("'a'"));
        assert!(engine.list_documents("c", None, 0).await.is_err());
    }

    #[tokio::test]
    async fn drop_collection_removes_everything() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), StorageFormat::Json, false).await;
        engine.insert("c", &doc(json!({"_id": "a"}))).await.unwrap();
        engine.write_index_file("c", "_id", b"{}").await.unwrap();

        assert!(engine.drop_collection("c").await.unwrap());
        assert!(!dir.path().join("collections/c").exists());
        assert!(!dir.path().join("metadata/c.meta.json").exists());
        assert!(!dir.path().join("indexes/c").exists());
        assert!(!engine.collection_exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn index_files() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), StorageFormat::Json, false).await;
        engine.write_index_file("c", "email", b"one").await.unwrap();
        engine.write_index_file("c", "a.b", b"two").await.unwrap();

        assert!(dir.path().join("indexes/c/email.idx").is_file());
        assert_eq!(engine.list_index_files("c").await.unwrap(), vec!["a.b", "email"]);
        assert_eq!(
            engine.read_index_file("c", "email").await.unwrap(),
            Some(b"one".to_vec())
        );
        assert!(engine.delete_index_file("c", "email").await.unwrap());
        assert_eq!(engine.read_index_file("c", "email").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_unsafe_names_and_missing_ids() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), StorageFormat::Json, false).await;
        assert!(matches!(
            engine.insert("../x", &doc(json!({"_id": "a"}))).await,
            Err(StorageError::InvalidName { .. })
        ));
        assert!(matches!(
            engine.insert("c", &doc(json!({"_id": "a/b"}))).await,
            Err(StorageError::InvalidName { .. })
        ));
        assert!(matches!(
            engine.insert("c", &doc(json!({"name": "no id"}))).await,
            Err(StorageError::Codec(_))
        ));
    }
}
