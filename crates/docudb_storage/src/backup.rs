//! Backup and restore.
//!
//! Two backup forms are supported:
//!
//! - **Archive**: a single JSON file holding every document inline:
//!
//!   ```text
//!   {
//!     "metadata": {"timestamp", "source", "format", "compression", "collections": [...]},
//!     "collections": {"<name>": [<document>, ...]}
//!   }
//!   ```
//!
//! - **Directory**: a mirror of the `collections/`, `metadata/` and
//!   `indexes/` trees plus a `backup.json` file holding the archive metadata.
//!
//! Restore replays every document through [`StorageEngine::insert`], so the
//! restored files use the engine's own encoding regardless of how the backup
//! was written. Backups take no global lock; writes racing a backup may or
//! may not be captured.

use crate::engine::{
    decode_with, list_file_names, read_metadata_file, read_optional, StorageEngine,
};
use crate::error::{StorageError, StorageResult};
use crate::layout::{Layout, METADATA_SUFFIX};
use chrono::{DateTime, Utc};
use docudb_codec::{Document, DocumentCodec, StorageFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Name of the manifest inside a directory backup.
pub const BACKUP_MANIFEST: &str = "backup.json";

/// Header of a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// When the backup was taken.
    pub timestamp: DateTime<Utc>,
    /// Base path of the storage that was backed up.
    pub source: String,
    /// Document encoding of the source storage.
    pub format: StorageFormat,
    /// Whether the source storage compressed documents.
    pub compression: bool,
    /// Names of the collections in the backup.
    pub collections: Vec<String>,
}

/// A single-file backup with all documents inlined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupArchive {
    /// Backup header.
    pub metadata: BackupMetadata,
    /// Documents per collection.
    pub collections: BTreeMap<String, Vec<Document>>,
}

/// Which backup form was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Single JSON archive file.
    Archive,
    /// Mirrored directory tree.
    Directory,
}

/// Outcome of a backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSummary {
    /// Where the backup was written.
    pub path: PathBuf,
    /// Form of the backup.
    pub kind: BackupKind,
    /// Number of collections captured.
    pub collections: usize,
    /// Number of documents captured.
    pub documents: usize,
}

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Collections restored.
    pub collections: Vec<String>,
    /// Documents replayed.
    pub documents: usize,
}

impl StorageEngine {
    /// Backs up every collection to `path`.
    ///
    /// A path with a `.json` extension produces an archive; anything else a
    /// directory mirror.
    pub async fn backup(&self, path: impl AsRef<Path>) -> StorageResult<BackupSummary> {
        let path = path.as_ref();
        let summary = if is_archive_path(path) {
            self.backup_archive(path).await?
        } else {
            self.backup_directory(path).await?
        };
        info!(
            path = %path.display(),
            kind = ?summary.kind,
            collections = summary.collections,
            documents = summary.documents,
            "backup complete"
        );
        Ok(summary)
    }

    /// Restores from an archive file or a directory backup.
    ///
    /// Existing documents with the same id are overwritten; others are kept.
    pub async fn restore(&self, path: impl AsRef<Path>) -> StorageResult<RestoreReport> {
        let path = path.as_ref();
        let report = if fs::metadata(path).await?.is_dir() {
            self.restore_directory(path).await?
        } else {
            self.restore_archive(path).await?
        };
        info!(
            path = %path.display(),
            collections = report.collections.len(),
            documents = report.documents,
            "restore complete"
        );
        Ok(report)
    }

    fn backup_metadata(&self, collections: Vec<String>) -> BackupMetadata {
        BackupMetadata {
            timestamp: Utc::now(),
            source: self.layout().base().display().to_string(),
            format: self.codec().format(),
            compression: self.codec().compression(),
            collections,
        }
    }

    async fn backup_archive(&self, path: &Path) -> StorageResult<BackupSummary> {
        let names = self.list_collections().await?;
        let mut collections = BTreeMap::new();
        let mut documents = 0;
        for name in &names {
            let docs = self.list_documents(name, None, 0).await?;
            documents += docs.len();
            collections.insert(name.clone(), docs);
        }

        let archive = BackupArchive {
            metadata: self.backup_metadata(names),
            collections,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, serde_json::to_vec_pretty(&archive)?).await?;

        Ok(BackupSummary {
            path: path.to_path_buf(),
            kind: BackupKind::Archive,
            collections: archive.collections.len(),
            documents,
        })
    }

    async fn backup_directory(&self, path: &Path) -> StorageResult<BackupSummary> {
        let source = self.layout();
        let target = Layout::new(path);
        let names = self.list_collections().await?;

        fs::create_dir_all(target.metadata_dir()).await?;
        let mut documents = 0;
        for name in &names {
            documents +=
                copy_files(&source.collection_dir(name), &target.collection_dir(name)).await?;
            copy_files(&source.index_dir(name), &target.index_dir(name)).await?;
            if let Some(bytes) = read_optional(&source.metadata_path(name)).await? {
                fs::write(target.metadata_path(name), bytes).await?;
            }
        }

        let manifest = self.backup_metadata(names.clone());
        fs::write(
            path.join(BACKUP_MANIFEST),
            serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;

        Ok(BackupSummary {
            path: path.to_path_buf(),
            kind: BackupKind::Directory,
            collections: names.len(),
            documents,
        })
    }

    async fn restore_archive(&self, path: &Path) -> StorageResult<RestoreReport> {
        let bytes = fs::read(path).await?;
        let archive: BackupArchive = serde_json::from_slice(&bytes)
            .map_err(|err| StorageError::invalid_archive(format!("{}: {err}", path.display())))?;

        let mut report = RestoreReport::default();
        for (name, docs) in &archive.collections {
            self.create_collection(name).await?;
            for doc in docs {
                self.insert(name, doc).await?;
                report.documents += 1;
            }
            report.collections.push(name.clone());
        }
        Ok(report)
    }

    async fn restore_directory(&self, path: &Path) -> StorageResult<RestoreReport> {
        let source = Layout::new(path);
        let manifest_bytes = read_optional(&path.join(BACKUP_MANIFEST)).await?;
        let manifest: Option<BackupMetadata> = match manifest_bytes {
            Some(bytes) => Some(serde_json::from_slice(&bytes).map_err(|err| {
                StorageError::invalid_archive(format!("{BACKUP_MANIFEST}: {err}"))
            })?),
            None => None,
        };

        let mut names: Vec<String> = list_file_names(&source.metadata_dir())
            .await?
            .into_iter()
            .filter_map(|file| file.strip_suffix(METADATA_SUFFIX).map(str::to_string))
            .collect();
        names.sort();
        if names.is_empty() && manifest.is_none() {
            return Err(StorageError::invalid_archive(format!(
                "{} is not a backup directory",
                path.display()
            )));
        }

        let mut report = RestoreReport::default();
        for name in names {
            // Each collection is decoded with the encoding it was written in.
            let codec = match read_metadata_file(&source.metadata_path(&name)).await? {
                Some(meta) => DocumentCodec::new(meta.format, meta.compression),
                None => manifest
                    .as_ref()
                    .map_or(self.codec(), |m| DocumentCodec::new(m.format, m.compression)),
            };

            self.create_collection(&name).await?;
            let mut files = list_file_names(&source.collection_dir(&name)).await?;
            files.sort();
            for file in files {
                let Some(id) = codec.parse_file_name(&file) else {
                    continue;
                };
                let bytes = fs::read(source.collection_dir(&name).join(&file)).await?;
                let doc = decode_with(&codec, &name, id, &bytes)?;
                self.insert(&name, &doc).await?;
                report.documents += 1;
            }
            report.collections.push(name);
        }
        Ok(report)
    }
}

fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Copies the regular files of `from` into `to`. Returns the number copied.
async fn copy_files(from: &Path, to: &Path) -> StorageResult<usize> {
    let files = list_file_names(from).await?;
    fs::create_dir_all(to).await?;
    for file in &files {
        fs::copy(from.join(file), to.join(file)).await?;
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn populated(path: &Path, format: StorageFormat, compression: bool) -> StorageEngine {
        let engine = StorageEngine::new(
            StorageConfig::new(path)
                .format(format)
                .compression(compression),
        );
        engine.init().await.unwrap();
        for i in 0..3 {
            engine
                .insert("users", &doc(json!({"_id": format!("u{i}"), "age": 20 + i})))
                .await
                .unwrap();
        }
        for i in 0..2 {
            engine
                .insert("orders", &doc(json!({"_id": format!("o{i}"), "total": 9.5})))
                .await
                .unwrap();
        }
        engine
    }

    async fn snapshot(engine: &StorageEngine) -> BTreeMap<String, Vec<Document>> {
        let mut all = BTreeMap::new();
        for name in engine.list_collections().await.unwrap() {
            let docs = engine.list_documents(&name, None, 0).await.unwrap();
            all.insert(name, docs);
        }
        all
    }

    #[tokio::test]
    async fn archive_roundtrip() {
        let src = tempdir().unwrap();
        let engine = populated(src.path(), StorageFormat::Binary, true).await;
        let archive_path = src.path().join("out/backup.json");

        let summary = engine.backup(&archive_path).await.unwrap();
        assert_eq!(summary.kind, BackupKind::Archive);
        assert_eq!(summary.collections, 2);
        assert_eq!(summary.documents, 5);

        let raw: Value = serde_json::from_slice(&std::fs::read(&archive_path).unwrap()).unwrap();
        assert_eq!(raw["metadata"]["format"], "binary");
        assert_eq!(raw["metadata"]["compression"], true);
        assert_eq!(raw["collections"]["users"].as_array().unwrap().len(), 3);

        let dst = tempdir().unwrap();
        let restored = StorageEngine::new(StorageConfig::new(dst.path()));
        restored.init().await.unwrap();
        let report = restored.restore(&archive_path).await.unwrap();
        assert_eq!(report.documents, 5);
        assert_eq!(report.collections, vec!["orders", "users"]);
        assert_eq!(snapshot(&restored).await, snapshot(&engine).await);
        assert_eq!(restored.count("users").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn directory_roundtrip_across_formats() {
        let src = tempdir().unwrap();
        let engine = populated(src.path(), StorageFormat::Hybrid, false).await;
        let backup_dir = tempdir().unwrap();
        let target = backup_dir.path().join("mirror");

        let summary = engine.backup(&target).await.unwrap();
        assert_eq!(summary.kind, BackupKind::Directory);
        assert_eq!(summary.documents, 5);
        assert!(target.join("collections/users/u0.hybrid").is_file());
        assert!(target.join("metadata/users.meta.json").is_file());
        assert!(target.join(BACKUP_MANIFEST).is_file());

        let dst = tempdir().unwrap();
        let restored = StorageEngine::new(
            StorageConfig::new(dst.path())
                .format(StorageFormat::Json)
                .compression(true),
        );
        restored.init().await.unwrap();
        let report = restored.restore(&target).await.unwrap();
        assert_eq!(report.documents, 5);
        assert!(dst.path().join("collections/users/u0.json.gz").is_file());
        assert_eq!(snapshot(&restored).await, snapshot(&engine).await);
    }

    #[tokio::test]
    async fn restore_rejects_garbage() {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::new(StorageConfig::new(dir.path().join("db")));
        engine.init().await.unwrap();

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, b"{\"not\": \"an archive\"}").unwrap();
        assert!(matches!(
            engine.restore(&bad).await,
            Err(StorageError::InvalidArchive { .. })
        ));

        let empty = dir.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        assert!(matches!(
            engine.restore(&empty).await,
            Err(StorageError::InvalidArchive { .. })
        ));
    }
}
