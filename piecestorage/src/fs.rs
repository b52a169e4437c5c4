// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fil_retrieval_runtime::config::FsPieceStorageConfig;
use log::debug;
use tempfile::NamedTempFile;

use crate::padreader::PieceReader;
use crate::storage::{check_resource_id, PieceStore, StorageStatus, StorageType};
use crate::PieceStorageError;

/// Pieces stored as flat files in one directory.
///
/// Writes land in a temporary file in the same directory and are renamed into
/// place, so a reader sees either the old piece or the complete new one.
/// Without a configured `max_size` the store reports `u64::MAX` capacity.
#[derive(Debug)]
pub struct FsPieceStore {
    name: String,
    root: PathBuf,
    read_only: bool,
    max_size: Option<u64>,
}

impl FsPieceStore {
    pub fn new(cfg: &FsPieceStorageConfig) -> Result<Self, PieceStorageError> {
        if !cfg.read_only {
            std::fs::create_dir_all(&cfg.path)?;
        }
        Ok(Self {
            name: cfg.name.clone(),
            root: cfg.path.clone(),
            read_only: cfg.read_only,
            max_size: cfg.max_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, resource_id: &str) -> Result<PathBuf, PieceStorageError> {
        check_resource_id(resource_id)?;
        Ok(self.root.join(resource_id))
    }

    fn not_found(&self, resource_id: &str) -> PieceStorageError {
        PieceStorageError::PieceNotFound {
            storage: self.name.clone(),
            piece: resource_id.to_string(),
        }
    }

    async fn open(&self, resource_id: &str) -> Result<std::fs::File, PieceStorageError> {
        let path = self.path_of(resource_id)?;
        match tokio::fs::File::open(&path).await {
            Ok(f) => Ok(f.into_std().await),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(self.not_found(resource_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn used(&self) -> Result<u64, PieceStorageError> {
        let mut used = 0u64;
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                used = used.saturating_add(meta.len());
            }
        }
        Ok(used)
    }
}

#[async_trait]
impl PieceStore for FsPieceStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Filesystem
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    async fn has(&self, resource_id: &str) -> Result<bool, PieceStorageError> {
        let path = self.path_of(resource_id)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn len(&self, resource_id: &str) -> Result<u64, PieceStorageError> {
        let path = self.path_of(resource_id)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(self.not_found(resource_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn reader(&self, resource_id: &str) -> Result<Box<dyn Read + Send>, PieceStorageError> {
        Ok(Box::new(self.open(resource_id).await?))
    }

    async fn seekable_reader(
        &self,
        resource_id: &str,
    ) -> Result<Box<dyn PieceReader>, PieceStorageError> {
        Ok(Box::new(self.open(resource_id).await?))
    }

    async fn save_to(
        &self,
        resource_id: &str,
        mut data: Box<dyn Read + Send>,
    ) -> Result<u64, PieceStorageError> {
        if self.read_only {
            return Err(PieceStorageError::ReadOnly(self.name.clone()));
        }
        let path = self.path_of(resource_id)?;
        let available = match self.max_size {
            // the piece being replaced frees its own bytes
            Some(max_size) => {
                let existing = self.len(resource_id).await.or_else(|e| match e {
                    PieceStorageError::PieceNotFound { .. } => Ok(0),
                    e => Err(e),
                })?;
                Some(max_size.saturating_sub(self.used().await?.saturating_sub(existing)))
            }
            None => None,
        };
        let root = self.root.clone();
        let name = self.name.clone();

        let written = tokio::task::spawn_blocking(move || -> Result<u64, PieceStorageError> {
            let mut tmp = NamedTempFile::new_in(&root)?;
            let written = io::copy(&mut data, &mut tmp)?;
            if let Some(available) = available.filter(|a| written > *a) {
                // dropping `tmp` removes the staged bytes
                return Err(PieceStorageError::InsufficientCapacity {
                    storage: name,
                    available,
                    required: written,
                });
            }
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(written)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        debug!("saved {} bytes of {} to storage {}", written, resource_id, self.name);
        Ok(written)
    }

    async fn status(&self) -> Result<StorageStatus, PieceStorageError> {
        let used = self.used().await?;
        let capacity = self.max_size.unwrap_or(u64::MAX);
        Ok(StorageStatus { capacity, available: capacity.saturating_sub(used) })
    }

    async fn list_resource_ids(&self) -> Result<Vec<String>, PieceStorageError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            // in-flight writes are dot-prefixed temp files
            if let Some(name) = entry.file_name().to_str().filter(|n| !n.starts_with('.')) {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
