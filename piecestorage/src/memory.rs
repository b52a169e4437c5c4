// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io::{self, Cursor, Read};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::padreader::PieceReader;
use crate::storage::{check_resource_id, PieceStore, StorageStatus, StorageType};
use crate::PieceStorageError;

/// Pieces held in process memory, bounded by a fixed capacity.
pub struct MemPieceStore {
    name: String,
    capacity: u64,
    read_only: bool,
    redirect_base: Option<String>,
    pieces: RwLock<IndexMap<String, Arc<[u8]>>>,
}

impl MemPieceStore {
    pub fn new(name: impl Into<String>, capacity: u64) -> Self {
        Self {
            name: name.into(),
            capacity,
            read_only: false,
            redirect_base: None,
            pieces: RwLock::new(IndexMap::new()),
        }
    }

    pub fn with_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Pieces become fetchable at `<base>/<resource id>`.
    pub fn with_redirect(mut self, base: impl Into<String>) -> Self {
        self.redirect_base = Some(base.into());
        self
    }

    /// Inserts a piece directly, bypassing the read-only flag and capacity.
    pub fn insert(&self, resource_id: impl Into<String>, data: impl Into<Vec<u8>>) {
        let data: Vec<u8> = data.into();
        self.write().insert(resource_id.into(), data.into());
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<String, Arc<[u8]>>> {
        self.pieces.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<String, Arc<[u8]>>> {
        self.pieces.write().unwrap_or_else(|e| e.into_inner())
    }

    fn get(&self, resource_id: &str) -> Result<Arc<[u8]>, PieceStorageError> {
        self.read().get(resource_id).cloned().ok_or_else(|| PieceStorageError::PieceNotFound {
            storage: self.name.clone(),
            piece: resource_id.to_string(),
        })
    }

    fn used(&self) -> u64 {
        self.read().values().map(|p| p.len() as u64).sum()
    }
}

#[async_trait]
impl PieceStore for MemPieceStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Memory
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    async fn has(&self, resource_id: &str) -> Result<bool, PieceStorageError> {
        Ok(self.read().contains_key(resource_id))
    }

    async fn len(&self, resource_id: &str) -> Result<u64, PieceStorageError> {
        Ok(self.get(resource_id)?.len() as u64)
    }

    async fn reader(&self, resource_id: &str) -> Result<Box<dyn Read + Send>, PieceStorageError> {
        Ok(Box::new(Cursor::new(self.get(resource_id)?)))
    }

    async fn seekable_reader(
        &self,
        resource_id: &str,
    ) -> Result<Box<dyn PieceReader>, PieceStorageError> {
        Ok(Box::new(Cursor::new(self.get(resource_id)?)))
    }

    async fn redirect_url(&self, resource_id: &str) -> Result<String, PieceStorageError> {
        let base = self.redirect_base.as_ref().ok_or(PieceStorageError::UnsupportedRedirect)?;
        self.get(resource_id)?;
        Ok(format!("{}/{}", base.trim_end_matches('/'), resource_id))
    }

    async fn save_to(
        &self,
        resource_id: &str,
        mut data: Box<dyn Read + Send>,
    ) -> Result<u64, PieceStorageError> {
        if self.read_only {
            return Err(PieceStorageError::ReadOnly(self.name.clone()));
        }
        check_resource_id(resource_id)?;

        let buf = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
            let mut buf = Vec::new();
            data.read_to_end(&mut buf)?;
            Ok(buf)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
        let required = buf.len() as u64;

        let mut pieces = self.write();
        let used: u64 = pieces
            .iter()
            .filter(|(id, _)| id.as_str() != resource_id)
            .map(|(_, p)| p.len() as u64)
            .sum();
        let available = self.capacity.saturating_sub(used);
        if required > available {
            return Err(PieceStorageError::InsufficientCapacity {
                storage: self.name.clone(),
                available,
                required,
            });
        }
        pieces.insert(resource_id.to_string(), buf.into());
        Ok(required)
    }

    async fn status(&self) -> Result<StorageStatus, PieceStorageError> {
        Ok(StorageStatus {
            capacity: self.capacity,
            available: self.capacity.saturating_sub(self.used()),
        })
    }

    async fn list_resource_ids(&self) -> Result<Vec<String>, PieceStorageError> {
        Ok(self.read().keys().cloned().collect())
    }
}
