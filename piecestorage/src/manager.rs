// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::{Arc, RwLock};

use fil_retrieval_runtime::config::PieceStorageConfig;
use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::fs::FsPieceStore;
use crate::storage::{PieceStore, StorageInfo};
use crate::PieceStorageError;

/// Routes piece reads and writes across the configured storages.
///
/// Storages keep the order they were added in. Lookups work on a snapshot of
/// the storage list, so no lock is held while a storage is probed.
#[derive(Default)]
pub struct PieceStorageManager {
    storages: RwLock<IndexMap<String, Arc<dyn PieceStore>>>,
}

impl PieceStorageManager {
    /// Builds the manager from the filesystem storages in `cfg`.
    pub fn new(cfg: &PieceStorageConfig) -> Result<Self, PieceStorageError> {
        let mgr = Self::default();
        for fs_cfg in &cfg.fs {
            mgr.add_piece_storage(Arc::new(FsPieceStore::new(fs_cfg)?))?;
        }
        Ok(mgr)
    }

    pub fn with_storages(
        storages: impl IntoIterator<Item = Arc<dyn PieceStore>>,
    ) -> Result<Self, PieceStorageError> {
        let mgr = Self::default();
        for storage in storages {
            mgr.add_piece_storage(storage)?;
        }
        Ok(mgr)
    }

    /// Registers a storage. Names are unique.
    pub fn add_piece_storage(&self, storage: Arc<dyn PieceStore>) -> Result<(), PieceStorageError> {
        let mut storages = self.storages.write().unwrap_or_else(|e| e.into_inner());
        let name = storage.name().to_string();
        if storages.contains_key(&name) {
            return Err(PieceStorageError::StorageExists(name));
        }
        info!(
            "add piece storage {} ({}, read only: {})",
            name,
            storage.storage_type(),
            storage.read_only()
        );
        storages.insert(name, storage);
        Ok(())
    }

    pub fn remove_piece_storage(&self, name: &str) -> Result<(), PieceStorageError> {
        let mut storages = self.storages.write().unwrap_or_else(|e| e.into_inner());
        match storages.shift_remove(name) {
            Some(_) => {
                info!("remove piece storage {}", name);
                Ok(())
            }
            None => Err(PieceStorageError::StorageNotFound(name.to_string())),
        }
    }

    pub fn get_piece_storage_by_name(
        &self,
        name: &str,
    ) -> Result<Arc<dyn PieceStore>, PieceStorageError> {
        self.storages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| PieceStorageError::StorageNotFound(name.to_string()))
    }

    fn snapshot(&self) -> Vec<Arc<dyn PieceStore>> {
        self.storages.read().unwrap_or_else(|e| e.into_inner()).values().cloned().collect()
    }

    /// Returns the first storage, in configured order, that holds the piece.
    /// A storage that fails to answer is skipped.
    pub async fn find_storage_for_read(
        &self,
        resource_id: &str,
    ) -> Result<Arc<dyn PieceStore>, PieceStorageError> {
        for storage in self.snapshot() {
            match storage.has(resource_id).await {
                Ok(true) => {
                    debug!("found piece {} in storage {}", resource_id, storage.name());
                    return Ok(storage);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("check piece {} in storage {}: {}", resource_id, storage.name(), e)
                }
            }
        }
        Err(PieceStorageError::NotFoundForRead(resource_id.to_string()))
    }

    /// Returns the writable storage with the most available capacity among
    /// those with at least `size` bytes available. Ties keep configured order.
    pub async fn find_storage_for_write(
        &self,
        size: u64,
    ) -> Result<Arc<dyn PieceStore>, PieceStorageError> {
        let mut best: Option<(u64, Arc<dyn PieceStore>)> = None;
        for storage in self.snapshot() {
            if storage.read_only() {
                continue;
            }
            let status = match storage.status().await {
                Ok(status) => status,
                Err(e) => {
                    warn!("get status of storage {}: {}", storage.name(), e);
                    continue;
                }
            };
            if status.available < size {
                continue;
            }
            if best.as_ref().map_or(true, |(available, _)| status.available > *available) {
                best = Some((status.available, storage));
            }
        }
        best.map(|(_, storage)| storage).ok_or(PieceStorageError::NoStorageForWrite(size))
    }

    pub async fn list_storage_infos(&self) -> Result<Vec<StorageInfo>, PieceStorageError> {
        let mut infos = Vec::new();
        for storage in self.snapshot() {
            let status = storage.status().await?;
            infos.push(StorageInfo {
                name: storage.name().to_string(),
                storage_type: storage.storage_type(),
                read_only: storage.read_only(),
                capacity: status.capacity,
                available: status.available,
            });
        }
        Ok(infos)
    }
}
