// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;
use std::io::Read;

use async_trait::async_trait;

use crate::padreader::PieceReader;
use crate::PieceStorageError;

/// URL scheme of the transfer endpoints handed to the unseal service.
pub const PIECE_TRANSFER_SCHEME: &str = "market";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Filesystem,
    Memory,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Filesystem => f.write_str("fs"),
            StorageType::Memory => f.write_str("memory"),
        }
    }
}

/// Capacity of a storage in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStatus {
    pub capacity: u64,
    pub available: u64,
}

/// Summary of a configured storage, as listed by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    pub name: String,
    pub storage_type: StorageType,
    pub read_only: bool,
    pub capacity: u64,
    pub available: u64,
}

/// A named backend holding pieces keyed by resource ID (a piece CID string).
///
/// Implementations are shared between deals and must tolerate concurrent calls.
#[async_trait]
pub trait PieceStore: Send + Sync {
    fn name(&self) -> &str;

    fn storage_type(&self) -> StorageType;

    fn read_only(&self) -> bool;

    async fn has(&self, resource_id: &str) -> Result<bool, PieceStorageError>;

    /// Length in bytes of the stored resource.
    async fn len(&self, resource_id: &str) -> Result<u64, PieceStorageError>;

    /// Sequential access to the resource.
    async fn reader(&self, resource_id: &str) -> Result<Box<dyn Read + Send>, PieceStorageError>;

    /// Random access to the resource.
    async fn seekable_reader(
        &self,
        resource_id: &str,
    ) -> Result<Box<dyn PieceReader>, PieceStorageError>;

    /// A URL the resource can be fetched from directly, bypassing this process.
    async fn redirect_url(&self, _resource_id: &str) -> Result<String, PieceStorageError> {
        Err(PieceStorageError::UnsupportedRedirect)
    }

    /// Writes `data` under `resource_id`, replacing any previous content.
    /// Returns the number of bytes written.
    async fn save_to(
        &self,
        resource_id: &str,
        data: Box<dyn Read + Send>,
    ) -> Result<u64, PieceStorageError>;

    /// Endpoint a remote unseal service pushes the piece into.
    async fn piece_transfer(&self, resource_id: &str) -> Result<String, PieceStorageError> {
        if self.read_only() {
            return Err(PieceStorageError::ReadOnly(self.name().to_string()));
        }
        Ok(format!("{}://{}/{}", PIECE_TRANSFER_SCHEME, self.name(), resource_id))
    }

    async fn status(&self) -> Result<StorageStatus, PieceStorageError>;

    async fn list_resource_ids(&self) -> Result<Vec<String>, PieceStorageError>;
}

/// Resource IDs name flat entries; they may not be empty or address other paths.
pub(crate) fn check_resource_id(resource_id: &str) -> Result<(), PieceStorageError> {
    if resource_id.is_empty()
        || resource_id == "."
        || resource_id == ".."
        || resource_id.contains(['/', '\\'])
    {
        return Err(PieceStorageError::InvalidResourceId(resource_id.to_string()));
    }
    Ok(())
}
