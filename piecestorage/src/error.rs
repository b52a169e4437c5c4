// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io;

use fil_retrieval_runtime::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PieceStorageError {
    #[error("unable to find piece {0} in any storage")]
    NotFoundForRead(String),
    #[error("unable to find storage with {0} bytes available for write")]
    NoStorageForWrite(u64),
    #[error("redirect is not supported by this storage")]
    UnsupportedRedirect,
    #[error("piece {piece} not found in storage {storage}")]
    PieceNotFound { storage: String, piece: String },
    #[error("piece storage {0} not found")]
    StorageNotFound(String),
    #[error("piece storage {0} already exists")]
    StorageExists(String),
    #[error("piece storage {0} is read only")]
    ReadOnly(String),
    #[error("piece storage {storage} has {available} bytes available, {required} required")]
    InsufficientCapacity { storage: String, available: u64, required: u64 },
    #[error("invalid resource id {0:?}")]
    InvalidResourceId(String),
    #[error("invalid piece size: {0}")]
    InvalidPieceSize(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PieceStorageError {
    /// Absence of a piece or storage. Callers fall back rather than fail.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PieceStorageError::NotFoundForRead(_)
                | PieceStorageError::PieceNotFound { .. }
                | PieceStorageError::StorageNotFound(_)
        )
    }
}

impl From<PieceStorageError> for ProviderError {
    fn from(e: PieceStorageError) -> Self {
        let msg = e.to_string();
        match e {
            e if e.is_not_found() => ProviderError::not_found(msg),
            PieceStorageError::NoStorageForWrite(_)
            | PieceStorageError::ReadOnly(_)
            | PieceStorageError::StorageExists(_)
            | PieceStorageError::InsufficientCapacity { .. } => ProviderError::illegal_state(msg),
            PieceStorageError::UnsupportedRedirect
            | PieceStorageError::InvalidResourceId(_)
            | PieceStorageError::InvalidPieceSize(_) => ProviderError::illegal_argument(msg),
            _ => ProviderError::unspecified(msg),
        }
    }
}
