// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Transport independent handling of piece resource requests. An HTTP layer maps
//! GET to [`PieceStorageServer::fetch`], PUT to [`PieceStorageServer::store`] and
//! [`ResourceError::status_code`] to the response status.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use log::error;
use thiserror::Error;

use crate::manager::PieceStorageManager;
use crate::PieceStorageError;

pub enum Resource {
    /// The resource is served elsewhere.
    Redirect(String),
    Stream { len: u64, reader: Box<dyn Read + Send> },
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Redirect(url) => f.debug_tuple("Redirect").field(url).finish(),
            Resource::Stream { len, .. } => f.debug_struct("Stream").field("len", len).finish(),
        }
    }
}

/// Where a stored resource goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// A storage picked by name.
    Named(String),
    /// Any writable storage with room for this many bytes.
    SizeHint(u64),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResourceError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ResourceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ResourceError::BadRequest(_) => 400,
            ResourceError::NotFound(_) => 404,
            ResourceError::Internal(_) => 500,
        }
    }
}

fn fail(err: ResourceError) -> ResourceError {
    error!("resource request fail code: {}, message: {}", err.status_code(), err);
    err
}

pub struct PieceStorageServer {
    piece_storage_mgr: Arc<PieceStorageManager>,
}

impl PieceStorageServer {
    pub fn new(piece_storage_mgr: Arc<PieceStorageManager>) -> Self {
        Self { piece_storage_mgr }
    }

    /// Locates a resource, preferring a redirect over streaming it.
    pub async fn fetch(&self, resource_id: &str) -> Result<Resource, ResourceError> {
        if resource_id.is_empty() {
            return Err(fail(ResourceError::BadRequest("resource is empty".into())));
        }

        let storage = self.piece_storage_mgr.find_storage_for_read(resource_id).await.map_err(
            |_| fail(ResourceError::NotFound(format!("resource {} not found", resource_id))),
        )?;

        match storage.redirect_url(resource_id).await {
            Ok(url) => return Ok(Resource::Redirect(url)),
            Err(PieceStorageError::UnsupportedRedirect) => {}
            Err(e) => {
                return Err(fail(ResourceError::Internal(format!(
                    "fail to get redirect url of piece {}: {}",
                    resource_id, e
                ))))
            }
        }

        let len = storage.len(resource_id).await.map_err(|e| {
            fail(ResourceError::Internal(format!("call len for {}: {}", resource_id, e)))
        })?;
        let reader = storage.reader(resource_id).await.map_err(|e| {
            fail(ResourceError::Internal(format!(
                "failed to open reader for {}: {}",
                resource_id, e
            )))
        })?;
        Ok(Resource::Stream { len, reader })
    }

    /// Saves `body` as `resource_id`, returning the number of bytes written.
    pub async fn store(
        &self,
        resource_id: &str,
        target: StoreTarget,
        body: Box<dyn Read + Send>,
    ) -> Result<u64, ResourceError> {
        if resource_id.is_empty() {
            return Err(fail(ResourceError::BadRequest("resource is empty".into())));
        }

        let storage = match &target {
            StoreTarget::Named(name) => {
                self.piece_storage_mgr.get_piece_storage_by_name(name).map_err(|e| {
                    fail(ResourceError::Internal(format!("fail to get store {}: {}", name, e)))
                })?
            }
            StoreTarget::SizeHint(size) => {
                self.piece_storage_mgr.find_storage_for_write(*size).await.map_err(|e| {
                    fail(ResourceError::Internal(format!("fail to find store for write: {}", e)))
                })?
            }
        };

        storage.save_to(resource_id, body).await.map_err(|e| {
            fail(ResourceError::Internal(format!(
                "fail to save resource {} to store {}: {}",
                resource_id,
                storage.name(),
                e
            )))
        })
    }
}
