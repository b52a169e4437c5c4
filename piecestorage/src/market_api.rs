// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use cid::Cid;
use fil_retrieval_runtime::config::DagStoreConfig;
use fil_retrieval_runtime::interfaces::StorageDealRepo;
use fil_retrieval_runtime::{
    provider_error, AsProviderError, ErrorCode, ProviderContext, ProviderError,
};
use log::{debug, warn};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::manager::PieceStorageManager;
use crate::metrics::FetchMetrics;
use crate::padreader::{Inflator, PieceReader, ZeroPadReader};

/// A piece reader that holds a fetch slot until dropped.
pub struct GatedReader {
    inner: Box<dyn PieceReader>,
    _permit: OwnedSemaphorePermit,
}

impl Read for GatedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for GatedReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Piece access for the blockstore layer.
pub struct MarketApi {
    piece_storage_mgr: Arc<PieceStorageManager>,
    piece_repo: Arc<dyn StorageDealRepo>,
    use_transient: bool,
    throttle: Arc<Semaphore>,
    metrics: FetchMetrics,
}

impl MarketApi {
    pub fn new(
        piece_storage_mgr: Arc<PieceStorageManager>,
        piece_repo: Arc<dyn StorageDealRepo>,
        cfg: &DagStoreConfig,
    ) -> Self {
        Self {
            piece_storage_mgr,
            piece_repo,
            use_transient: cfg.use_transient,
            throttle: Arc::new(Semaphore::new(cfg.max_concurrency_storage_calls.max(1))),
            metrics: FetchMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &FetchMetrics {
        &self.metrics
    }

    /// Fetch slots not currently held by a reader.
    pub fn available_fetch_slots(&self) -> usize {
        self.throttle.available_permits()
    }

    pub async fn is_unsealed(&self, piece_cid: &Cid) -> Result<bool, ProviderError> {
        match self.piece_storage_mgr.find_storage_for_read(&piece_cid.to_string()).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => {
                warn!("unable to find storage for piece {}: {}", piece_cid, e);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Opens the piece padded to its unpadded size. Callers beyond the
    /// concurrency bound wait for a slot; the slot is released when the
    /// returned reader is dropped.
    pub async fn fetch_from_piece_storage(
        &self,
        piece_cid: &Cid,
    ) -> Result<GatedReader, ProviderError> {
        let permit = self
            .throttle
            .clone()
            .acquire_owned()
            .await
            .context_code(ErrorCode::IllegalState, "piece fetch gate closed")?;

        let (payload_size, piece_size) = self.piece_repo.get_piece_size(piece_cid).await?;
        let resource_id = piece_cid.to_string();

        let storage = self
            .piece_storage_mgr
            .find_storage_for_read(&resource_id)
            .await
            .map_err(ProviderError::from)
            .context("find piece for read")?;
        let size = storage.len(&resource_id).await?;

        let inner: Box<dyn PieceReader> = if self.use_transient {
            let r = storage.reader(&resource_id).await?;
            Box::new(Inflator::new(r, payload_size, piece_size.unpadded())?)
        } else {
            let r = storage.seekable_reader(&resource_id).await?;
            Box::new(ZeroPadReader::new(r, payload_size, piece_size.unpadded())?)
        };
        self.metrics.record_bytes_requested(size);
        self.metrics.record_storage_hit(storage.name());
        self.metrics.record_init();
        debug!("fetch piece {} from storage {} ({} bytes)", piece_cid, storage.name(), size);

        Ok(GatedReader { inner, _permit: permit })
    }

    /// Unpadded size of the CAR payload of the piece.
    pub async fn get_unpadded_car_size(&self, piece_cid: &Cid) -> Result<u64, ProviderError> {
        let deals = self
            .piece_repo
            .get_deals_by_piece_cid(piece_cid)
            .await
            .with_context(|| format!("failed to fetch deals for piece {}", piece_cid))?;
        deals
            .first()
            .map(|deal| deal.payload_size)
            .ok_or_else(|| {
                provider_error!(not_found; "no storage deals found for piece {}", piece_cid)
            })
    }
}
