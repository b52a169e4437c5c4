// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use async_trait::async_trait;
use fil_piece_storage::PieceStorageManager;
use fil_retrieval_runtime::interfaces::{
    ProviderDealEnvironment, RetrievalDealRepo, StorageDealRepo, UnsealService,
};
use fil_retrieval_runtime::policy::RetrievalPolicy;
use fil_retrieval_runtime::types::{DealStatus, MinerDeal, ProviderDealState, UnsealState};
use fil_retrieval_runtime::{provider_error, ProviderContext, ProviderError};
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Drives a retrieval deal through unsealing and teardown.
#[async_trait]
pub trait RetrievalHandler: Send + Sync {
    /// Makes the deal's piece available locally, unsealing it when no piece
    /// storage holds it, then resumes the deal's transfer.
    async fn unseal_data(&self, deal: &mut ProviderDealState) -> Result<(), ProviderError>;

    async fn cancel_deal(&self, deal: &mut ProviderDealState) -> Result<(), ProviderError>;

    async fn cleanup_deal(&self, deal: &mut ProviderDealState) -> Result<(), ProviderError>;

    /// Records the deal as errored, with the message of `err` when given.
    async fn error(
        &self,
        deal: &mut ProviderDealState,
        err: Option<&ProviderError>,
    ) -> Result<(), ProviderError>;
}

pub struct RetrievalDealHandler {
    env: Arc<dyn ProviderDealEnvironment>,
    retrieval_deal_store: Arc<dyn RetrievalDealRepo>,
    storage_deal_repo: Arc<dyn StorageDealRepo>,
    unseal_service: Arc<dyn UnsealService>,
    piece_storage_mgr: Arc<PieceStorageManager>,
    policy: RetrievalPolicy,
    shutdown: Option<watch::Receiver<bool>>,
}

impl RetrievalDealHandler {
    pub fn new(
        env: Arc<dyn ProviderDealEnvironment>,
        retrieval_deal_store: Arc<dyn RetrievalDealRepo>,
        storage_deal_repo: Arc<dyn StorageDealRepo>,
        unseal_service: Arc<dyn UnsealService>,
        piece_storage_mgr: Arc<PieceStorageManager>,
    ) -> Self {
        Self {
            env,
            retrieval_deal_store,
            storage_deal_repo,
            unseal_service,
            piece_storage_mgr,
            policy: RetrievalPolicy::default(),
            shutdown: None,
        }
    }

    pub fn with_policy(mut self, policy: RetrievalPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Unseal polling stops once `true` is published on `shutdown`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    async fn update_status(
        &self,
        deal: &mut ProviderDealState,
        status: DealStatus,
    ) -> Result<(), ProviderError> {
        deal.transition(status)?;
        self.retrieval_deal_store
            .save_deal(deal)
            .await
            .with_context(|| format!("save deal {} as {}", deal.identifier(), status))
    }

    /// Resolves the storage deal backing `deal` and makes sure its piece is
    /// held by a piece storage.
    async fn ensure_piece(&self, deal: &ProviderDealState) -> Result<MinerDeal, ProviderError> {
        let proposal_cid = deal.sel_storage_proposal_cid.ok_or_else(|| {
            provider_error!(
                illegal_state;
                "deal {} has no selected storage deal",
                deal.identifier()
            )
        })?;
        let storage_deal = self
            .storage_deal_repo
            .get_deal(&proposal_cid)
            .await
            .with_context(|| format!("get storage deal {}", proposal_cid))?;

        let piece_cid = storage_deal.proposal.piece_cid;
        let resource_id = piece_cid.to_string();
        match self.piece_storage_mgr.find_storage_for_read(&resource_id).await {
            Ok(storage) => {
                info!("piece {} found in storage {}, skip unseal", piece_cid, storage.name());
                return Ok(storage_deal);
            }
            Err(e) => debug!("piece {} not in any storage, unsealing: {}", piece_cid, e),
        }

        let piece_size = storage_deal.proposal.piece_size;
        let storage = self
            .piece_storage_mgr
            .find_storage_for_write(piece_size.0)
            .await
            .map_err(ProviderError::from)
            .with_context(|| format!("find storage to unseal piece {}", piece_cid))?;
        let dest = storage
            .piece_transfer(&resource_id)
            .await
            .map_err(ProviderError::from)
            .with_context(|| format!("transfer endpoint of piece {}", piece_cid))?;

        self.poll_unseal(&storage_deal, &dest).await?;
        Ok(storage_deal)
    }

    async fn poll_unseal(&self, storage_deal: &MinerDeal, dest: &str) -> Result<(), ProviderError> {
        let provider = storage_deal.proposal.provider;
        let piece_cid = storage_deal.proposal.piece_cid;
        let offset = storage_deal.offset.unpadded().0;
        let size = storage_deal.proposal.piece_size.unpadded();

        let mut ticker = interval(self.policy.unseal_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        let deadline = sleep(self.policy.unseal_timeout);
        tokio::pin!(deadline);
        let mut shutdown = self.shutdown.clone();

        let timed_out = || {
            provider_error!(
                timeout;
                "unseal piece {} timed out after {:?}",
                piece_cid,
                self.policy.unseal_timeout
            )
        };

        let mut retries = 0;
        loop {
            let attempt = self.unseal_service.sectors_unseal_piece(
                &provider,
                &piece_cid,
                storage_deal.sector_number,
                offset,
                size,
                dest,
            );
            // The remote call is bounded by the same deadline and shutdown as
            // the wait between polls.
            let state = tokio::select! {
                biased;
                state = attempt => state,
                _ = &mut deadline => return Err(timed_out()),
                _ = shutdown_requested(&mut shutdown) => {
                    return Err(provider_error!(timeout; "unseal interrupted"));
                }
            };

            match state {
                Ok(UnsealState::Finished) => {
                    info!("piece {} unsealed to {}", piece_cid, dest);
                    return Ok(());
                }
                Ok(UnsealState::Failed) => {
                    return Err(provider_error!(illegal_state; "unseal piece {} failed", piece_cid));
                }
                Ok(UnsealState::InProgress) => debug!("piece {} unseal in progress", piece_cid),
                Err(e) => {
                    retries += 1;
                    warn!(
                        "unseal piece {} ({}/{}): {}",
                        piece_cid, retries, self.policy.unseal_max_retries, e
                    );
                    if retries > self.policy.unseal_max_retries {
                        return Err(e.wrap(format!("unseal piece {}", piece_cid)));
                    }
                }
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut deadline => return Err(timed_out()),
                _ = shutdown_requested(&mut shutdown) => {
                    return Err(provider_error!(timeout; "unseal interrupted"));
                }
            }
        }
    }
}

/// Completes once `true` is published. Never completes without a receiver or
/// once the sender is gone.
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
    std::future::pending::<()>().await
}

#[async_trait]
impl RetrievalHandler for RetrievalDealHandler {
    async fn unseal_data(&self, deal: &mut ProviderDealState) -> Result<(), ProviderError> {
        self.update_status(deal, DealStatus::Unsealing).await?;

        let storage_deal = match self.ensure_piece(deal).await {
            Ok(storage_deal) => storage_deal,
            Err(e) => {
                error!("deal {}: {}", deal.identifier(), e);
                if let Err(save_err) = self.error(deal, Some(&e)).await {
                    warn!("record failure of deal {}: {}", deal.identifier(), save_err);
                }
                return Err(e);
            }
        };

        let piece_cid = storage_deal.proposal.piece_cid;
        if let Err(e) = self.env.prepare_blockstore(deal.proposal.id, &piece_cid).await {
            error!("prepare blockstore of deal {}: {}", deal.identifier(), e);
            if let Err(cancel_err) = self.cancel_deal(deal).await {
                warn!("cancel deal {}: {}", deal.identifier(), cancel_err);
            }
            return Err(e);
        }

        self.update_status(deal, DealStatus::Unsealed).await?;

        if let Some(channel_id) = deal.channel_id.clone() {
            if let Err(e) = self.env.resume_data_transfer(&channel_id).await {
                error!("resume channel {} of deal {}: {}", channel_id, deal.identifier(), e);
                deal.message = e.msg().to_string();
                self.update_status(deal, DealStatus::Errored).await?;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn cancel_deal(&self, deal: &mut ProviderDealState) -> Result<(), ProviderError> {
        if let Err(e) = self.env.delete_store(deal.proposal.id).await {
            return self.error(deal, Some(&e.wrap("delete store"))).await;
        }
        if let Some(channel_id) = deal.channel_id.clone() {
            if let Err(e) = self.env.close_data_transfer(&channel_id).await {
                if !e.is_terminated() {
                    return self.error(deal, Some(&e.wrap("close channel"))).await;
                }
                debug!("channel {} already terminated", channel_id);
            }
        }
        self.update_status(deal, DealStatus::Cancelled).await
    }

    async fn cleanup_deal(&self, deal: &mut ProviderDealState) -> Result<(), ProviderError> {
        if let Err(e) = self.env.delete_store(deal.proposal.id).await {
            return self.error(deal, Some(&e.wrap("delete store"))).await;
        }
        self.update_status(deal, DealStatus::Completed).await
    }

    async fn error(
        &self,
        deal: &mut ProviderDealState,
        err: Option<&ProviderError>,
    ) -> Result<(), ProviderError> {
        if let Some(err) = err {
            deal.message = err.msg().to_string();
        }
        self.update_status(deal, DealStatus::Errored).await
    }
}
