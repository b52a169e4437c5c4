// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Collaborators the retrieval provider depends on but does not implement.

use async_trait::async_trait;
use cid::Cid;
use fvm_shared::address::Address;
use fvm_shared::piece::{PaddedPieceSize, UnpaddedPieceSize};
use fvm_shared::sector::SectorNumber;

use crate::types::{
    ChannelId, DealID, MinerDeal, PeerId, ProviderDealState, RetrievalAsk, SignedVoucher,
    UnsealState,
};
use crate::ProviderError;

/// Persistence of retrieval deal records.
#[async_trait]
pub trait RetrievalDealRepo: Send + Sync {
    /// Inserts or overwrites the record keyed by the deal's receiver and ID.
    async fn save_deal(&self, deal: &ProviderDealState) -> Result<(), ProviderError>;

    /// Fails with a `NotFound` error when no such deal exists.
    async fn get_deal(
        &self,
        receiver: &PeerId,
        id: DealID,
    ) -> Result<ProviderDealState, ProviderError>;

    async fn has_deal(&self, receiver: &PeerId, id: DealID) -> Result<bool, ProviderError>;

    async fn list_deals(&self) -> Result<Vec<ProviderDealState>, ProviderError>;
}

/// Persistence of published retrieval asks, one per provider.
#[async_trait]
pub trait RetrievalAskRepo: Send + Sync {
    async fn get_ask(&self, miner: &Address) -> Result<RetrievalAsk, ProviderError>;

    async fn set_ask(&self, ask: &RetrievalAsk) -> Result<(), ProviderError>;

    async fn list_asks(&self) -> Result<Vec<RetrievalAsk>, ProviderError>;
}

/// Read-only view of the provider's storage deals.
#[async_trait]
pub trait StorageDealRepo: Send + Sync {
    async fn get_deal(&self, proposal_cid: &Cid) -> Result<MinerDeal, ProviderError>;

    async fn get_deals_by_piece_cid(&self, piece_cid: &Cid)
        -> Result<Vec<MinerDeal>, ProviderError>;

    /// Pieces that contain the given payload.
    async fn get_pieces_by_payload(&self, payload_cid: &Cid) -> Result<Vec<Cid>, ProviderError>;

    /// Returns the unpadded payload size and the padded piece size.
    async fn get_piece_size(&self, piece_cid: &Cid)
        -> Result<(u64, PaddedPieceSize), ProviderError>;
}

/// Remote service that extracts a piece from a sealed sector into `dest`.
#[async_trait]
pub trait UnsealService: Send + Sync {
    /// Starts or polls the unseal of `piece_cid`. Repeated calls with the same
    /// arguments report the progress of a single operation.
    async fn sectors_unseal_piece(
        &self,
        provider: &Address,
        piece_cid: &Cid,
        sector: SectorNumber,
        offset: u64,
        size: UnpaddedPieceSize,
        dest: &str,
    ) -> Result<UnsealState, ProviderError>;
}

/// The data-transfer and blockstore environment of a retrieval deal.
#[async_trait]
pub trait ProviderDealEnvironment: Send + Sync {
    async fn prepare_blockstore(
        &self,
        deal_id: DealID,
        piece_cid: &Cid,
    ) -> Result<(), ProviderError>;

    async fn delete_store(&self, deal_id: DealID) -> Result<(), ProviderError>;

    async fn resume_data_transfer(&self, channel_id: &ChannelId) -> Result<(), ProviderError>;

    /// Closing a channel that already finished reports `ErrorCode::Terminated`.
    async fn close_data_transfer(&self, channel_id: &ChannelId) -> Result<(), ProviderError>;
}

/// Payment channel voucher queries.
#[async_trait]
pub trait PaychApi: Send + Sync {
    async fn paych_voucher_list(&self, ch: &Address) -> Result<Vec<SignedVoucher>, ProviderError>;

    async fn paych_voucher_check_spendable(
        &self,
        ch: &Address,
        voucher: &SignedVoucher,
        secret: &[u8],
        proof: &[u8],
    ) -> Result<bool, ProviderError>;
}
