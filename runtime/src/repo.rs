// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! In-process repositories. Records live for the life of the value.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use cid::Cid;
use fvm_shared::address::Address;
use fvm_shared::piece::PaddedPieceSize;
use indexmap::{IndexMap, IndexSet};

use crate::interfaces::{RetrievalAskRepo, RetrievalDealRepo, StorageDealRepo};
use crate::types::{
    DealID, MinerDeal, PeerId, ProviderDealIdentifier, ProviderDealState, RetrievalAsk,
};
use crate::{provider_error, ProviderError};

// Writers replace whole records, so a poisoned lock still guards consistent data.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
pub struct MemRetrievalDealRepo {
    deals: RwLock<BTreeMap<ProviderDealIdentifier, ProviderDealState>>,
}

impl MemRetrievalDealRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetrievalDealRepo for MemRetrievalDealRepo {
    async fn save_deal(&self, deal: &ProviderDealState) -> Result<(), ProviderError> {
        write(&self.deals).insert(deal.identifier(), deal.clone());
        Ok(())
    }

    async fn get_deal(
        &self,
        receiver: &PeerId,
        id: DealID,
    ) -> Result<ProviderDealState, ProviderError> {
        let key = ProviderDealIdentifier { receiver: receiver.clone(), deal_id: id };
        read(&self.deals)
            .get(&key)
            .cloned()
            .ok_or_else(|| provider_error!(not_found; "retrieval deal {} not found", key))
    }

    async fn has_deal(&self, receiver: &PeerId, id: DealID) -> Result<bool, ProviderError> {
        let key = ProviderDealIdentifier { receiver: receiver.clone(), deal_id: id };
        Ok(read(&self.deals).contains_key(&key))
    }

    async fn list_deals(&self) -> Result<Vec<ProviderDealState>, ProviderError> {
        Ok(read(&self.deals).values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemRetrievalAskRepo {
    asks: RwLock<IndexMap<Address, RetrievalAsk>>,
}

impl MemRetrievalAskRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetrievalAskRepo for MemRetrievalAskRepo {
    async fn get_ask(&self, miner: &Address) -> Result<RetrievalAsk, ProviderError> {
        read(&self.asks)
            .get(miner)
            .cloned()
            .ok_or_else(|| provider_error!(not_found; "no retrieval ask for {}", miner))
    }

    async fn set_ask(&self, ask: &RetrievalAsk) -> Result<(), ProviderError> {
        write(&self.asks).insert(ask.miner, ask.clone());
        Ok(())
    }

    async fn list_asks(&self) -> Result<Vec<RetrievalAsk>, ProviderError> {
        Ok(read(&self.asks).values().cloned().collect())
    }
}

/// Storage deals keyed by proposal CID, in insertion order.
#[derive(Default)]
pub struct MemStorageDealRepo {
    deals: RwLock<IndexMap<Cid, MinerDeal>>,
}

impl MemStorageDealRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deals(deals: impl IntoIterator<Item = MinerDeal>) -> Self {
        let repo = Self::default();
        for deal in deals {
            repo.put_deal(deal);
        }
        repo
    }

    pub fn put_deal(&self, deal: MinerDeal) {
        write(&self.deals).insert(deal.proposal_cid, deal);
    }
}

#[async_trait]
impl StorageDealRepo for MemStorageDealRepo {
    async fn get_deal(&self, proposal_cid: &Cid) -> Result<MinerDeal, ProviderError> {
        read(&self.deals)
            .get(proposal_cid)
            .cloned()
            .ok_or_else(|| provider_error!(not_found; "storage deal {} not found", proposal_cid))
    }

    async fn get_deals_by_piece_cid(
        &self,
        piece_cid: &Cid,
    ) -> Result<Vec<MinerDeal>, ProviderError> {
        Ok(read(&self.deals)
            .values()
            .filter(|d| &d.proposal.piece_cid == piece_cid)
            .cloned()
            .collect())
    }

    async fn get_pieces_by_payload(&self, payload_cid: &Cid) -> Result<Vec<Cid>, ProviderError> {
        let pieces: IndexSet<Cid> = read(&self.deals)
            .values()
            .filter(|d| &d.payload_cid == payload_cid)
            .map(|d| d.proposal.piece_cid)
            .collect();
        Ok(pieces.into_iter().collect())
    }

    async fn get_piece_size(
        &self,
        piece_cid: &Cid,
    ) -> Result<(u64, PaddedPieceSize), ProviderError> {
        read(&self.deals)
            .values()
            .find(|d| &d.proposal.piece_cid == piece_cid)
            .map(|d| (d.payload_size, d.proposal.piece_size))
            .ok_or_else(|| provider_error!(not_found; "no storage deal for piece {}", piece_cid))
    }
}
