// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use cid::Cid;
use fil_retrieval_runtime::interfaces::StorageDealRepo;
use fil_retrieval_runtime::types::MinerDeal;
use fil_retrieval_runtime::{provider_error, ProviderError};

/// Resolves the storage deals able to serve a payload.
#[derive(Clone)]
pub struct PieceInfo {
    storage_deals: Arc<dyn StorageDealRepo>,
}

impl PieceInfo {
    pub fn new(storage_deals: Arc<dyn StorageDealRepo>) -> Self {
        Self { storage_deals }
    }

    /// Returns the deals of `piece_cid` when given, otherwise the deals of every
    /// piece holding `payload_cid`. Fails with `NotFound` when there are none.
    pub async fn get_piece_info_from_cid(
        &self,
        payload_cid: &Cid,
        piece_cid: Option<&Cid>,
    ) -> Result<Vec<MinerDeal>, ProviderError> {
        let deals = match piece_cid {
            Some(piece) => self.storage_deals.get_deals_by_piece_cid(piece).await?,
            None => {
                let mut deals = Vec::new();
                for piece in self.storage_deals.get_pieces_by_payload(payload_cid).await? {
                    deals.extend(self.storage_deals.get_deals_by_piece_cid(&piece).await?);
                }
                deals
            }
        };
        if deals.is_empty() {
            return Err(provider_error!(
                not_found;
                "no storage deals found for payload {}",
                payload_cid
            ));
        }
        Ok(deals)
    }
}
