// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Conversions between the legacy and current retrieval wire records.

use fvm_shared::econ::TokenAmount;
use num_traits::Zero;

use crate::types::{DealProposal, DealProposalV0, DealResponse, DealResponseV0, Params, ParamsV0};

/// Legacy params carry no unseal price; unsealing is free for them.
pub fn migrate_params_v0_to_v1(params: ParamsV0) -> Params {
    Params {
        selector: params.selector,
        piece_cid: params.piece_cid,
        price_per_byte: params.price_per_byte,
        payment_interval: params.payment_interval,
        payment_interval_increase: params.payment_interval_increase,
        unseal_price: TokenAmount::zero(),
    }
}

pub fn migrate_deal_proposal_v0_to_v1(proposal: DealProposalV0) -> DealProposal {
    DealProposal {
        payload_cid: proposal.payload_cid,
        id: proposal.id,
        params: migrate_params_v0_to_v1(proposal.params),
    }
}

pub fn downgrade_deal_response(response: DealResponse) -> DealResponseV0 {
    DealResponseV0 {
        status: response.status,
        id: response.id,
        payment_owed: response.payment_owed,
        message: response.message,
    }
}
