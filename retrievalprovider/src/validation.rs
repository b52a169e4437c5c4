// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use cid::Cid;
use fil_retrieval_runtime::config::MarketConfig;
use fil_retrieval_runtime::interfaces::{RetrievalAskRepo, RetrievalDealRepo, StorageDealRepo};
use fil_retrieval_runtime::migrations::{downgrade_deal_response, migrate_deal_proposal_v0_to_v1};
use fil_retrieval_runtime::policy::RetrievalPolicy;
use fil_retrieval_runtime::types::{
    ChannelId, DealProposal, DealProposalV0, DealResponse, DealStatus, Params, PeerId,
    ProviderDealState, RetrievalAsk, TypedVoucher, DEAL_PROPOSAL_TYPE, DEAL_PROPOSAL_V0_TYPE,
    DEAL_RESPONSE_TYPE, DEAL_RESPONSE_V0_TYPE,
};
use fil_retrieval_runtime::{provider_error, ProviderError};
use futures::future::BoxFuture;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use log::{debug, info, warn};
use num_traits::Zero;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};

use crate::piece_info::PieceInfo;
use crate::selector::ALL_SELECTOR_BYTES;

/// Acceptance policy applied after a proposal matched an ask. Receives the
/// address of the provider selected to serve the deal and returns whether the
/// deal is accepted, with a reason when it is not.
pub type RetrievalDealFilter = Arc<
    dyn Fn(Address, ProviderDealState) -> BoxFuture<'static, Result<(bool, String), ProviderError>>
        + Send
        + Sync,
>;

/// Outcome of a successful pull validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullValidation {
    /// The transfer continues as it is (restarted channels).
    Unchanged,
    /// The transfer is paused and the client receives the voucher result.
    Pause(TypedVoucher),
}

/// A failed pull validation. `response` is sent to the client when present.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct ValidationError {
    pub response: Option<TypedVoucher>,
    pub error: ProviderError,
}

impl From<ProviderError> for ValidationError {
    fn from(error: ProviderError) -> Self {
        Self { response: None, error }
    }
}

/// Compares the terms of a proposal with the provider's ask.
pub fn check_deal_params(ask: &RetrievalAsk, params: &Params) -> Result<(), ProviderError> {
    if params.price_per_byte < ask.price_per_byte {
        return Err(provider_error!(rejected; "price per byte too low"));
    }
    if params.payment_interval > ask.payment_interval {
        return Err(provider_error!(rejected; "payment interval too large"));
    }
    if params.payment_interval_increase > ask.payment_interval_increase {
        return Err(provider_error!(rejected; "payment interval increase too large"));
    }
    if params.unseal_price < ask.unseal_price {
        return Err(provider_error!(rejected; "unseal price too small"));
    }
    Ok(())
}

/// Decides whether incoming data-transfer requests may proceed.
pub struct ProviderRequestValidator {
    cfg: Arc<MarketConfig>,
    piece_info: PieceInfo,
    retrieval_deals: Arc<dyn RetrievalDealRepo>,
    retrieval_asks: Arc<dyn RetrievalAskRepo>,
    rdf: Option<RetrievalDealFilter>,
    policy: RetrievalPolicy,
}

impl ProviderRequestValidator {
    pub fn new(
        cfg: Arc<MarketConfig>,
        storage_deals: Arc<dyn StorageDealRepo>,
        retrieval_deals: Arc<dyn RetrievalDealRepo>,
        retrieval_asks: Arc<dyn RetrievalAskRepo>,
        rdf: Option<RetrievalDealFilter>,
    ) -> Self {
        Self {
            cfg,
            piece_info: PieceInfo::new(storage_deals),
            retrieval_deals,
            retrieval_asks,
            rdf,
            policy: RetrievalPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetrievalPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Providers never accept pushed data.
    pub fn validate_push(
        &self,
        _is_restart: bool,
        _channel_id: &ChannelId,
        _sender: &PeerId,
        _voucher: &TypedVoucher,
        _base_cid: &Cid,
        _selector: &[u8],
    ) -> Result<PullValidation, ValidationError> {
        Err(provider_error!(rejected; "no pushes accepted").into())
    }

    /// Validates a pull request, records the deal and returns the response to
    /// send back. Restarted channels are left untouched.
    pub async fn validate_pull(
        &self,
        is_restart: bool,
        channel_id: &ChannelId,
        receiver: &PeerId,
        voucher: &TypedVoucher,
        base_cid: &Cid,
        selector: &[u8],
    ) -> Result<PullValidation, ValidationError> {
        let (proposal, legacy) = match voucher.voucher_type.as_str() {
            DEAL_PROPOSAL_TYPE => (voucher.decode::<DealProposal>()?, false),
            DEAL_PROPOSAL_V0_TYPE => {
                (migrate_deal_proposal_v0_to_v1(voucher.decode::<DealProposalV0>()?), true)
            }
            other => {
                return Err(provider_error!(illegal_argument; "wrong voucher type {}", other).into())
            }
        };

        let (response, result) = self
            .validate_pull_proposal(
                is_restart, channel_id, receiver, proposal, legacy, base_cid, selector,
            )
            .await;

        let response = match response {
            Some(response) => Some(encode_response(response, legacy)?),
            None => None,
        };
        match (response, result) {
            (None, Ok(())) => Ok(PullValidation::Unchanged),
            (Some(response), Ok(())) => Ok(PullValidation::Pause(response)),
            (response, Err(error)) => Err(ValidationError { response, error }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn validate_pull_proposal(
        &self,
        is_restart: bool,
        channel_id: &ChannelId,
        receiver: &PeerId,
        proposal: DealProposal,
        legacy: bool,
        base_cid: &Cid,
        selector: &[u8],
    ) -> (Option<DealResponse>, Result<(), ProviderError>) {
        if proposal.payload_cid != *base_cid {
            return (
                None,
                Err(provider_error!(illegal_argument; "incorrect CID for this proposal")),
            );
        }

        let expected = match &proposal.params.selector {
            Some(s) if proposal.selector_specified() => s.bytes(),
            _ => ALL_SELECTOR_BYTES,
        };
        if selector != expected {
            return (
                None,
                Err(provider_error!(illegal_argument; "incorrect selector for this proposal")),
            );
        }

        // The deal was accepted when the channel first opened.
        if is_restart {
            debug!("restart of deal {}/{}, nothing to validate", receiver, proposal.id);
            return (None, Ok(()));
        }

        let mut deal = ProviderDealState::new(proposal, receiver.clone(), legacy);
        deal.channel_id = Some(channel_id.clone());

        let mut response = DealResponse {
            status: DealStatus::New,
            id: deal.proposal.id,
            payment_owed: TokenAmount::zero(),
            message: String::new(),
        };

        let (status, ask) = match self.accept_deal(&mut deal).await {
            Ok(accepted) => accepted,
            Err((status, e)) => {
                info!("deal {} not accepted ({}): {}", deal.identifier(), status, e.msg());
                response.status = status;
                response.message = e.msg().to_string();
                return (Some(response), Err(e));
            }
        };

        response.status = status;
        if status == DealStatus::FundsNeededUnseal {
            response.payment_owed = ask.unseal_price;
        } else {
            deal.funds_received = TokenAmount::zero();
        }
        deal.total_sent = 0;

        let saved = match deal.transition(status) {
            Ok(()) => self.retrieval_deals.save_deal(&deal).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            warn!("failed to save deal {}: {}", deal.identifier(), e);
            response.message = e.msg().to_string();
            return (Some(response), Err(e));
        }

        info!("deal {} accepted with status {}", deal.identifier(), status);
        (Some(response), Ok(()))
    }

    /// Resolves the storage deal and ask to serve `deal` from and applies the
    /// acceptance policy. Returns the status to record, or the failure status
    /// along with the reason.
    async fn accept_deal(
        &self,
        deal: &mut ProviderDealState,
    ) -> Result<(DealStatus, RetrievalAsk), (DealStatus, ProviderError)> {
        let miner_deals = self
            .piece_info
            .get_piece_info_from_cid(deal.payload_cid(), deal.piece_cid())
            .await
            .map_err(|e| {
                let status =
                    if e.is_not_found() { DealStatus::DealNotFound } else { DealStatus::Errored };
                (status, e)
            })?;

        let deadline = Instant::now() + self.policy.ask_timeout;
        let mut selected = None;
        let mut last_err = None;
        for miner_deal in miner_deals {
            let provider = miner_deal.proposal.provider;
            let cfg = match self.cfg.miner_provider_config(&provider, true) {
                Ok(cfg) => cfg,
                Err(e) => {
                    debug!("skip storage deal {}: {}", miner_deal.proposal_cid, e.msg());
                    continue;
                }
            };
            if cfg.retrieval_payment_address.is_none() {
                debug!(
                    "skip storage deal {}: provider {} has no payment address",
                    miner_deal.proposal_cid, provider
                );
                continue;
            }

            deal.sel_storage_proposal_cid = Some(miner_deal.proposal_cid);
            match timeout_at(deadline, self.retrieval_asks.get_ask(&provider)).await {
                Ok(Ok(ask)) => {
                    selected = Some((provider, ask));
                    break;
                }
                Ok(Err(e)) => {
                    warn!("get retrieval ask of {}: {}", provider, e);
                    last_err = Some(e);
                }
                Err(_) => {
                    warn!("get retrieval ask of {} timed out", provider);
                    last_err = Some(provider_error!(timeout; "retrieval ask lookup timed out"));
                    break;
                }
            }
        }

        let (provider, ask) = selected.ok_or_else(|| {
            let e = last_err.unwrap_or_else(|| {
                provider_error!(
                    illegal_state;
                    "no retrieval ask available for payload {}",
                    deal.payload_cid()
                )
            });
            (DealStatus::Errored, e)
        })?;

        check_deal_params(&ask, deal.params()).map_err(|e| (DealStatus::Rejected, e))?;

        if let Some(rdf) = &self.rdf {
            match rdf(provider, deal.clone()).await {
                Ok((true, _)) => {}
                Ok((false, reason)) => {
                    return Err((DealStatus::Rejected, ProviderError::rejected(reason)))
                }
                Err(e) => return Err((DealStatus::Errored, e.wrap("retrieval deal filter"))),
            }
        }

        let status = if ask.unseal_price.is_positive() {
            DealStatus::FundsNeededUnseal
        } else {
            DealStatus::Accepted
        };
        Ok((status, ask))
    }
}

fn encode_response(response: DealResponse, legacy: bool) -> Result<TypedVoucher, ProviderError> {
    if legacy {
        TypedVoucher::new(DEAL_RESPONSE_V0_TYPE, &downgrade_deal_response(response))
    } else {
        TypedVoucher::new(DEAL_RESPONSE_TYPE, &response)
    }
}
