// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;

use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::econ::TokenAmount;
use fvm_shared::piece::PaddedPieceSize;
use fvm_shared::sector::SectorNumber;
use num_traits::Zero;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{provider_error, AsProviderError, ErrorCode, ProviderError};

/// Caller-assigned identifier of a retrieval deal, unique per receiving peer.
pub type DealID = u64;

pub const DEAL_PROPOSAL_TYPE: &str = "RetrievalDealProposal/1";
pub const DEAL_PROPOSAL_V0_TYPE: &str = "RetrievalDealProposal";
pub const DEAL_RESPONSE_TYPE: &str = "RetrievalDealResponse/1";
pub const DEAL_RESPONSE_V0_TYPE: &str = "RetrievalDealResponse";

/// Status of a retrieval deal, encoded with the retrieval market's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u64)]
pub enum DealStatus {
    New = 0,
    Unsealing = 1,
    Unsealed = 2,
    WaitForAcceptance = 3,
    PaymentChannelCreating = 4,
    PaymentChannelAddingFunds = 5,
    Accepted = 6,
    FundsNeededUnseal = 7,
    Failing = 8,
    Rejected = 9,
    FundsNeeded = 10,
    SendFunds = 11,
    SendFundsLastPayment = 12,
    Ongoing = 13,
    FundsNeededLastPayment = 14,
    Completed = 15,
    DealNotFound = 16,
    Errored = 17,
    BlocksComplete = 18,
    Finalizing = 19,
    Completing = 20,
    CheckComplete = 21,
    CheckFunds = 22,
    InsufficientFunds = 23,
    PaymentChannelAllocatingLane = 24,
    Cancelling = 25,
    Cancelled = 26,
    ClientWaitingForLastBlocks = 27,
    PaymentChannelAddingInitialFunds = 28,
}

impl DealStatus {
    /// A deal in a terminal status never transitions again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DealStatus::Completed
                | DealStatus::Cancelled
                | DealStatus::Errored
                | DealStatus::Rejected
                | DealStatus::DealNotFound
        )
    }
}

impl Default for DealStatus {
    fn default() -> Self {
        DealStatus::New
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Libp2p peer identity, kept in its string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a data-transfer channel.
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId {
    pub initiator: PeerId,
    pub responder: PeerId,
    pub id: u64,
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.initiator, self.responder, self.id)
    }
}

/// Terms requested by a retrieval client.
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct Params {
    /// Raw DAG-CBOR selector; `None` selects the whole DAG.
    pub selector: Option<RawBytes>,
    pub piece_cid: Option<Cid>,
    pub price_per_byte: TokenAmount,
    pub payment_interval: u64,
    pub payment_interval_increase: u64,
    pub unseal_price: TokenAmount,
}

impl Params {
    pub fn new_v1(
        price_per_byte: TokenAmount,
        payment_interval: u64,
        payment_interval_increase: u64,
        unseal_price: TokenAmount,
    ) -> Self {
        Self {
            selector: None,
            piece_cid: None,
            price_per_byte,
            payment_interval,
            payment_interval_increase,
            unseal_price,
        }
    }

    pub fn selector_specified(&self) -> bool {
        self.selector.as_ref().map(|s| !s.bytes().is_empty()).unwrap_or(false)
    }
}

/// Legacy terms, without an unseal price.
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct ParamsV0 {
    pub selector: Option<RawBytes>,
    pub piece_cid: Option<Cid>,
    pub price_per_byte: TokenAmount,
    pub payment_interval: u64,
    pub payment_interval_increase: u64,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct DealProposal {
    pub payload_cid: Cid,
    pub id: DealID,
    pub params: Params,
}

impl DealProposal {
    pub fn selector_specified(&self) -> bool {
        self.params.selector_specified()
    }
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct DealProposalV0 {
    pub payload_cid: Cid,
    pub id: DealID,
    pub params: ParamsV0,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct DealResponse {
    pub status: DealStatus,
    pub id: DealID,
    pub payment_owed: TokenAmount,
    pub message: String,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct DealResponseV0 {
    pub status: DealStatus,
    pub id: DealID,
    pub payment_owed: TokenAmount,
    pub message: String,
}

/// A data-transfer voucher tagged with the type of the record it carries.
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct TypedVoucher {
    pub voucher_type: String,
    pub voucher: RawBytes,
}

impl TypedVoucher {
    pub fn new<T: Serialize>(voucher_type: &str, voucher: &T) -> Result<Self, ProviderError> {
        Ok(Self { voucher_type: voucher_type.to_string(), voucher: RawBytes::serialize(voucher)? })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProviderError> {
        self.voucher.deserialize().with_context_code(ErrorCode::Serialization, || {
            format!("failed to decode {} voucher", self.voucher_type)
        })
    }
}

/// Key of a retrieval deal record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderDealIdentifier {
    pub receiver: PeerId,
    pub deal_id: DealID,
}

impl fmt::Display for ProviderDealIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.receiver, self.deal_id)
    }
}

/// The provider's record of one retrieval deal.
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct ProviderDealState {
    pub proposal: DealProposal,
    pub channel_id: Option<ChannelId>,
    /// The storage deal selected to serve this retrieval.
    pub sel_storage_proposal_cid: Option<Cid>,
    pub status: DealStatus,
    pub receiver: PeerId,
    pub total_sent: u64,
    pub funds_received: TokenAmount,
    pub message: String,
    pub current_interval: u64,
    pub legacy_protocol: bool,
}

impl ProviderDealState {
    pub fn new(proposal: DealProposal, receiver: PeerId, legacy_protocol: bool) -> Self {
        let current_interval = proposal.params.payment_interval;
        Self {
            proposal,
            channel_id: None,
            sel_storage_proposal_cid: None,
            status: DealStatus::New,
            receiver,
            total_sent: 0,
            funds_received: TokenAmount::zero(),
            message: String::new(),
            current_interval,
            legacy_protocol,
        }
    }

    pub fn identifier(&self) -> ProviderDealIdentifier {
        ProviderDealIdentifier { receiver: self.receiver.clone(), deal_id: self.proposal.id }
    }

    pub fn payload_cid(&self) -> &Cid {
        &self.proposal.payload_cid
    }

    pub fn piece_cid(&self) -> Option<&Cid> {
        self.proposal.params.piece_cid.as_ref()
    }

    pub fn params(&self) -> &Params {
        &self.proposal.params
    }

    /// Moves the deal to `next`. Terminal statuses can only be re-asserted, never left.
    pub fn transition(&mut self, next: DealStatus) -> Result<(), ProviderError> {
        if self.status.is_terminal() && self.status != next {
            return Err(provider_error!(
                illegal_state;
                "deal {} is {}, cannot move to {}",
                self.identifier(),
                self.status,
                next
            ));
        }
        self.status = next;
        Ok(())
    }
}

/// Retrieval terms published by a storage provider.
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct RetrievalAsk {
    pub miner: Address,
    pub price_per_byte: TokenAmount,
    pub unseal_price: TokenAmount,
    pub payment_interval: u64,
    pub payment_interval_increase: u64,
}

/// The subset of an on-chain storage deal proposal this provider needs.
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct StorageDealProposal {
    pub piece_cid: Cid,
    pub piece_size: PaddedPieceSize,
    pub client: Address,
    pub provider: Address,
}

/// A storage deal as recorded by the provider.
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct MinerDeal {
    pub proposal_cid: Cid,
    pub proposal: StorageDealProposal,
    pub payload_cid: Cid,
    /// Unpadded size of the CAR payload.
    pub payload_size: u64,
    pub sector_number: SectorNumber,
    /// Padded offset of the piece inside its sector.
    pub offset: PaddedPieceSize,
}

/// Progress of a remote unseal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum UnsealState {
    Failed = 0,
    InProgress = 1,
    Finished = 2,
}

#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, PartialEq, Eq)]
pub struct SignedVoucher {
    pub channel_addr: Address,
    pub lane: u64,
    pub nonce: u64,
    pub amount: TokenAmount,
    pub signature: Option<Signature>,
}
