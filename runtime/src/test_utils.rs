// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use cid::multihash::Multihash;
use cid::Cid;
use fvm_ipld_encoding::DAG_CBOR;
use fvm_shared::address::Address;
use fvm_shared::commcid::FIL_COMMITMENT_UNSEALED;
use fvm_shared::piece::UnpaddedPieceSize;
use fvm_shared::sector::SectorNumber;

use crate::interfaces::{PaychApi, ProviderDealEnvironment, UnsealService};
use crate::types::{ChannelId, DealID, SignedVoucher, UnsealState};
use crate::{provider_error, ProviderError};

const IDENTITY_HASH: u64 = 0x0;

pub fn init_logging() -> Result<(), log::SetLoggerError> {
    pretty_env_logger::try_init()
}

/// A CID over `data` with an identity multihash, so equal inputs give equal CIDs.
pub fn make_cid(codec: u64, data: &[u8]) -> Cid {
    let digest = Multihash::wrap(IDENTITY_HASH, data).expect("data too long for identity hash");
    Cid::new_v1(codec, digest)
}

pub fn make_payload_cid(seed: &str) -> Cid {
    make_cid(DAG_CBOR, format!("payload-{}", seed).as_bytes())
}

pub fn make_piece_cid(seed: &str) -> Cid {
    make_cid(FIL_COMMITMENT_UNSEALED, format!("piece-{}", seed).as_bytes())
}

pub fn make_proposal_cid(seed: &str) -> Cid {
    make_cid(DAG_CBOR, format!("proposal-{}", seed).as_bytes())
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A call observed by [`MockEnvironment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvCall {
    PrepareBlockstore(DealID, Cid),
    DeleteStore(DealID),
    ResumeDataTransfer(ChannelId),
    CloseDataTransfer(ChannelId),
}

#[derive(Default)]
struct EnvExpectations {
    prepare: Option<ProviderError>,
    delete: Option<ProviderError>,
    resume: Option<ProviderError>,
    close: Option<ProviderError>,
    calls: Vec<EnvCall>,
}

/// Deal environment that succeeds unless told to fail, recording every call.
#[derive(Default)]
pub struct MockEnvironment {
    inner: Mutex<EnvExpectations>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_prepare(&self, err: ProviderError) {
        lock(&self.inner).prepare = Some(err);
    }

    pub fn fail_delete(&self, err: ProviderError) {
        lock(&self.inner).delete = Some(err);
    }

    pub fn fail_resume(&self, err: ProviderError) {
        lock(&self.inner).resume = Some(err);
    }

    pub fn fail_close(&self, err: ProviderError) {
        lock(&self.inner).close = Some(err);
    }

    pub fn calls(&self) -> Vec<EnvCall> {
        lock(&self.inner).calls.clone()
    }

    fn record(
        &self,
        call: EnvCall,
        pick: fn(&EnvExpectations) -> &Option<ProviderError>,
    ) -> Result<(), ProviderError> {
        let mut inner = lock(&self.inner);
        inner.calls.push(call);
        match pick(&inner) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProviderDealEnvironment for MockEnvironment {
    async fn prepare_blockstore(
        &self,
        deal_id: DealID,
        piece_cid: &Cid,
    ) -> Result<(), ProviderError> {
        self.record(EnvCall::PrepareBlockstore(deal_id, *piece_cid), |e| &e.prepare)
    }

    async fn delete_store(&self, deal_id: DealID) -> Result<(), ProviderError> {
        self.record(EnvCall::DeleteStore(deal_id), |e| &e.delete)
    }

    async fn resume_data_transfer(&self, channel_id: &ChannelId) -> Result<(), ProviderError> {
        self.record(EnvCall::ResumeDataTransfer(channel_id.clone()), |e| &e.resume)
    }

    async fn close_data_transfer(&self, channel_id: &ChannelId) -> Result<(), ProviderError> {
        self.record(EnvCall::CloseDataTransfer(channel_id.clone()), |e| &e.close)
    }
}

/// Arguments of one `sectors_unseal_piece` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsealCall {
    pub provider: Address,
    pub piece_cid: Cid,
    pub sector: SectorNumber,
    pub offset: u64,
    pub size: UnpaddedPieceSize,
    pub dest: String,
}

struct UnsealExpectations {
    results: VecDeque<Result<UnsealState, ProviderError>>,
    fallback: Result<UnsealState, ProviderError>,
    calls: Vec<UnsealCall>,
}

/// Unseal service that replays scripted results, then repeats a fallback.
pub struct MockUnsealService {
    inner: Mutex<UnsealExpectations>,
}

impl Default for MockUnsealService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUnsealService {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(UnsealExpectations {
                results: VecDeque::new(),
                fallback: Ok(UnsealState::Finished),
                calls: Vec::new(),
            }),
        }
    }

    pub fn expect_result(&self, result: Result<UnsealState, ProviderError>) {
        lock(&self.inner).results.push_back(result);
    }

    pub fn expect_results(
        &self,
        results: impl IntoIterator<Item = Result<UnsealState, ProviderError>>,
    ) {
        lock(&self.inner).results.extend(results);
    }

    pub fn set_fallback(&self, result: Result<UnsealState, ProviderError>) {
        lock(&self.inner).fallback = result;
    }

    pub fn calls(&self) -> Vec<UnsealCall> {
        lock(&self.inner).calls.clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.inner).calls.len()
    }
}

#[async_trait]
impl UnsealService for MockUnsealService {
    async fn sectors_unseal_piece(
        &self,
        provider: &Address,
        piece_cid: &Cid,
        sector: SectorNumber,
        offset: u64,
        size: UnpaddedPieceSize,
        dest: &str,
    ) -> Result<UnsealState, ProviderError> {
        let mut inner = lock(&self.inner);
        inner.calls.push(UnsealCall {
            provider: *provider,
            piece_cid: *piece_cid,
            sector,
            offset,
            size,
            dest: dest.to_string(),
        });
        match inner.results.pop_front() {
            Some(result) => result,
            None => inner.fallback.clone(),
        }
    }
}

#[derive(Default)]
struct PaychExpectations {
    vouchers: HashMap<Address, Vec<SignedVoucher>>,
    spendable: HashMap<(u64, u64), bool>,
    list_error: Option<ProviderError>,
    check_error: Option<ProviderError>,
    checks: usize,
}

/// Payment channel API over an in-memory voucher list. Vouchers are unspendable
/// unless marked otherwise by lane and nonce.
#[derive(Default)]
pub struct MockPaychApi {
    inner: Mutex<PaychExpectations>,
}

impl MockPaychApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_voucher(&self, voucher: SignedVoucher, spendable: bool) {
        let mut inner = lock(&self.inner);
        inner.spendable.insert((voucher.lane, voucher.nonce), spendable);
        inner.vouchers.entry(voucher.channel_addr).or_default().push(voucher);
    }

    pub fn fail_list(&self, err: ProviderError) {
        lock(&self.inner).list_error = Some(err);
    }

    pub fn fail_check(&self, err: ProviderError) {
        lock(&self.inner).check_error = Some(err);
    }

    pub fn check_count(&self) -> usize {
        lock(&self.inner).checks
    }
}

#[async_trait]
impl PaychApi for MockPaychApi {
    async fn paych_voucher_list(&self, ch: &Address) -> Result<Vec<SignedVoucher>, ProviderError> {
        let inner = lock(&self.inner);
        if let Some(err) = &inner.list_error {
            return Err(err.clone());
        }
        Ok(inner.vouchers.get(ch).cloned().unwrap_or_default())
    }

    async fn paych_voucher_check_spendable(
        &self,
        ch: &Address,
        voucher: &SignedVoucher,
        _secret: &[u8],
        _proof: &[u8],
    ) -> Result<bool, ProviderError> {
        let mut inner = lock(&self.inner);
        inner.checks += 1;
        if let Some(err) = &inner.check_error {
            return Err(err.clone());
        }
        if &voucher.channel_addr != ch {
            return Err(provider_error!(
                illegal_argument;
                "voucher is for channel {}",
                voucher.channel_addr
            ));
        }
        Ok(inner.spendable.get(&(voucher.lane, voucher.nonce)).copied().unwrap_or(false))
    }
}
