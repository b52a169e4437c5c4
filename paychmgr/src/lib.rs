// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeMap;

use fil_retrieval_runtime::interfaces::PaychApi;
use fil_retrieval_runtime::types::SignedVoucher;
use fil_retrieval_runtime::{ProviderContext, ProviderError};
use fvm_shared::address::Address;
use log::debug;

/// Returns, for each lane of channel `ch`, the spendable voucher with the
/// highest amount. Lanes without a spendable voucher are absent. Among vouchers
/// of equal amount the first listed is kept.
pub async fn best_spendable_by_lane(
    api: &dyn PaychApi,
    ch: &Address,
) -> Result<BTreeMap<u64, SignedVoucher>, ProviderError> {
    let vouchers = api
        .paych_voucher_list(ch)
        .await
        .with_context(|| format!("list vouchers of channel {}", ch))?;

    let mut best_by_lane: BTreeMap<u64, SignedVoucher> = BTreeMap::new();
    for voucher in vouchers {
        let spendable = api
            .paych_voucher_check_spendable(ch, &voucher, &[], &[])
            .await
            .with_context(|| {
                format!("check voucher lane {} nonce {} of {}", voucher.lane, voucher.nonce, ch)
            })?;
        if !spendable {
            debug!("voucher lane {} nonce {} of {} not spendable", voucher.lane, voucher.nonce, ch);
            continue;
        }
        let better =
            best_by_lane.get(&voucher.lane).map_or(true, |best| voucher.amount > best.amount);
        if better {
            best_by_lane.insert(voucher.lane, voucher);
        }
    }
    Ok(best_by_lane)
}
