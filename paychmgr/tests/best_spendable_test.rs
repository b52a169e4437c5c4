// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fil_paych_manager::best_spendable_by_lane;
use fil_retrieval_runtime::test_utils::MockPaychApi;
use fil_retrieval_runtime::types::SignedVoucher;
use fil_retrieval_runtime::ProviderError;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;

fn voucher(ch: Address, lane: u64, nonce: u64, amount: u64) -> SignedVoucher {
    SignedVoucher {
        channel_addr: ch,
        lane,
        nonce,
        amount: TokenAmount::from_atto(amount),
        signature: None,
    }
}

#[tokio::test]
async fn best_voucher_per_lane() {
    let ch = Address::new_id(500);
    let api = MockPaychApi::new();
    api.add_voucher(voucher(ch, 1, 1, 5), true);
    api.add_voucher(voucher(ch, 1, 2, 9), true);
    api.add_voucher(voucher(ch, 2, 1, 3), false);

    let best = best_spendable_by_lane(&api, &ch).await.unwrap();
    assert_eq!(1, best.len());
    assert_eq!(TokenAmount::from_atto(9), best[&1].amount);
    assert!(!best.contains_key(&2));
    assert_eq!(3, api.check_count());
}

#[tokio::test]
async fn unspendable_higher_voucher_is_ignored() {
    let ch = Address::new_id(500);
    let api = MockPaychApi::new();
    api.add_voucher(voucher(ch, 1, 1, 5), true);
    api.add_voucher(voucher(ch, 1, 2, 50), false);
    api.add_voucher(voucher(ch, 3, 1, 7), true);

    let best = best_spendable_by_lane(&api, &ch).await.unwrap();
    assert_eq!(2, best.len());
    assert_eq!(1, best[&1].nonce);
    assert_eq!(TokenAmount::from_atto(7), best[&3].amount);
}

#[tokio::test]
async fn equal_amounts_keep_first_listed() {
    let ch = Address::new_id(500);
    let api = MockPaychApi::new();
    api.add_voucher(voucher(ch, 1, 4, 5), true);
    api.add_voucher(voucher(ch, 1, 5, 5), true);

    let best = best_spendable_by_lane(&api, &ch).await.unwrap();
    assert_eq!(4, best[&1].nonce);
}

#[tokio::test]
async fn empty_channel() {
    let api = MockPaychApi::new();
    let best = best_spendable_by_lane(&api, &Address::new_id(500)).await.unwrap();
    assert!(best.is_empty());
}

#[tokio::test]
async fn api_failures_propagate() {
    let ch = Address::new_id(500);
    let api = MockPaychApi::new();
    api.fail_list(ProviderError::transient("node offline".into()));
    let err = best_spendable_by_lane(&api, &ch).await.unwrap_err();
    assert!(err.msg().ends_with("node offline"));

    let api = MockPaychApi::new();
    api.add_voucher(voucher(ch, 1, 1, 5), true);
    api.fail_check(ProviderError::transient("state lookup failed".into()));
    let err = best_spendable_by_lane(&api, &ch).await.unwrap_err();
    assert!(err.msg().ends_with("state lookup failed"));
}
