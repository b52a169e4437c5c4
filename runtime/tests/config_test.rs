// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fil_retrieval_runtime::config::{MarketConfig, MinerConfig, ProviderConfig};
use fil_retrieval_runtime::ErrorCode;
use fvm_shared::address::Address;

fn config() -> MarketConfig {
    MarketConfig {
        common_provider: ProviderConfig { retrieval_payment_address: Some(Address::new_id(500)) },
        miners: vec![
            MinerConfig { addr: Address::new_id(1000), provider: None },
            MinerConfig {
                addr: Address::new_id(1001),
                provider: Some(ProviderConfig { retrieval_payment_address: None }),
            },
        ],
        ..Default::default()
    }
}

#[test]
fn miner_provider_config_lookup() {
    let cfg = config();

    let common = cfg.miner_provider_config(&Address::new_id(1000), true).unwrap();
    assert_eq!(Some(Address::new_id(500)), common.retrieval_payment_address);
    let err = cfg.miner_provider_config(&Address::new_id(1000), false).unwrap_err();
    assert!(err.is_not_found());

    // a miner's own section wins over the common one
    let own = cfg.miner_provider_config(&Address::new_id(1001), true).unwrap();
    assert_eq!(None, own.retrieval_payment_address);

    let err = cfg.miner_provider_config(&Address::new_id(2000), true).unwrap_err();
    assert_eq!(ErrorCode::NotFound, err.code());
    assert!(err.msg().ends_with("not configured"));
}
