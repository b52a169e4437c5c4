// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;

use fvm_shared::address::Address;
use serde::{Deserialize, Serialize};

use crate::policy::policy_constants::DEFAULT_MAX_CONCURRENCY_STORAGE_CALLS;
use crate::{provider_error, AsProviderError, ErrorCode, ProviderError};

/// Market configuration consumed by the retrieval provider. Loading it from a
/// file is the embedding process's concern.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct MarketConfig {
    /// Provider settings shared by miners that do not override them.
    pub common_provider: ProviderConfig,
    pub miners: Vec<MinerConfig>,
    pub piece_storage: PieceStorageConfig,
    pub dag_store: DagStoreConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Address that receives retrieval payments. A miner without one does not
    /// serve retrievals.
    pub retrieval_payment_address: Option<Address>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MinerConfig {
    pub addr: Address,
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PieceStorageConfig {
    pub fs: Vec<FsPieceStorageConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FsPieceStorageConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub read_only: bool,
    /// Capacity limit in bytes; the store is unbounded when absent.
    #[serde(default)]
    pub max_size: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DagStoreConfig {
    /// Serve fetches through the sequential transient reader.
    pub use_transient: bool,
    /// Bound on concurrent piece fetches.
    pub max_concurrency_storage_calls: usize,
}

impl Default for DagStoreConfig {
    fn default() -> Self {
        Self {
            use_transient: false,
            max_concurrency_storage_calls: DEFAULT_MAX_CONCURRENCY_STORAGE_CALLS,
        }
    }
}

impl MarketConfig {
    /// Returns the provider config for `addr`. An unconfigured miner is an error.
    /// A configured miner without its own provider section falls back to the
    /// common one when `use_common` is set.
    pub fn miner_provider_config(
        &self,
        addr: &Address,
        use_common: bool,
    ) -> Result<ProviderConfig, ProviderError> {
        let miner = self
            .miners
            .iter()
            .find(|m| &m.addr == addr)
            .with_context_code(ErrorCode::NotFound, || {
                format!("miner {} not configured", addr)
            })?;

        match (&miner.provider, use_common) {
            (Some(cfg), _) => Ok(cfg.clone()),
            (None, true) => Ok(self.common_provider.clone()),
            (None, false) => {
                Err(provider_error!(not_found; "miner {} has no provider config", addr))
            }
        }
    }
}
