// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::Duration;

/// Timing and retry parameters of the retrieval provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalPolicy {
    /// Time between two polls of a remote unseal operation.
    pub unseal_check_interval: Duration,
    /// Overall deadline of a remote unseal operation.
    pub unseal_timeout: Duration,
    /// Number of failed polls tolerated before an unseal is abandoned.
    pub unseal_max_retries: u32,
    /// Deadline shared by all ask lookups of one acceptance decision.
    pub ask_timeout: Duration,
}

impl Default for RetrievalPolicy {
    fn default() -> RetrievalPolicy {
        RetrievalPolicy {
            unseal_check_interval: policy_constants::UNSEAL_CHECK_INTERVAL,
            unseal_timeout: policy_constants::UNSEAL_TIMEOUT,
            unseal_max_retries: policy_constants::UNSEAL_MAX_RETRIES,
            ask_timeout: policy_constants::ASK_TIMEOUT,
        }
    }
}

pub mod policy_constants {
    use std::time::Duration;

    pub const UNSEAL_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

    pub const UNSEAL_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

    pub const UNSEAL_MAX_RETRIES: u32 = 5;

    pub const ASK_TIMEOUT: Duration = Duration::from_secs(5);

    pub const DEFAULT_MAX_CONCURRENCY_STORAGE_CALLS: usize = 100;
}
