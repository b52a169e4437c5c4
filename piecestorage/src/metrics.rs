// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counters of the piece fetch path. Recording never fails.
#[derive(Debug, Default)]
pub struct FetchMetrics {
    bytes_requested: AtomicU64,
    init_count: AtomicU64,
    storage_hits: Mutex<HashMap<String, u64>>,
}

impl FetchMetrics {
    pub fn record_bytes_requested(&self, bytes: u64) {
        self.bytes_requested.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_init(&self) {
        self.init_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_hit(&self, storage: &str) {
        let mut hits = self.storage_hits.lock().unwrap_or_else(|e| e.into_inner());
        *hits.entry(storage.to_string()).or_default() += 1;
    }

    pub fn bytes_requested(&self) -> u64 {
        self.bytes_requested.load(Ordering::Relaxed)
    }

    pub fn init_count(&self) -> u64 {
        self.init_count.load(Ordering::Relaxed)
    }

    pub fn storage_hits(&self, storage: &str) -> u64 {
        let hits = self.storage_hits.lock().unwrap_or_else(|e| e.into_inner());
        hits.get(storage).copied().unwrap_or(0)
    }
}
