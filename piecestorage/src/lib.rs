// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::error::PieceStorageError;
pub use self::fs::FsPieceStore;
pub use self::manager::PieceStorageManager;
pub use self::market_api::{GatedReader, MarketApi};
pub use self::memory::MemPieceStore;
pub use self::metrics::FetchMetrics;
pub use self::padreader::{Inflator, PieceReader, ZeroPadReader};
pub use self::resource::{PieceStorageServer, Resource, ResourceError, StoreTarget};
pub use self::storage::{PieceStore, StorageInfo, StorageStatus, StorageType};

mod error;
mod fs;
mod manager;
mod market_api;
mod memory;
mod metrics;
pub mod padreader;
mod resource;
mod storage;
