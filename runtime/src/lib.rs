// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::error::*;

pub mod config;
mod error;
pub mod interfaces;
pub mod migrations;
pub mod policy;
pub mod repo;
pub mod types;

#[cfg(feature = "test_utils")]
pub mod test_utils;
