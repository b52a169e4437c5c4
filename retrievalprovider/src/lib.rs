// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::handler::{RetrievalDealHandler, RetrievalHandler};
pub use self::piece_info::PieceInfo;
pub use self::selector::ALL_SELECTOR_BYTES;
pub use self::validation::{
    check_deal_params, ProviderRequestValidator, PullValidation, RetrievalDealFilter,
    ValidationError,
};

mod handler;
mod piece_info;
mod selector;
mod validation;
