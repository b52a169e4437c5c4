// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fil_retrieval_runtime::{
    provider_error, AsProviderError, ErrorCode, ProviderContext, ProviderError,
};

#[test]
fn macro_and_display() {
    let err = provider_error!(rejected; "price per byte too low");
    assert_eq!(ErrorCode::Rejected, err.code());
    assert_eq!("ProviderError(code: Rejected, msg: price per byte too low)", err.to_string());

    let err = provider_error!(not_found, "piece {} missing", 7);
    assert!(err.is_not_found());
    assert_eq!("piece 7 missing", err.msg());
}

#[test]
fn context_wraps_message() {
    let res: Result<(), ProviderError> = Err(ProviderError::terminated("channel closed".into()));
    let err = res.context("close transfer").unwrap_err();
    assert!(err.is_terminated());
    assert_eq!("close transfer: channel closed", err.msg());

    let res: Result<(), ProviderError> = Err(ProviderError::transient("busy".into()));
    let err = res.with_context(|| format!("poll {}", 3)).unwrap_err();
    assert_eq!("poll 3: busy", err.msg());
}

#[test]
fn foreign_errors_take_a_code() {
    let res: Result<u64, std::num::ParseIntError> = "x".parse::<u64>();
    let err = res.context_code(ErrorCode::IllegalArgument, "parse size").unwrap_err();
    assert_eq!(ErrorCode::IllegalArgument, err.code());
    assert!(err.msg().starts_with("parse size: "));

    let none: Option<u64> = None;
    let err = none.context_code(ErrorCode::NotFound, "no ask").unwrap_err();
    assert!(err.is_not_found());
    assert_eq!("no ask", err.msg());
}
