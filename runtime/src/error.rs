// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt::Display;

use thiserror::Error;

/// Classifies a [`ProviderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A piece, deal or record is absent. Recoverable; callers may fall back
    /// to alternate logic such as unsealing.
    NotFound,
    /// A protocol-level policy refusal. Terminal for the deal, not a system fault.
    Rejected,
    /// A remote service hiccup, retried up to a fixed bound.
    Transient,
    /// A deadline elapsed or the enclosing operation was interrupted.
    Timeout,
    /// The target already reached a terminal state (e.g. a closed transfer channel).
    Terminated,
    IllegalArgument,
    IllegalState,
    Serialization,
    Unspecified,
}

/// The error type returned by provider operations and collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("ProviderError(code: {code:?}, msg: {msg})")]
pub struct ProviderError {
    /// The class of this failure.
    code: ErrorCode,
    /// Human readable message, suitable for a deal's failure message.
    msg: String,
}

impl ProviderError {
    pub fn new(code: ErrorCode, msg: String) -> Self {
        Self { code, msg }
    }

    pub fn not_found(msg: String) -> Self {
        Self { code: ErrorCode::NotFound, msg }
    }
    pub fn rejected(msg: String) -> Self {
        Self { code: ErrorCode::Rejected, msg }
    }
    pub fn transient(msg: String) -> Self {
        Self { code: ErrorCode::Transient, msg }
    }
    pub fn timeout(msg: String) -> Self {
        Self { code: ErrorCode::Timeout, msg }
    }
    pub fn terminated(msg: String) -> Self {
        Self { code: ErrorCode::Terminated, msg }
    }
    pub fn illegal_argument(msg: String) -> Self {
        Self { code: ErrorCode::IllegalArgument, msg }
    }
    pub fn illegal_state(msg: String) -> Self {
        Self { code: ErrorCode::IllegalState, msg }
    }
    pub fn serialization(msg: String) -> Self {
        Self { code: ErrorCode::Serialization, msg }
    }
    pub fn unspecified(msg: String) -> Self {
        Self { code: ErrorCode::Unspecified, msg }
    }

    /// Returns the code of the error.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Error message of the provider error.
    pub fn msg(&self) -> &str {
        &self.msg
    }

    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::NotFound
    }

    pub fn is_terminated(&self) -> bool {
        self.code == ErrorCode::Terminated
    }

    /// Prefix error message with a string message.
    pub fn wrap(mut self, msg: impl AsRef<str>) -> Self {
        self.msg = format!("{}: {}", msg.as_ref(), self.msg);
        self
    }
}

/// Converts a raw encoding error into a serialization error.
impl From<fvm_ipld_encoding::Error> for ProviderError {
    fn from(e: fvm_ipld_encoding::Error) -> Self {
        Self { code: ErrorCode::Serialization, msg: e.to_string() }
    }
}

/// Convenience macro for generating provider errors
#[macro_export]
macro_rules! provider_error {
    // Error with only one stringable expression
    ( $code:ident; $msg:expr ) => { $crate::ProviderError::$code($msg.to_string()) };

    // String with positional arguments
    ( $code:ident; $msg:literal $(, $ex:expr)+ ) => {
        $crate::ProviderError::$code(format!($msg, $($ex,)*))
    };

    // Error with only one stringable expression, with comma separator
    ( $code:ident, $msg:expr ) => { $crate::provider_error!($code; $msg) };

    // String with positional arguments, with comma separator
    ( $code:ident, $msg:literal $(, $ex:expr)+ ) => {
        $crate::provider_error!($code; $msg $(, $ex)*)
    };
}

// Adds context to a provider error's descriptive message.
pub trait ProviderContext<T> {
    fn context<C>(self, context: C) -> Result<T, ProviderError>
    where
        C: Display + 'static;

    fn with_context<C, F>(self, f: F) -> Result<T, ProviderError>
    where
        C: Display + 'static,
        F: FnOnce() -> C;
}

impl<T> ProviderContext<T> for Result<T, ProviderError> {
    fn context<C>(self, context: C) -> Result<T, ProviderError>
    where
        C: Display + 'static,
    {
        self.map_err(|err| err.wrap(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, ProviderError>
    where
        C: Display + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|err| err.wrap(f().to_string()))
    }
}

// Adapts a foreign failure into a provider error with an explicit code.
pub trait AsProviderError<T>: Sized {
    fn error_code(self, code: ErrorCode) -> Result<T, ProviderError>;

    fn context_code<C>(self, code: ErrorCode, context: C) -> Result<T, ProviderError>
    where
        C: Display + 'static;

    fn with_context_code<C, F>(self, code: ErrorCode, f: F) -> Result<T, ProviderError>
    where
        C: Display + 'static,
        F: FnOnce() -> C;
}

impl<T, E: Display> AsProviderError<T> for Result<T, E> {
    fn error_code(self, code: ErrorCode) -> Result<T, ProviderError> {
        self.map_err(|err| ProviderError { code, msg: err.to_string() })
    }

    fn context_code<C>(self, code: ErrorCode, context: C) -> Result<T, ProviderError>
    where
        C: Display + 'static,
    {
        self.map_err(|err| ProviderError { code, msg: format!("{}: {}", context, err) })
    }

    fn with_context_code<C, F>(self, code: ErrorCode, f: F) -> Result<T, ProviderError>
    where
        C: Display + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|err| ProviderError { code, msg: format!("{}: {}", f(), err) })
    }
}

impl<T> AsProviderError<T> for Option<T> {
    fn error_code(self, code: ErrorCode) -> Result<T, ProviderError> {
        self.ok_or_else(|| ProviderError { code, msg: "None".to_string() })
    }

    fn context_code<C>(self, code: ErrorCode, context: C) -> Result<T, ProviderError>
    where
        C: Display + 'static,
    {
        self.ok_or_else(|| ProviderError { code, msg: context.to_string() })
    }

    fn with_context_code<C, F>(self, code: ErrorCode, f: F) -> Result<T, ProviderError>
    where
        C: Display + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| ProviderError { code, msg: f().to_string() })
    }
}
