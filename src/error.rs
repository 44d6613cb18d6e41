// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for authentication, authorization and ledger mutation.
//!
//! Each family maps to a different remediation path for the caller:
//! token errors ask for re-authentication, authorization errors are plain
//! rejections, and only [`LedgerError::StorageFailure`] is an infrastructure
//! fault.

use thiserror::Error;

/// Session token failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// No `token` header was supplied
    #[error("missing session token")]
    Missing,

    /// Wire form is not two hex segments separated by a dot
    #[error("malformed session token")]
    Malformed,

    /// Signature does not match the claim bytes
    #[error("session token signature mismatch")]
    Tampered,

    /// Signature is valid but the claim has expired
    #[error("session token has expired")]
    Expired,

    /// Verified claim bytes could not be (de)serialized
    #[error("claim encoding failure: {0}")]
    ClaimEncoding(String),
}

/// Authorization failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("operation not permitted for this identity")]
    Forbidden,
}

/// Ledger mutation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Debit would drive the balance below zero
    #[error("insufficient available funds")]
    InsufficientFunds,

    /// Referenced account does not exist
    #[error("account not found")]
    AccountNotFound,

    /// Account id is already registered
    #[error("account already exists")]
    DuplicateAccount,

    /// Store could not complete the call (timeout, overflow, fault)
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

/// Request validation failures, raised before any store access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid amount (must be positive)")]
    NonPositiveAmount,

    #[error("debit and credit account are the same")]
    SameAccount,

    /// Admin rows never hold money
    #[error("admin accounts cannot hold a balance")]
    AdminBalance,
}

/// Role name that is neither `admin` nor `user`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

/// Process configuration failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("signing secret is not configured")]
    MissingSecret,

    #[error("signing secret must not be empty")]
    EmptySecret,

    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Any failure surfaced by the trust-and-ledger core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Authz(#[from] AuthzError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Text safe to show to the caller. Internal details stay in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Token(TokenError::Missing) => "you need to log in to perform this action",
            Error::Token(TokenError::Malformed) => "your session token is invalid, please log in again",
            Error::Token(TokenError::Tampered) => {
                "we cannot verify who you are, your token may have been tampered with"
            }
            Error::Token(TokenError::Expired) => "your token has expired, please re-authenticate",
            Error::Token(TokenError::ClaimEncoding(_)) => "internal server error",
            Error::Authz(AuthzError::Forbidden) => "you have no authority to perform this action",
            Error::Ledger(LedgerError::InsufficientFunds) => "insufficient funds",
            Error::Ledger(LedgerError::AccountNotFound) => "no account was found",
            Error::Ledger(LedgerError::DuplicateAccount) => "account already exists",
            Error::Ledger(LedgerError::StorageFailure(_)) => "internal server error",
            Error::Validation(ValidationError::NonPositiveAmount) => "amount must be positive",
            Error::Validation(ValidationError::SameAccount) => "cannot transfer to the same account",
            Error::Validation(ValidationError::AdminBalance) => "admin accounts cannot hold a balance",
            Error::Config(_) => "internal server error",
        }
    }

    /// Whether this is an infrastructure fault rather than a rejected request.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Error::Token(TokenError::ClaimEncoding(_))
                | Error::Ledger(LedgerError::StorageFailure(_))
                | Error::Config(_)
        )
    }
}
