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

//! # GoBank Core
//!
//! The trust-and-ledger core of a banking backend: stateless signed session
//! tokens that bind a request to an account and role, and the balance
//! mutations (top-up, withdrawal, transfer) that must conserve money under
//! concurrent access.
//!
//! ## Core Components
//!
//! - [`TokenCodec`]: Issues and verifies HMAC-signed claims
//! - [`SessionAuthenticator`]: Turns a bearer token into an [`Identity`]
//! - [`AccessPolicy`]: Decides whether an identity may perform an [`Operation`]
//! - [`LedgerStore`]: Storage seam, with [`InMemoryStore`] bundled
//! - [`TransferCoordinator`]: Performs balance mutations atomically
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use gobank_core::{
//!     InMemoryStore, LedgerConfig, LedgerStore, Role, SecretKey, SessionAuthenticator,
//!     TokenCodec, TransferCoordinator,
//! };
//! use rust_decimal_macros::dec;
//!
//! let codec = Arc::new(TokenCodec::with_default_ttl(SecretKey::new("secret").unwrap()).unwrap());
//! let auth = SessionAuthenticator::new(Arc::clone(&codec));
//! let store = Arc::new(InMemoryStore::default());
//! let ledger = TransferCoordinator::new(store.clone(), &LedgerConfig::default());
//!
//! ledger.register("alice".into(), Role::User, dec!(100.00)).unwrap();
//! ledger.register("bob".into(), Role::User, dec!(0)).unwrap();
//!
//! let token = codec.generate("alice", Role::User).unwrap().to_string();
//! let alice = auth.authenticate(&token).unwrap();
//! ledger.transfer_as(&alice, &"bob".into(), dec!(60.00), "rent").unwrap();
//!
//! assert_eq!(store.get_balance(&"alice".into()).unwrap(), dec!(40.00));
//! assert_eq!(store.get_balance(&"bob".into()).unwrap(), dec!(60.00));
//! ```
//!
//! ## Thread Safety
//!
//! Token verification is pure and runs fully in parallel. Balance mutation
//! serializes per account; transfers lock both accounts in ascending id order.

pub mod account;
pub mod auth;
mod base;
pub mod config;
mod coordinator;
pub mod error;
mod journal;
pub mod policy;
pub mod store;
pub mod token;
mod transaction;

pub use account::{Account, Adjustment};
pub use auth::{SessionAuthenticator, TOKEN_HEADER};
pub use base::{AccountId, Identity, RecordId, Role};
pub use config::{Config, LedgerConfig, SecretKey, TokenConfig};
pub use coordinator::TransferCoordinator;
pub use error::{
    AuthzError, ConfigError, Error, LedgerError, TokenError, UnknownRole, ValidationError,
};
pub use journal::Journal;
pub use policy::{AccessPolicy, Decision, Operation};
pub use store::{InMemoryStore, LedgerStore, LedgerTransaction};
pub use token::{Claim, SignedToken, TokenCodec};
pub use transaction::{TransactionRecord, TransferRequest, TransferState};
