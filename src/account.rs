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

//! Account records.
//!
//! [`AccountData`] is the mutable row guarded by the store's per-account
//! lock; [`Account`] is an immutable snapshot handed out to callers.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use gobank_core::{Account, AccountId, Role};
//!
//! let account = Account::new(AccountId::from("acc-1"), Role::User, dec!(10.00));
//! assert_eq!(account.balance, dec!(10.00));
//! ```

use crate::base::{AccountId, Role};
use crate::error::LedgerError;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Result of a conditional balance adjustment.
///
/// When `applied` is false the balance is unchanged and `balance` is the
/// current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjustment {
    pub balance: Decimal,
    pub applied: bool,
}

#[derive(Debug)]
pub(crate) struct AccountData {
    id: AccountId,
    role: Role,
    balance: Decimal,
}

impl AccountData {
    pub(crate) fn new(id: AccountId, role: Role, balance: Decimal) -> Self {
        Self { id, role, balance }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: balance went negative: {}",
            self.balance
        );
    }

    pub(crate) fn balance(&self) -> Decimal {
        self.balance
    }

    /// Applies `balance += delta` unless the result would be negative.
    pub(crate) fn adjust(&mut self, delta: Decimal) -> Result<Adjustment, LedgerError> {
        let next = self
            .balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::StorageFailure("balance overflow".into()))?;
        if next < Decimal::ZERO {
            return Ok(Adjustment {
                balance: self.balance,
                applied: false,
            });
        }
        self.balance = next;
        self.assert_invariants();
        Ok(Adjustment {
            balance: next,
            applied: true,
        })
    }

    /// Reverses a previously applied adjustment without the overdraft guard.
    pub(crate) fn revert(&mut self, delta: Decimal) {
        self.balance -= delta;
        self.assert_invariants();
    }

    pub(crate) fn snapshot(&self) -> Account {
        Account::new(self.id.clone(), self.role, self.balance)
    }
}

/// Point-in-time view of a ledger account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub balance: Decimal,
    pub role: Role,
}

impl Account {
    const DECIMAL_PRECISION: u32 = 4;

    pub fn new(id: AccountId, role: Role, balance: Decimal) -> Self {
        Self { id, balance, role }
    }
}

impl Serialize for Account {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Account", 3)?;
        state.serialize_field("account", &self.id)?;
        state.serialize_field("role", &self.role)?;
        state.serialize_field(
            "balance",
            &self.balance.round_dp(Account::DECIMAL_PRECISION),
        )?;
        state.end()
    }
}
