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

//! Transfer requests and committed transaction records.
//!
//! A transfer follows a state machine:
//! - [`Pending`](TransferState::Pending) → [`Committed`](TransferState::Committed)
//!   (debit and credit applied, record persisted)
//! - [`Pending`](TransferState::Pending) → [`RolledBack`](TransferState::RolledBack)
//!   (any step after the debit failed, debit reversed, no record)

use crate::base::{AccountId, RecordId};
use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    Committed,
    RolledBack,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferState::Pending => f.write_str("pending"),
            TransferState::Committed => f.write_str("committed"),
            TransferState::RolledBack => f.write_str("rolled_back"),
        }
    }
}

/// Input to a transfer. Not persisted until the transfer commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub debit_id: AccountId,
    pub credit_id: AccountId,
    pub amount: Decimal,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl TransferRequest {
    pub fn new(
        debit_id: AccountId,
        credit_id: AccountId,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            debit_id,
            credit_id,
            amount,
            description: description.into(),
            timestamp: Utc::now(),
        }
    }

    /// Checks the request without touching the store.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount);
        }
        if self.debit_id == self.credit_id {
            return Err(ValidationError::SameAccount);
        }
        Ok(())
    }

    pub(crate) fn into_record(self) -> TransactionRecord {
        TransactionRecord {
            id: RecordId::new(),
            debit_id: self.debit_id,
            credit_id: self.credit_id,
            amount: self.amount,
            description: self.description,
            timestamp: self.timestamp,
        }
    }
}

/// A committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: RecordId,
    pub debit_id: AccountId,
    pub credit_id: AccountId,
    pub amount: Decimal,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn involves(&self, account_id: &AccountId) -> bool {
        &self.debit_id == account_id || &self.credit_id == account_id
    }
}
