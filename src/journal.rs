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

//! Append-only journal of committed transfers.
//!
//! Provides duplicate detection on record ids while keeping commit order.

use crate::base::{AccountId, RecordId};
use crate::error::LedgerError;
use crate::transaction::TransactionRecord;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Committed transaction records.
///
/// Combines a [`DashMap`] for O(1) lookup and duplicate checking with an
/// ordered list of ids that preserves commit order.
#[derive(Debug, Default)]
pub struct Journal {
    records: DashMap<RecordId, Arc<TransactionRecord>>,
    order: RwLock<Vec<RecordId>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a committed record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageFailure`] if a record with the same id
    /// was already journaled.
    pub fn append(&self, record: TransactionRecord) -> Result<(), LedgerError> {
        self.append_all(vec![record])
    }

    /// Appends every record or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageFailure`] if any id is already journaled
    /// or repeats within `records`; the journal is then unchanged.
    pub fn append_all(&self, records: Vec<TransactionRecord>) -> Result<(), LedgerError> {
        // Hold the order lock across check and insert so order matches insertion.
        let mut order = self.order.write();
        let mut batch = HashSet::with_capacity(records.len());
        for record in &records {
            if self.records.contains_key(&record.id) || !batch.insert(record.id) {
                return Err(LedgerError::StorageFailure(format!(
                    "duplicate transaction record {}",
                    record.id
                )));
            }
        }
        for record in records {
            let id = record.id;
            self.records.insert(id, Arc::new(record));
            order.push(id);
        }
        Ok(())
    }

    pub fn get(&self, id: &RecordId) -> Option<Arc<TransactionRecord>> {
        self.records.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Records debiting or crediting `account_id`, oldest first.
    pub fn history(&self, account_id: &AccountId) -> Vec<TransactionRecord> {
        let order = self.order.read();
        order
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|r| r.involves(account_id))
            .map(|r| TransactionRecord::clone(r.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
