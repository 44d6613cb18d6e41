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

//! Ledger storage.
//!
//! [`LedgerStore`] is the persistence seam consumed by the transfer
//! coordinator: balance reads, an atomic adjust-if-sufficient primitive, and
//! transactional grouping over a set of accounts. [`InMemoryStore`] is the
//! bundled implementation.
//!
//! # Locking
//!
//! Each account row sits behind its own [`Mutex`]. A transaction locks every
//! account it enlists in ascending [`AccountId`] order and holds the locks
//! until commit or rollback, so concurrent transfers over the same pair can
//! never deadlock and no reader observes a half-applied transfer. Lock waits
//! are bounded by the configured timeout and surface as
//! [`LedgerError::StorageFailure`].

use crate::account::{Account, AccountData, Adjustment};
use crate::base::{AccountId, Role};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::journal::Journal;
use crate::transaction::TransactionRecord;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Storage primitives the ledger core relies on.
///
/// Implementations must make [`conditional_adjust`](LedgerStore::conditional_adjust)
/// linearizable per account, and [`begin`](LedgerStore::begin) must isolate the
/// enlisted accounts at least as strongly as serializable isolation.
pub trait LedgerStore: Send + Sync {
    /// Registers a new account.
    ///
    /// Callers validate the opening balance first; a store refuses a
    /// negative one with [`LedgerError::StorageFailure`].
    fn open_account(
        &self,
        id: AccountId,
        role: Role,
        opening_balance: Decimal,
    ) -> Result<Account, LedgerError>;

    fn account(&self, id: &AccountId) -> Result<Account, LedgerError>;

    fn get_balance(&self, id: &AccountId) -> Result<Decimal, LedgerError>;

    /// Atomically applies `balance += delta` unless the result would be
    /// negative, in which case nothing changes and `applied` is false.
    fn conditional_adjust(&self, id: &AccountId, delta: Decimal) -> Result<Adjustment, LedgerError>;

    /// Starts a transaction over `ids`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] if any id is unknown,
    /// [`LedgerError::StorageFailure`] if the accounts cannot be acquired.
    fn begin(&self, ids: &[AccountId]) -> Result<Box<dyn LedgerTransaction + '_>, LedgerError>;

    /// Committed records involving `id`, oldest first.
    fn history(&self, id: &AccountId) -> Result<Vec<TransactionRecord>, LedgerError>;
}

/// A unit of work over a fixed set of accounts.
///
/// Dropping a transaction without committing rolls it back. A failed
/// [`commit`](LedgerTransaction::commit) leaves no change behind.
pub trait LedgerTransaction {
    fn conditional_adjust(&mut self, id: &AccountId, delta: Decimal) -> Result<Adjustment, LedgerError>;

    /// Stages a record to be persisted on commit.
    fn append(&mut self, record: TransactionRecord) -> Result<(), LedgerError>;

    fn commit(self: Box<Self>) -> Result<(), LedgerError>;

    /// Reverses every adjustment applied in this transaction.
    fn rollback(self: Box<Self>) -> Result<(), LedgerError>;
}

type AccountHandle = Arc<Mutex<AccountData>>;

/// Thread-safe in-process ledger store.
#[derive(Debug)]
pub struct InMemoryStore {
    accounts: DashMap<AccountId, AccountHandle>,
    journal: Journal,
    lock_timeout: Duration,
}

impl InMemoryStore {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            accounts: DashMap::new(),
            journal: Journal::new(),
            lock_timeout: config.lock_timeout(),
        }
    }

    /// Snapshots of every account, sorted by id.
    pub fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let mut handles: Vec<(AccountId, AccountHandle)> = self
            .accounts
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles
            .iter()
            .map(|(_, handle)| -> Result<Account, LedgerError> { Ok(self.lock(handle)?.snapshot()) })
            .collect()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    fn handle(&self, id: &AccountId) -> Result<AccountHandle, LedgerError> {
        // Clone the handle so the map shard is released before locking the row.
        self.accounts
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::AccountNotFound)
    }

    fn lock(&self, handle: &AccountHandle) -> Result<ArcMutexGuard<RawMutex, AccountData>, LedgerError> {
        handle.try_lock_arc_for(self.lock_timeout).ok_or_else(|| {
            warn!(timeout_ms = self.lock_timeout.as_millis() as u64, "account lock wait timed out");
            LedgerError::StorageFailure("timed out waiting for account lock".into())
        })
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(&LedgerConfig::default())
    }
}

impl LedgerStore for InMemoryStore {
    fn open_account(
        &self,
        id: AccountId,
        role: Role,
        opening_balance: Decimal,
    ) -> Result<Account, LedgerError> {
        if opening_balance < Decimal::ZERO {
            return Err(LedgerError::StorageFailure(format!(
                "negative opening balance {opening_balance} for {id}"
            )));
        }
        match self.accounts.entry(id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateAccount),
            Entry::Vacant(entry) => {
                let data = AccountData::new(id, role, opening_balance);
                let account = data.snapshot();
                entry.insert(Arc::new(Mutex::new(data)));
                debug!(account = %account.id, %role, "account opened");
                Ok(account)
            }
        }
    }

    fn account(&self, id: &AccountId) -> Result<Account, LedgerError> {
        let handle = self.handle(id)?;
        Ok(self.lock(&handle)?.snapshot())
    }

    fn get_balance(&self, id: &AccountId) -> Result<Decimal, LedgerError> {
        let handle = self.handle(id)?;
        Ok(self.lock(&handle)?.balance())
    }

    fn conditional_adjust(&self, id: &AccountId, delta: Decimal) -> Result<Adjustment, LedgerError> {
        let handle = self.handle(id)?;
        let mut row = self.lock(&handle)?;
        row.adjust(delta)
    }

    fn begin(&self, ids: &[AccountId]) -> Result<Box<dyn LedgerTransaction + '_>, LedgerError> {
        let mut ordered: Vec<&AccountId> = ids.iter().collect();
        ordered.sort();
        ordered.dedup();

        // Resolve every id before taking any lock.
        let handles = ordered
            .into_iter()
            .map(|id| -> Result<(AccountId, AccountHandle), LedgerError> {
                Ok((id.clone(), self.handle(id)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(handles.len());
        for (id, handle) in &handles {
            rows.push((id.clone(), self.lock(handle)?));
        }

        Ok(Box::new(InMemoryTransaction {
            journal: &self.journal,
            rows,
            undo: Vec::new(),
            staged: Vec::new(),
            finished: false,
        }))
    }

    fn history(&self, id: &AccountId) -> Result<Vec<TransactionRecord>, LedgerError> {
        // Unknown accounts are an error rather than an empty history.
        self.handle(id)?;
        Ok(self.journal.history(id))
    }
}

struct InMemoryTransaction<'a> {
    journal: &'a Journal,
    /// Locked rows in ascending id order.
    rows: Vec<(AccountId, ArcMutexGuard<RawMutex, AccountData>)>,
    /// Applied adjustments as (row index, delta).
    undo: Vec<(usize, Decimal)>,
    staged: Vec<TransactionRecord>,
    finished: bool,
}

impl InMemoryTransaction<'_> {
    fn revert(&mut self) {
        while let Some((index, delta)) = self.undo.pop() {
            self.rows[index].1.revert(delta);
        }
        self.staged.clear();
        self.finished = true;
    }
}

impl LedgerTransaction for InMemoryTransaction<'_> {
    fn conditional_adjust(&mut self, id: &AccountId, delta: Decimal) -> Result<Adjustment, LedgerError> {
        let index = self
            .rows
            .binary_search_by(|(row_id, _)| row_id.cmp(id))
            .map_err(|_| LedgerError::StorageFailure(format!("account {id} not enlisted in transaction")))?;
        let adjustment = self.rows[index].1.adjust(delta)?;
        if adjustment.applied {
            self.undo.push((index, delta));
        }
        Ok(adjustment)
    }

    fn append(&mut self, record: TransactionRecord) -> Result<(), LedgerError> {
        self.staged.push(record);
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), LedgerError> {
        let staged = std::mem::take(&mut self.staged);
        if let Err(e) = self.journal.append_all(staged) {
            self.revert();
            return Err(e);
        }
        self.undo.clear();
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), LedgerError> {
        self.revert();
        Ok(())
    }
}

impl Drop for InMemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.revert();
        }
    }
}
