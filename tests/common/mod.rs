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

//! Shared helpers for integration tests.

#![allow(dead_code)]

use gobank_core::{
    AccountId, Adjustment, InMemoryStore, LedgerConfig, LedgerError, LedgerStore,
    LedgerTransaction, Role, TransactionRecord, TransferCoordinator, Account,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

static LOGGING: OnceLock<()> = OnceLock::new();

/// Installs a test-writer subscriber once. Level comes from `RUST_LOG`, default `warn`.
pub fn init_logging() {
    LOGGING.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .try_init()
            .ok();
    });
}

pub fn ledger_with(
    config: &LedgerConfig,
    accounts: &[(&str, Decimal)],
) -> (Arc<InMemoryStore>, TransferCoordinator) {
    init_logging();
    let store = Arc::new(InMemoryStore::new(config));
    for (id, balance) in accounts {
        store
            .open_account(AccountId::from(*id), Role::User, *balance)
            .unwrap();
    }
    let coordinator = TransferCoordinator::new(store.clone(), config);
    (store, coordinator)
}

pub fn balance(store: &dyn LedgerStore, id: &str) -> Decimal {
    store.get_balance(&AccountId::from(id)).unwrap()
}

/// Store wrapper that injects storage faults into transactions.
pub struct FaultyStore {
    inner: InMemoryStore,
    /// Credits to this account fail while `credit_failures` is non-zero.
    fail_credit_to: Option<AccountId>,
    credit_failures: AtomicU32,
    fail_append: bool,
    pub credit_attempts: AtomicU32,
    pub rollbacks: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            fail_credit_to: None,
            credit_failures: AtomicU32::new(0),
            fail_append: false,
            credit_attempts: AtomicU32::new(0),
            rollbacks: AtomicU32::new(0),
        }
    }

    /// Fails the next `times` credits to `account`.
    pub fn failing_credit(mut self, account: &str, times: u32) -> Self {
        self.fail_credit_to = Some(AccountId::from(account));
        self.credit_failures = AtomicU32::new(times);
        self
    }

    pub fn failing_append(mut self) -> Self {
        self.fail_append = true;
        self
    }

    fn take_credit_failure(&self) -> bool {
        self.credit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl LedgerStore for FaultyStore {
    fn open_account(
        &self,
        id: AccountId,
        role: Role,
        opening_balance: Decimal,
    ) -> Result<Account, LedgerError> {
        self.inner.open_account(id, role, opening_balance)
    }

    fn account(&self, id: &AccountId) -> Result<Account, LedgerError> {
        self.inner.account(id)
    }

    fn get_balance(&self, id: &AccountId) -> Result<Decimal, LedgerError> {
        self.inner.get_balance(id)
    }

    fn conditional_adjust(&self, id: &AccountId, delta: Decimal) -> Result<Adjustment, LedgerError> {
        self.inner.conditional_adjust(id, delta)
    }

    fn begin(&self, ids: &[AccountId]) -> Result<Box<dyn LedgerTransaction + '_>, LedgerError> {
        let inner = self.inner.begin(ids)?;
        Ok(Box::new(FaultyTransaction { inner, store: self }))
    }

    fn history(&self, id: &AccountId) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.inner.history(id)
    }
}

struct FaultyTransaction<'a> {
    inner: Box<dyn LedgerTransaction + 'a>,
    store: &'a FaultyStore,
}

impl LedgerTransaction for FaultyTransaction<'_> {
    fn conditional_adjust(&mut self, id: &AccountId, delta: Decimal) -> Result<Adjustment, LedgerError> {
        if delta > Decimal::ZERO && self.store.fail_credit_to.as_ref() == Some(id) {
            self.store.credit_attempts.fetch_add(1, Ordering::SeqCst);
            if self.store.take_credit_failure() {
                return Err(LedgerError::StorageFailure("injected credit fault".into()));
            }
        }
        self.inner.conditional_adjust(id, delta)
    }

    fn append(&mut self, record: TransactionRecord) -> Result<(), LedgerError> {
        if self.store.fail_append {
            return Err(LedgerError::StorageFailure("injected append fault".into()));
        }
        self.inner.append(record)
    }

    fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        self.store.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback()
    }
}
