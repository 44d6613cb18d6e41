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

//! Balance mutations.
//!
//! The [`TransferCoordinator`] is the only component that changes balances.
//! It enforces, for every operation:
//!
//! - **No overdraft**: debits go through the store's adjust-if-sufficient
//!   primitive and fail with [`LedgerError::InsufficientFunds`] otherwise.
//! - **Conservation**: a transfer debits and credits the same amount inside
//!   one store transaction.
//! - **Atomicity**: if anything after the debit fails, the transaction is
//!   rolled back before the error is returned and no record is persisted.
//!
//! # Operations
//!
//! | Operation | Gate | Effect |
//! |-----------|------|--------|
//! | [`adjust`](TransferCoordinator::adjust) | none | conditional `balance += delta` |
//! | [`top_up`](TransferCoordinator::top_up) | User | credit own account |
//! | [`withdraw`](TransferCoordinator::withdraw) | User | debit own account |
//! | [`transfer`](TransferCoordinator::transfer) | none | debit + credit + record |
//! | [`transfer_as`](TransferCoordinator::transfer_as) | User, own debit | as `transfer` |

use crate::account::{Account, Adjustment};
use crate::base::{AccountId, Identity, Role};
use crate::config::LedgerConfig;
use crate::error::{AuthzError, Error, LedgerError, ValidationError};
use crate::policy::{AccessPolicy, Operation};
use crate::store::{LedgerStore, LedgerTransaction};
use crate::transaction::{TransactionRecord, TransferRequest, TransferState};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

pub struct TransferCoordinator {
    store: Arc<dyn LedgerStore>,
    policy: AccessPolicy,
    credit_retries: u32,
}

impl TransferCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        Self {
            store,
            policy: AccessPolicy::new(),
            credit_retries: config.credit_retries,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Registers a new account. Registration is not gated.
    ///
    /// Admin rows must open empty: no operation can ever debit them.
    pub fn register(&self, id: AccountId, role: Role, opening_balance: Decimal) -> Result<Account, Error> {
        self.policy.require(None, &Operation::Register)?;
        if opening_balance < Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        if role == Role::Admin && !opening_balance.is_zero() {
            return Err(ValidationError::AdminBalance.into());
        }
        Ok(self.store.open_account(id, role, opening_balance)?)
    }

    /// Applies `balance += delta` as one conditional update.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientFunds`] - The result would be negative; balance unchanged.
    /// - [`LedgerError::AccountNotFound`] - Unknown account.
    pub fn adjust(&self, account_id: &AccountId, delta: Decimal) -> Result<Decimal, LedgerError> {
        let Adjustment { balance, applied } = self.store.conditional_adjust(account_id, delta)?;
        if !applied {
            debug!(account = %account_id, %delta, %balance, "adjustment rejected");
            return Err(LedgerError::InsufficientFunds);
        }
        Ok(balance)
    }

    pub fn top_up(&self, identity: &Identity, amount: Decimal) -> Result<Decimal, Error> {
        self.policy.require(Some(identity), &Operation::TopUp)?;
        let account_id = own_account(identity)?;
        ensure_positive(amount)?;
        self.ensure_user_account(account_id)?;
        let balance = self.adjust(account_id, amount)?;
        info!(account = %account_id, %amount, "top-up applied");
        Ok(balance)
    }

    pub fn withdraw(&self, identity: &Identity, amount: Decimal) -> Result<Decimal, Error> {
        self.policy.require(Some(identity), &Operation::Withdrawal)?;
        let account_id = own_account(identity)?;
        ensure_positive(amount)?;
        let balance = self.adjust(account_id, -amount)?;
        info!(account = %account_id, %amount, "withdrawal applied");
        Ok(balance)
    }

    pub fn balance(&self, identity: &Identity) -> Result<Decimal, Error> {
        self.policy.require(Some(identity), &Operation::ViewBalance)?;
        Ok(self.store.get_balance(own_account(identity)?)?)
    }

    /// Committed transfers involving `account_id`, oldest first.
    pub fn history(&self, identity: &Identity, account_id: &AccountId) -> Result<Vec<TransactionRecord>, Error> {
        self.policy.require(
            Some(identity),
            &Operation::ViewHistory {
                account: account_id.clone(),
            },
        )?;
        Ok(self.store.history(account_id)?)
    }

    /// Transfers from the caller's own account.
    pub fn transfer_as(
        &self,
        identity: &Identity,
        credit_id: &AccountId,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Result<TransactionRecord, Error> {
        let debit_id = own_account(identity)?;
        self.policy.require(
            Some(identity),
            &Operation::Transfer {
                debit: debit_id.clone(),
            },
        )?;
        self.transfer(debit_id, credit_id, amount, description)
    }

    pub fn transfer(
        &self,
        debit_id: &AccountId,
        credit_id: &AccountId,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Result<TransactionRecord, Error> {
        self.execute(TransferRequest::new(
            debit_id.clone(),
            credit_id.clone(),
            amount,
            description,
        ))
    }

    /// Runs a transfer to commit or rollback.
    ///
    /// # Errors
    ///
    /// - [`ValidationError`] - Non-positive amount or same account; no store access.
    /// - [`AuthzError::Forbidden`] - Credit account is an admin row; nothing applied.
    /// - [`LedgerError::AccountNotFound`] - Either account is unknown; nothing applied.
    /// - [`LedgerError::InsufficientFunds`] - Debit would overdraw; nothing applied.
    /// - [`LedgerError::StorageFailure`] - A step failed; everything applied was rolled back.
    pub fn execute(&self, request: TransferRequest) -> Result<TransactionRecord, Error> {
        request.validate()?;
        // Role is fixed at registration, so checking before the locks is enough.
        self.ensure_user_account(&request.credit_id)?;

        let span = info_span!(
            "transfer",
            debit = %request.debit_id,
            credit = %request.credit_id,
            amount = %request.amount,
        );
        let _entered = span.enter();

        let mut txn = self
            .store
            .begin(&[request.debit_id.clone(), request.credit_id.clone()])?;
        debug!(state = %TransferState::Pending, "transfer started");

        let debit = match txn.conditional_adjust(&request.debit_id, -request.amount) {
            Ok(debit) => debit,
            Err(e) => return Err(self.roll_back(txn, e).into()),
        };
        if !debit.applied {
            return Err(self.roll_back(txn, LedgerError::InsufficientFunds).into());
        }

        if let Err(e) = self.credit(txn.as_mut(), &request) {
            return Err(self.roll_back(txn, e).into());
        }

        let record = request.into_record();
        if let Err(e) = txn.append(record.clone()) {
            return Err(self.roll_back(txn, e).into());
        }
        txn.commit()?;

        info!(record = %record.id, state = %TransferState::Committed, "transfer committed");
        Ok(record)
    }

    /// Money may only flow into user rows.
    fn ensure_user_account(&self, account_id: &AccountId) -> Result<(), Error> {
        match self.store.account(account_id)?.role {
            Role::User => Ok(()),
            Role::Admin => {
                debug!(account = %account_id, "credit to admin account refused");
                Err(AuthzError::Forbidden.into())
            }
        }
    }

    /// Applies the credit leg, retrying storage faults a bounded number of times.
    fn credit(&self, txn: &mut (dyn LedgerTransaction + '_), request: &TransferRequest) -> Result<(), LedgerError> {
        let mut attempt = 0;
        loop {
            match txn.conditional_adjust(&request.credit_id, request.amount) {
                Ok(Adjustment { applied: true, .. }) => return Ok(()),
                Ok(Adjustment { applied: false, .. }) => {
                    return Err(LedgerError::StorageFailure("credit was not applied".into()));
                }
                Err(LedgerError::StorageFailure(reason)) if attempt < self.credit_retries => {
                    attempt += 1;
                    warn!(attempt, %reason, "credit failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Issues exactly one rollback and hands back the error that caused it.
    fn roll_back(&self, txn: Box<dyn LedgerTransaction + '_>, cause: LedgerError) -> LedgerError {
        match txn.rollback() {
            Ok(()) => match &cause {
                LedgerError::InsufficientFunds => {
                    debug!(state = %TransferState::RolledBack, "transfer rejected: insufficient funds")
                }
                other => info!(state = %TransferState::RolledBack, error = %other, "transfer rolled back"),
            },
            Err(rollback_error) => {
                error!(error = %cause, %rollback_error, "transfer rollback failed");
            }
        }
        cause
    }
}

/// The account a user identity may mutate. Admins own no balance.
fn own_account(identity: &Identity) -> Result<&AccountId, AuthzError> {
    match identity {
        Identity::User(account_id) => Ok(account_id),
        Identity::Admin { .. } => Err(AuthzError::Forbidden),
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), ValidationError> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use rust_decimal_macros::dec;

    fn coordinator(accounts: &[(&str, Decimal)]) -> TransferCoordinator {
        let store = Arc::new(InMemoryStore::default());
        for (id, balance) in accounts {
            store.open_account((*id).into(), Role::User, *balance).unwrap();
        }
        TransferCoordinator::new(store, &LedgerConfig::default())
    }

    #[test]
    fn adjust_rejects_overdraft_without_mutation() {
        let coordinator = coordinator(&[("a", dec!(10))]);
        assert_eq!(
            coordinator.adjust(&"a".into(), dec!(-10.01)),
            Err(LedgerError::InsufficientFunds)
        );
        assert_eq!(coordinator.store().get_balance(&"a".into()), Ok(dec!(10)));
        assert_eq!(coordinator.adjust(&"a".into(), dec!(-10)), Ok(dec!(0)));
    }

    #[test]
    fn own_account_is_exhaustive_over_identity() {
        assert_eq!(
            own_account(&Identity::User("a".into())),
            Ok(&AccountId::from("a"))
        );
        assert_eq!(
            own_account(&Identity::Admin {
                subject_id: "a".into()
            }),
            Err(AuthzError::Forbidden)
        );
    }

    #[test]
    fn validation_happens_before_store_access() {
        // Neither account exists: validation must still win.
        let coordinator = coordinator(&[]);
        assert_eq!(
            coordinator.transfer(&"x".into(), &"y".into(), dec!(0), ""),
            Err(Error::Validation(ValidationError::NonPositiveAmount))
        );
        assert_eq!(
            coordinator.transfer(&"x".into(), &"x".into(), dec!(1), ""),
            Err(Error::Validation(ValidationError::SameAccount))
        );
    }

    #[test]
    fn register_rejects_funded_admin_rows() {
        let coordinator = coordinator(&[]);
        assert_eq!(
            coordinator.register("ops".into(), Role::Admin, dec!(10)),
            Err(Error::Validation(ValidationError::AdminBalance))
        );
        assert!(coordinator.register("ops".into(), Role::Admin, dec!(0)).is_ok());
    }

    #[test]
    fn register_rejects_negative_opening_balance() {
        let coordinator = coordinator(&[]);
        assert_eq!(
            coordinator.register("a".into(), Role::User, dec!(-1)),
            Err(Error::Validation(ValidationError::NonPositiveAmount))
        );
    }
}
