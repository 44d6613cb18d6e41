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

//! Transfer coordinator integration tests.

mod common;

use chrono::{TimeDelta, Utc};
use common::{balance, ledger_with};
use gobank_core::{
    AccountId, AuthzError, Error, Identity, LedgerConfig, LedgerError, LedgerStore, Role,
    SecretKey, SessionAuthenticator, TokenCodec, TokenError, ValidationError,
};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn user(id: &str) -> Identity {
    Identity::User(AccountId::from(id))
}

fn admin(id: &str) -> Identity {
    Identity::Admin {
        subject_id: id.to_owned(),
    }
}

#[test]
fn example_scenario() {
    let (store, ledger) = ledger_with(
        &LedgerConfig::default(),
        &[("A", dec!(100.00)), ("B", dec!(0)), ("C", dec!(0))],
    );

    let record = ledger
        .transfer(&"A".into(), &"B".into(), dec!(60.00), "first")
        .unwrap();
    assert_eq!(record.amount, dec!(60.00));
    assert_eq!(balance(store.as_ref(), "A"), dec!(40.00));
    assert_eq!(balance(store.as_ref(), "B"), dec!(60.00));
    assert_eq!(store.journal().len(), 1);

    let result = ledger.transfer(&"A".into(), &"C".into(), dec!(50.00), "second");
    assert_eq!(result, Err(Error::Ledger(LedgerError::InsufficientFunds)));
    assert_eq!(balance(store.as_ref(), "A"), dec!(40.00));
    assert_eq!(balance(store.as_ref(), "C"), dec!(0));
    assert_eq!(store.journal().len(), 1);
}

#[test]
fn transfer_conserves_the_pair_total() {
    let (store, ledger) = ledger_with(
        &LedgerConfig::default(),
        &[("a", dec!(12.3456)), ("b", dec!(7.0001))],
    );
    let before = balance(store.as_ref(), "a") + balance(store.as_ref(), "b");

    ledger
        .transfer(&"a".into(), &"b".into(), dec!(2.3456), "")
        .unwrap();

    assert_eq!(balance(store.as_ref(), "a"), dec!(10.0000));
    assert_eq!(balance(store.as_ref(), "b"), dec!(9.3457));
    assert_eq!(
        balance(store.as_ref(), "a") + balance(store.as_ref(), "b"),
        before
    );
}

#[test]
fn transfer_draining_the_account_is_allowed() {
    let (store, ledger) = ledger_with(&LedgerConfig::default(), &[("a", dec!(5)), ("b", dec!(0))]);
    ledger.transfer(&"a".into(), &"b".into(), dec!(5), "").unwrap();
    assert_eq!(balance(store.as_ref(), "a"), dec!(0));
}

#[test]
fn unknown_credit_account_leaves_debit_untouched() {
    let (store, ledger) = ledger_with(&LedgerConfig::default(), &[("a", dec!(50))]);
    let result = ledger.transfer(&"a".into(), &"ghost".into(), dec!(10), "");
    assert_eq!(result, Err(Error::Ledger(LedgerError::AccountNotFound)));
    assert_eq!(balance(store.as_ref(), "a"), dec!(50));
    assert!(store.journal().is_empty());
}

#[test]
fn validation_errors() {
    let (_, ledger) = ledger_with(&LedgerConfig::default(), &[("a", dec!(50)), ("b", dec!(0))]);
    assert_eq!(
        ledger.transfer(&"a".into(), &"b".into(), dec!(-5), ""),
        Err(Error::Validation(ValidationError::NonPositiveAmount))
    );
    assert_eq!(
        ledger.transfer(&"a".into(), &"a".into(), dec!(5), ""),
        Err(Error::Validation(ValidationError::SameAccount))
    );
}

#[test]
fn top_up_and_withdraw_act_on_own_account() {
    let (store, ledger) = ledger_with(&LedgerConfig::default(), &[("a", dec!(0))]);
    let alice = user("a");

    assert_eq!(ledger.top_up(&alice, dec!(25.50)), Ok(dec!(25.50)));
    assert_eq!(ledger.withdraw(&alice, dec!(5.50)), Ok(dec!(20.00)));
    assert_eq!(
        ledger.withdraw(&alice, dec!(20.01)),
        Err(Error::Ledger(LedgerError::InsufficientFunds))
    );
    assert_eq!(ledger.balance(&alice), Ok(dec!(20.00)));
    assert_eq!(balance(store.as_ref(), "a"), dec!(20.00));
}

#[test]
fn top_up_rejects_non_positive_amounts() {
    let (_, ledger) = ledger_with(&LedgerConfig::default(), &[("a", dec!(0))]);
    assert_eq!(
        ledger.top_up(&user("a"), dec!(0)),
        Err(Error::Validation(ValidationError::NonPositiveAmount))
    );
    assert_eq!(
        ledger.withdraw(&user("a"), dec!(-1)),
        Err(Error::Validation(ValidationError::NonPositiveAmount))
    );
}

#[test]
fn admins_cannot_move_money() {
    let (store, ledger) = ledger_with(&LedgerConfig::default(), &[("a", dec!(10)), ("b", dec!(0))]);
    let ops = admin("a");

    assert_eq!(
        ledger.top_up(&ops, dec!(1)),
        Err(Error::Authz(AuthzError::Forbidden))
    );
    assert_eq!(
        ledger.withdraw(&ops, dec!(1)),
        Err(Error::Authz(AuthzError::Forbidden))
    );
    assert!(matches!(
        ledger.transfer_as(&ops, &"b".into(), dec!(1), ""),
        Err(Error::Authz(AuthzError::Forbidden))
    ));
    assert_eq!(balance(store.as_ref(), "a"), dec!(10));
    assert_eq!(balance(store.as_ref(), "b"), dec!(0));
}

#[test]
fn admin_rows_never_receive_money() {
    let (store, ledger) = ledger_with(&LedgerConfig::default(), &[("alice", dec!(100))]);
    assert_eq!(
        ledger.register("ops".into(), Role::Admin, dec!(60)),
        Err(Error::Validation(ValidationError::AdminBalance))
    );
    ledger.register("ops".into(), Role::Admin, dec!(0)).unwrap();

    assert_eq!(
        ledger.transfer_as(&user("alice"), &"ops".into(), dec!(60), ""),
        Err(Error::Authz(AuthzError::Forbidden))
    );
    assert_eq!(
        ledger.transfer(&"alice".into(), &"ops".into(), dec!(60), ""),
        Err(Error::Authz(AuthzError::Forbidden))
    );
    // A user identity naming an admin row cannot fund it either.
    assert_eq!(
        ledger.top_up(&user("ops"), dec!(5)),
        Err(Error::Authz(AuthzError::Forbidden))
    );

    assert_eq!(balance(store.as_ref(), "alice"), dec!(100));
    assert_eq!(balance(store.as_ref(), "ops"), dec!(0));
    assert!(store.journal().is_empty());
}

#[test]
fn transfer_as_debits_the_caller() {
    let (store, ledger) = ledger_with(&LedgerConfig::default(), &[("a", dec!(10)), ("b", dec!(0))]);
    let record = ledger.transfer_as(&user("a"), &"b".into(), dec!(4), "lunch").unwrap();
    assert_eq!(record.debit_id, AccountId::from("a"));
    assert_eq!(record.credit_id, AccountId::from("b"));
    assert_eq!(record.description, "lunch");
    assert_eq!(balance(store.as_ref(), "a"), dec!(6));
    assert_eq!(balance(store.as_ref(), "b"), dec!(4));
}

#[test]
fn history_is_own_account_only_and_ordered() {
    let (_, ledger) = ledger_with(
        &LedgerConfig::default(),
        &[("a", dec!(10)), ("b", dec!(10)), ("c", dec!(10))],
    );
    let first = ledger.transfer(&"a".into(), &"b".into(), dec!(1), "1").unwrap();
    ledger.transfer(&"b".into(), &"c".into(), dec!(1), "2").unwrap();
    let third = ledger.transfer(&"c".into(), &"a".into(), dec!(1), "3").unwrap();

    assert_eq!(ledger.history(&user("a"), &"a".into()), Ok(vec![first, third]));
    assert_eq!(
        ledger.history(&user("a"), &"b".into()),
        Err(Error::Authz(AuthzError::Forbidden))
    );
    assert_eq!(
        ledger.history(&admin("ops"), &"a".into()),
        Err(Error::Authz(AuthzError::Forbidden))
    );
}

#[test]
fn register_rejects_duplicate_accounts() {
    let (_, ledger) = ledger_with(&LedgerConfig::default(), &[("a", dec!(1))]);
    assert_eq!(
        ledger.register("a".into(), Role::User, dec!(0)),
        Err(Error::Ledger(LedgerError::DuplicateAccount))
    );
    let account = ledger.register("b".into(), Role::User, dec!(3)).unwrap();
    assert_eq!(account.balance, dec!(3));
    assert_eq!(ledger.store().account(&"b".into()), Ok(account));
}

// === Request pipeline: authenticate -> authorize -> mutate ===

fn authenticator() -> (SessionAuthenticator, Arc<TokenCodec>) {
    let codec = Arc::new(
        TokenCodec::with_default_ttl(SecretKey::new("8DF72555912857A43FDAF8135B22A").unwrap())
            .unwrap(),
    );
    (SessionAuthenticator::new(Arc::clone(&codec)), codec)
}

#[test]
fn token_to_transfer_pipeline() {
    let (store, ledger) = ledger_with(&LedgerConfig::default(), &[("a", dec!(100)), ("b", dec!(0))]);
    let (auth, codec) = authenticator();

    let token = codec.generate("a", Role::User).unwrap().to_string();
    let identity = auth.authenticate_headers([("Token", token.as_str())]).unwrap();
    ledger
        .transfer_as(&identity, &"b".into(), dec!(60), "rent")
        .unwrap();

    assert_eq!(balance(store.as_ref(), "a"), dec!(40));
    assert_eq!(balance(store.as_ref(), "b"), dec!(60));
}

#[test]
fn expired_token_aborts_before_mutation() {
    let (store, ledger) = ledger_with(&LedgerConfig::default(), &[("a", dec!(100)), ("b", dec!(0))]);
    let (auth, codec) = authenticator();

    let token = codec
        .generate_at("a", Role::User, Utc::now() - TimeDelta::days(2))
        .unwrap()
        .to_string();
    let result = auth
        .authenticate(&token)
        .map_err(Error::from)
        .and_then(|identity| ledger.transfer_as(&identity, &"b".into(), dec!(60), ""));

    assert_eq!(result, Err(Error::Token(TokenError::Expired)));
    assert_eq!(balance(store.as_ref(), "a"), dec!(100));
}

#[test]
fn admin_token_cannot_top_up() {
    let (store, ledger) = ledger_with(&LedgerConfig::default(), &[("ops", dec!(0))]);
    let (auth, codec) = authenticator();

    let token = codec.generate("ops", Role::Admin).unwrap().to_string();
    let identity = auth.authenticate(&token).unwrap();
    assert_eq!(
        ledger.top_up(&identity, dec!(10)),
        Err(Error::Authz(AuthzError::Forbidden))
    );
    assert_eq!(balance(store.as_ref(), "ops"), dec!(0));
}
