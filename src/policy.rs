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

//! Role-based access policy.
//!
//! | Operation | Allowed roles | Scope |
//! |-----------|---------------|-------|
//! | top-up, withdrawal, balance | User | own account |
//! | transfer | User | debit account must be own |
//! | transaction history | User | own account |
//! | password change | User, Admin | self only |
//! | registration, login | anyone | - |
//!
//! The table lives in `RULES`; call sites never compare roles themselves.

use crate::base::{AccountId, Identity, Role};
use crate::error::AuthzError;
use tracing::debug;

/// An operation a caller asks to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    TopUp,
    Withdrawal,
    ViewBalance,
    Transfer { debit: AccountId },
    ViewHistory { account: AccountId },
    PasswordChange { subject_id: String },
    Register,
    Login,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    TopUp,
    Withdrawal,
    ViewBalance,
    Transfer,
    ViewHistory,
    PasswordChange,
    Register,
    Login,
}

impl Operation {
    fn kind(&self) -> OperationKind {
        match self {
            Operation::TopUp => OperationKind::TopUp,
            Operation::Withdrawal => OperationKind::Withdrawal,
            Operation::ViewBalance => OperationKind::ViewBalance,
            Operation::Transfer { .. } => OperationKind::Transfer,
            Operation::ViewHistory { .. } => OperationKind::ViewHistory,
            Operation::PasswordChange { .. } => OperationKind::PasswordChange,
            Operation::Register => OperationKind::Register,
            Operation::Login => OperationKind::Login,
        }
    }

    /// Subject the operation acts on, when it targets a specific one.
    fn target(&self) -> Option<&str> {
        match self {
            Operation::Transfer { debit } => Some(debit.as_str()),
            Operation::ViewHistory { account } => Some(account.as_str()),
            Operation::PasswordChange { subject_id } => Some(subject_id),
            Operation::TopUp
            | Operation::Withdrawal
            | Operation::ViewBalance
            | Operation::Register
            | Operation::Login => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Gate {
    /// Not gated; no identity required.
    Public,
    /// Authenticated caller with one of `roles`; if `self_only`, the
    /// operation's target must be the caller.
    Roles {
        roles: &'static [Role],
        self_only: bool,
    },
}

const USER_ONLY: &[Role] = &[Role::User];
const ANY_ROLE: &[Role] = &[Role::User, Role::Admin];

const RULES: &[(OperationKind, Gate)] = &[
    (OperationKind::TopUp, Gate::Roles { roles: USER_ONLY, self_only: false }),
    (OperationKind::Withdrawal, Gate::Roles { roles: USER_ONLY, self_only: false }),
    (OperationKind::ViewBalance, Gate::Roles { roles: USER_ONLY, self_only: false }),
    (OperationKind::Transfer, Gate::Roles { roles: USER_ONLY, self_only: true }),
    (OperationKind::ViewHistory, Gate::Roles { roles: USER_ONLY, self_only: true }),
    (OperationKind::PasswordChange, Gate::Roles { roles: ANY_ROLE, self_only: true }),
    (OperationKind::Register, Gate::Public),
    (OperationKind::Login, Gate::Public),
];

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(AuthzError),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), AuthzError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(e) => Err(e),
        }
    }
}

/// Maps (identity, operation) to a [`Decision`] using the fixed rule table.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn new() -> Self {
        AccessPolicy
    }

    /// `identity` is `None` for unauthenticated callers.
    pub fn authorize(&self, identity: Option<&Identity>, operation: &Operation) -> Decision {
        let kind = operation.kind();
        // Operations missing from the table are denied.
        let Some((_, gate)) = RULES.iter().find(|(k, _)| *k == kind) else {
            return Decision::Deny(AuthzError::Forbidden);
        };

        let decision = match (*gate, identity) {
            (Gate::Public, _) => Decision::Allow,
            (Gate::Roles { .. }, None) => Decision::Deny(AuthzError::Forbidden),
            (Gate::Roles { roles, self_only }, Some(identity)) => {
                let role_ok = roles.contains(&identity.role());
                let scope_ok = !self_only
                    || operation
                        .target()
                        .is_some_and(|target| target == identity.subject_id());
                if role_ok && scope_ok {
                    Decision::Allow
                } else {
                    Decision::Deny(AuthzError::Forbidden)
                }
            }
        };

        if let Decision::Deny(_) = decision {
            debug!(?kind, identity = ?identity.map(Identity::to_string), "operation denied");
        }
        decision
    }

    pub fn require(&self, identity: Option<&Identity>, operation: &Operation) -> Result<(), AuthzError> {
        self.authorize(identity, operation).into_result()
    }
}
