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

//! Bearer token authentication.
//!
//! Every call re-verifies the token from scratch; nothing about a session is
//! cached on the server.

use crate::base::Identity;
use crate::error::TokenError;
use crate::token::{Claim, TokenCodec};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Request header carrying the session token.
pub const TOKEN_HEADER: &str = "token";

#[derive(Debug, Clone)]
pub struct SessionAuthenticator {
    codec: Arc<TokenCodec>,
}

impl SessionAuthenticator {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    pub fn authenticate(&self, token: &str) -> Result<Identity, TokenError> {
        self.authenticate_at(token, Utc::now())
    }

    pub fn authenticate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, TokenError> {
        match self.codec.verify_at(token, now) {
            Ok(Claim { id, role, .. }) => {
                let identity = Identity::from_parts(id, role);
                debug!(%identity, "session token verified");
                Ok(identity)
            }
            Err(TokenError::Tampered) => {
                warn!(security_event = true, "session token signature mismatch");
                Err(TokenError::Tampered)
            }
            Err(TokenError::Expired) => {
                info!("session token expired");
                Err(TokenError::Expired)
            }
            Err(e) => {
                debug!(error = %e, "session token rejected");
                Err(e)
            }
        }
    }

    /// Authenticates from request headers, matching the header name
    /// case-insensitively.
    pub fn authenticate_headers<'a, I>(&self, headers: I) -> Result<Identity, TokenError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let token = headers
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(TOKEN_HEADER))
            .map(|(_, value)| value.trim())
            .ok_or(TokenError::Missing)?;
        self.authenticate(token)
    }

    /// Issues a fresh wire token for `identity` (login or refresh).
    pub fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
        let token = self.codec.generate(identity.subject_id(), identity.role())?;
        debug!(%identity, "session token issued");
        Ok(token.to_string())
    }
}
