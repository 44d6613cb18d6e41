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

//! Stateless signed session tokens.
//!
//! A token is the wire string `<hex(claim)>.<hex(signature)>` where `claim`
//! is the compact JSON encoding of a [`Claim`] and `signature` is
//! HMAC-SHA256 over exactly those bytes. Verification recomputes the MAC
//! over the received bytes, so the encoding never has to be reproduced.
//!
//! # Example
//!
//! ```
//! use gobank_core::{Role, SecretKey, TokenCodec};
//!
//! let codec = TokenCodec::with_default_ttl(SecretKey::new("secret").unwrap()).unwrap();
//! let token = codec.generate("acc-1", Role::User).unwrap().to_string();
//! let claim = codec.verify(&token).unwrap();
//! assert_eq!(claim.id, "acc-1");
//! ```

use crate::base::Role;
use crate::config::{SecretKey, TokenConfig};
use crate::error::{ConfigError, TokenError};
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;

/// Longest accepted token lifetime: 100 years.
pub const MAX_TTL_SECS: i64 = 100 * 365 * 86_400;

/// Identity claims carried by a token.
///
/// Field order is the serialization order and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub role: Role,
    #[serde(rename = "issueAt", with = "timestamp")]
    pub issued_at: DateTime<Utc>,
    #[serde(rename = "expiredAt", with = "timestamp")]
    pub expires_at: DateTime<Utc>,
}

impl Claim {
    /// A claim is valid up to and including its expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Fixed textual timestamp format: RFC 3339, UTC, nanoseconds, `Z` suffix.
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Claim bytes paired with their signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    claim_bytes: Vec<u8>,
    signature: Vec<u8>,
}

impl SignedToken {
    pub fn from_parts(claim_bytes: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            claim_bytes,
            signature,
        }
    }

    pub fn claim_bytes(&self) -> &[u8] {
        &self.claim_bytes
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Splits and hex-decodes the wire form.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Malformed`] unless the input is exactly two
    /// non-empty lowercase hex segments separated by a single `.`.
    pub fn parse(wire: &str) -> Result<Self, TokenError> {
        let mut segments = wire.split('.');
        let (Some(claim), Some(signature), None) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(TokenError::Malformed);
        };
        if !is_lower_hex(claim) || !is_lower_hex(signature) {
            return Err(TokenError::Malformed);
        }

        Ok(Self {
            claim_bytes: hex::decode(claim).map_err(|_| TokenError::Malformed)?,
            signature: hex::decode(signature).map_err(|_| TokenError::Malformed)?,
        })
    }
}

/// One spelling per token: `hex::decode` alone would also accept uppercase.
fn is_lower_hex(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl fmt::Display for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            hex::encode(&self.claim_bytes),
            hex::encode(&self.signature)
        )
    }
}

impl FromStr for SignedToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignedToken::parse(s)
    }
}

/// Issues and verifies signed tokens with the process-wide secret.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
    ttl: TimeDelta,
}

impl TokenCodec {
    pub fn new(secret: SecretKey, ttl: TimeDelta) -> Result<Self, ConfigError> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ConfigError::Invalid {
            key: "token.secret",
            value: "<redacted>".into(),
        })?;
        if ttl <= TimeDelta::zero() || ttl.num_seconds() > MAX_TTL_SECS {
            return Err(ConfigError::Invalid {
                key: "token.ttl_secs",
                value: ttl.num_seconds().to_string(),
            });
        }
        Ok(Self { mac, ttl })
    }

    /// Codec issuing tokens valid for 24 hours.
    pub fn with_default_ttl(secret: SecretKey) -> Result<Self, ConfigError> {
        Self::new(secret, TimeDelta::hours(24))
    }

    pub fn from_config(config: &TokenConfig) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::Invalid {
            key: "token.ttl_secs",
            value: config.ttl_secs.to_string(),
        };
        let secs = i64::try_from(config.ttl_secs).map_err(|_| invalid())?;
        let ttl = TimeDelta::try_seconds(secs).ok_or_else(invalid)?;
        Self::new(config.secret.clone(), ttl)
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    pub fn generate(&self, subject_id: &str, role: Role) -> Result<SignedToken, TokenError> {
        self.generate_at(subject_id, role, Utc::now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn generate_at(
        &self,
        subject_id: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<SignedToken, TokenError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| TokenError::ClaimEncoding("expiry is out of range".into()))?;
        let claim = Claim {
            id: subject_id.to_owned(),
            role,
            issued_at: now,
            expires_at,
        };
        let claim_bytes =
            serde_json::to_vec(&claim).map_err(|e| TokenError::ClaimEncoding(e.to_string()))?;
        let signature = self.sign(&claim_bytes);
        Ok(SignedToken::from_parts(claim_bytes, signature))
    }

    pub fn verify(&self, wire: &str) -> Result<Claim, TokenError> {
        self.verify_at(wire, Utc::now())
    }

    /// Verifies a wire token against the clock value `now`.
    ///
    /// # Errors
    ///
    /// - [`TokenError::Malformed`] - Not two hex segments.
    /// - [`TokenError::Tampered`] - MAC mismatch over the claim bytes.
    /// - [`TokenError::Expired`] - Valid signature, but `now > expiresAt`.
    /// - [`TokenError::ClaimEncoding`] - Valid signature over bytes that are not a claim.
    pub fn verify_at(&self, wire: &str, now: DateTime<Utc>) -> Result<Claim, TokenError> {
        let token = SignedToken::parse(wire)?;
        self.verify_token(&token, now)
    }

    pub fn verify_token(&self, token: &SignedToken, now: DateTime<Utc>) -> Result<Claim, TokenError> {
        let mut mac = self.mac.clone();
        mac.update(token.claim_bytes());
        // verify_slice compares in constant time
        mac.verify_slice(token.signature())
            .map_err(|_| TokenError::Tampered)?;

        let claim: Claim = serde_json::from_slice(token.claim_bytes())
            .map_err(|e| TokenError::ClaimEncoding(e.to_string()))?;
        if claim.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(claim)
    }

    fn sign(&self, claim_bytes: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(claim_bytes);
        mac.finalize().into_bytes().to_vec()
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
