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

//! Process configuration.
//!
//! Loaded once at startup and passed by construction into the token codec
//! and the transfer coordinator. Values come from the environment
//! ([`Config::from_env`]) or any deserializer; missing optional values fall
//! back to the defaults below.

use crate::error::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const SECRET_VAR: &str = "GOBANK_TOKEN_SECRET";
pub const TTL_VAR: &str = "GOBANK_TOKEN_TTL_SECS";
pub const RETRIES_VAR: &str = "GOBANK_CREDIT_RETRIES";
pub const LOCK_TIMEOUT_VAR: &str = "GOBANK_LOCK_TIMEOUT_MS";

/// Process-wide token signing secret.
///
/// `Debug` never prints the key material.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        Ok(SecretKey(bytes))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<String> for SecretKey {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SecretKey::new(value.into_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(<{} bytes redacted>)", self.0.len())
    }
}

/// Token issuing settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: SecretKey,

    /// Lifetime of an issued token in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl TokenConfig {
    pub fn new(secret: SecretKey) -> Self {
        Self {
            secret,
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// Ledger mutation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerConfig {
    /// Extra attempts for a failing credit step before rolling back.
    #[serde(default = "default_credit_retries")]
    pub credit_retries: u32,

    /// Upper bound on waiting for an account lock, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Reads ledger settings through `lookup`, keeping defaults for absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LedgerConfig::default();
        if let Some(raw) = lookup(RETRIES_VAR) {
            config.credit_retries = parse_var(RETRIES_VAR, &raw)?;
        }
        if let Some(raw) = lookup(LOCK_TIMEOUT_VAR) {
            config.lock_timeout_ms = parse_var(LOCK_TIMEOUT_VAR, &raw)?;
        }
        Ok(config)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            credit_retries: default_credit_retries(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Complete process configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub token: TokenConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup(SECRET_VAR).ok_or(ConfigError::MissingSecret)?;
        let mut token = TokenConfig::new(SecretKey::try_from(secret)?);
        if let Some(raw) = lookup(TTL_VAR) {
            token.ttl_secs = parse_var(TTL_VAR, &raw)?;
        }

        Ok(Config {
            token,
            ledger: LedgerConfig::from_lookup(lookup)?,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_owned(),
    })
}

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_credit_retries() -> u32 {
    3
}

fn default_lock_timeout_ms() -> u64 {
    1_000
}
