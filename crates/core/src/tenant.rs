// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant identifier with the grammar and reserved-name rules from the
//! key namespace spec: lowercase alphanumeric plus `-`, 3-32 chars, must
//! not start or end with `-`.

use serde::{Deserialize, Serialize};
use std::fmt;

const RESERVED: &[&str] = &["system", "admin", "default", "test"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TenantIdError {
    #[error("tenant id must be 3-32 characters, got {0}")]
    BadLength(usize),
    #[error("tenant id must be lowercase alphanumeric plus '-': {0:?}")]
    BadCharacters(String),
    #[error("tenant id must not start or end with '-': {0:?}")]
    BadEdge(String),
    #[error("tenant id {0:?} is reserved")]
    Reserved(String),
}

/// A validated, multi-tenant namespacing key.
///
/// Construction is fallible and never panics: an invalid tenant ID is a
/// `ConfigError`-shaped problem (spec §7), not a poison-pill.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, TenantIdError> {
        let raw = raw.into();
        if raw.len() < 3 || raw.len() > 32 {
            return Err(TenantIdError::BadLength(raw.len()));
        }
        if !raw.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(TenantIdError::BadCharacters(raw));
        }
        if raw.starts_with('-') || raw.ends_with('-') {
            return Err(TenantIdError::BadEdge(raw));
        }
        if RESERVED.contains(&raw.as_str()) {
            return Err(TenantIdError::Reserved(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the reserved system-owned IDs (`system`, `admin`, `default`, `test`).
    pub fn is_reserved(raw: &str) -> bool {
        RESERVED.contains(&raw)
    }
}

impl TryFrom<String> for TenantId {
    type Error = TenantIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_tenant() {
        assert!(TenantId::parse("acme-corp").is_ok());
        assert!(TenantId::parse("t1").is_err()); // too short
    }

    #[test]
    fn rejects_bad_length() {
        assert_eq!(TenantId::parse("ab"), Err(TenantIdError::BadLength(2)));
        let long = "a".repeat(33);
        assert_eq!(TenantId::parse(long.clone()), Err(TenantIdError::BadLength(33)));
    }

    #[test]
    fn rejects_uppercase_and_symbols() {
        assert!(matches!(TenantId::parse("Acme"), Err(TenantIdError::BadCharacters(_))));
        assert!(matches!(TenantId::parse("acme_corp"), Err(TenantIdError::BadCharacters(_))));
    }

    #[test]
    fn rejects_leading_trailing_dash() {
        assert!(matches!(TenantId::parse("-acme"), Err(TenantIdError::BadEdge(_))));
        assert!(matches!(TenantId::parse("acme-"), Err(TenantIdError::BadEdge(_))));
    }

    #[test]
    fn rejects_reserved_names() {
        for reserved in ["system", "admin", "default", "test"] {
            assert_eq!(TenantId::parse(reserved), Err(TenantIdError::Reserved(reserved.to_string())));
        }
    }
}
