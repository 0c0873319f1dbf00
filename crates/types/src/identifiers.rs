//! Identifier types for world-state entities.
//!
//! Accounts are `name@domain`, assets are `name#domain`. Both halves are kept
//! separate so storage keys can be built without re-parsing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Block height in the chain. Genesis is height 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct BlockHeight(pub u64);

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A domain identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DomainId(pub String);

impl DomainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A role name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleName(pub String);

impl RoleName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An account identifier, rendered as `name@domain`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId {
    pub name: String,
    pub domain: DomainId,
}

impl AccountId {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: DomainId::new(domain),
        }
    }

    /// Parse `name@domain`. Both halves must be non-empty.
    pub fn parse(id: &str) -> Option<Self> {
        let (name, domain) = id.split_once('@')?;
        if name.is_empty() || domain.is_empty() {
            return None;
        }
        Some(Self::new(name, domain))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.domain)
    }
}

/// An asset identifier, rendered as `name#domain`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId {
    pub name: String,
    pub domain: DomainId,
}

impl AssetId {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: DomainId::new(domain),
        }
    }

    /// Parse `name#domain`. Both halves must be non-empty.
    pub fn parse(id: &str) -> Option<Self> {
        let (name, domain) = id.split_once('#')?;
        if name.is_empty() || domain.is_empty() {
            return None;
        }
        Some(Self::new(name, domain))
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_round_trip() {
        let id = AccountId::parse("alice@wonderland").unwrap();
        assert_eq!(id.name, "alice");
        assert_eq!(id.domain.as_str(), "wonderland");
        assert_eq!(id.to_string(), "alice@wonderland");
    }

    #[test]
    fn account_id_rejects_malformed() {
        assert!(AccountId::parse("alice").is_none());
        assert!(AccountId::parse("@domain").is_none());
        assert!(AccountId::parse("alice@").is_none());
    }

    #[test]
    fn asset_id_round_trip() {
        let id = AssetId::parse("coin#test").unwrap();
        assert_eq!(id.name, "coin");
        assert_eq!(id.domain.as_str(), "test");
        assert_eq!(id.to_string(), "coin#test");
    }
}
