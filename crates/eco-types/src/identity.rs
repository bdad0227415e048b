use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Verified user identifier. Partition key of the user's ledger.
///
/// The value is whatever the upstream identity provider hands over (the
/// token subject); this type only guarantees it is non-empty.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Create an owner id, rejecting empty or blank input.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(TypeError::EmptyIdentifier);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog identifier of a voucher definition, without any storage prefix.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoucherId(String);

impl VoucherId {
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(TypeError::EmptyIdentifier);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoucherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(id: OwnerId) -> Self {
        id.0
    }
}

impl TryFrom<String> for VoucherId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VoucherId> for String {
    fn from(id: VoucherId) -> Self {
        id.0
    }
}

/// An already-authenticated caller.
///
/// The admin flag is normalized by the authentication collaborator from
/// whatever group claims it received; the ledger never sees raw claims.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub id: OwnerId,
    pub is_admin: bool,
}

impl Caller {
    pub fn user(id: OwnerId) -> Self {
        Self {
            id,
            is_admin: false,
        }
    }

    pub fn admin(id: OwnerId) -> Self {
        Self { id, is_admin: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_id_rejects_blank() {
        assert_eq!(OwnerId::new("").unwrap_err(), TypeError::EmptyIdentifier);
        assert_eq!(OwnerId::new("  ").unwrap_err(), TypeError::EmptyIdentifier);
    }

    #[test]
    fn owner_id_display_is_raw_value() {
        let id = OwnerId::new("user-123").unwrap();
        assert_eq!(id.to_string(), "user-123");
        assert_eq!(format!("{id:?}"), "OwnerId(user-123)");
    }

    #[test]
    fn caller_variants() {
        let id = OwnerId::new("alice").unwrap();
        assert!(!Caller::user(id.clone()).is_admin);
        assert!(Caller::admin(id).is_admin);
    }

    #[test]
    fn serde_uses_plain_strings() {
        let id = OwnerId::new("bob").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"bob\"");
        let voucher: VoucherId = serde_json::from_str("\"v-1\"").unwrap();
        assert_eq!(voucher.as_str(), "v-1");
        assert!(serde_json::from_str::<OwnerId>("\"\"").is_err());
    }
}
