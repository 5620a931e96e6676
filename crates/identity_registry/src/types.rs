//! Types for the identity registry

use crate::errors::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Length of an identity hash in bytes
pub const IDENTITY_HASH_LEN: usize = 32;
/// Maximum metadata length in characters
pub const MAX_METADATA_CHARS: usize = 500;
/// Maximum change description length in characters
pub const MAX_CHANGES_CHARS: usize = 200;
/// Maximum status text length in ASCII characters
pub const MAX_STATUS_LEN: usize = 20;

pub const VERIFIED_DESCRIPTION: &str = "Identity verified";
pub const TRANSFER_DESCRIPTION: &str = "Ownership transferred";

/// Digest of a person's private identity data; primary key of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityHash(pub [u8; IDENTITY_HASH_LEN]);

impl IdentityHash {
    pub fn new(bytes: [u8; IDENTITY_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from an untrusted byte slice, rejecting anything but 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; IDENTITY_HASH_LEN] =
            bytes.try_into().map_err(|_| RegistryError::InvalidHash)?;
        Ok(Self(array))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|_| RegistryError::InvalidHash)?;
        Self::from_slice(&bytes)
    }

    /// SHA-256 of raw identity data. Only the digest ever reaches the registry.
    pub fn digest(identity_data: &[u8]) -> Self {
        Self(Sha256::digest(identity_data).into())
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_HASH_LEN] {
        &self.0
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Account identifier asserted by the execution environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| RegistryError::InvalidAccount(format!("{s}: {e}")))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RegistryError::InvalidAccount(format!("{s} must be 32 bytes")))?;
        Ok(Self(array))
    }
}

/// Identity status
///
/// Only the first three values are produced by `register`, `verify` and
/// `suspend`. `set_status` stores owner-supplied text verbatim, which lands in
/// `Custom` unless it spells one of the canonical values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IdentityStatus {
    Registered,
    Verified,
    Suspended,
    Custom(String),
}

impl IdentityStatus {
    /// Parse owner-supplied status text
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() > MAX_STATUS_LEN || !text.is_ascii() {
            return Err(RegistryError::InvalidStatus);
        }
        Ok(match text {
            "registered" => IdentityStatus::Registered,
            "verified" => IdentityStatus::Verified,
            "suspended" => IdentityStatus::Suspended,
            other => IdentityStatus::Custom(other.to_string()),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            IdentityStatus::Registered => "registered",
            IdentityStatus::Verified => "verified",
            IdentityStatus::Suspended => "suspended",
            IdentityStatus::Custom(text) => text,
        }
    }
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for IdentityStatus {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<IdentityStatus> for String {
    fn from(status: IdentityStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Identity record keyed by [`IdentityHash`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Account currently controlling the record
    pub owner: AccountId,
    /// Block height at registration
    pub registered_at: u64,
    pub metadata: String,
    pub status: IdentityStatus,
    pub verified: bool,
}

/// One entry of the per-identity audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub updated_by: AccountId,
    pub timestamp: u64,
    pub changes: String,
    /// Metadata as it was before the change
    pub previous_metadata: String,
}

/// Caller identity and logical clock for a single operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: AccountId,
    pub block_height: u64,
}

impl CallContext {
    pub fn new(caller: AccountId, block_height: u64) -> Self {
        Self {
            caller,
            block_height,
        }
    }
}

pub(crate) fn validate_metadata(metadata: &str) -> Result<()> {
    if metadata.chars().count() > MAX_METADATA_CHARS {
        return Err(RegistryError::InvalidMetadata);
    }
    Ok(())
}

pub(crate) fn validate_changes(changes: &str) -> Result<()> {
    if changes.chars().count() > MAX_CHANGES_CHARS {
        return Err(RegistryError::InvalidChanges);
    }
    Ok(())
}
