//! Validated identifier and value newtypes.
//!
//! Catalog rows are keyed by 64-bit integers; the wrappers here keep the
//! different id spaces from being mixed up at compile time. [`Digest`] is the
//! one value type with real validation: every blob reference in the system
//! flows through it.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Raw row id.
            pub const fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Identifier for [`crate::domain::Account`] rows.
    AccountId
);
row_id!(
    /// Identifier for [`crate::domain::SyncRoot`] rows.
    SyncRootId
);
row_id!(
    /// Identifier for [`crate::domain::BackupItem`] rows.
    BackupItemId
);
row_id!(
    /// Identifier for [`crate::domain::FileVersion`] rows.
    FileVersionId
);
row_id!(
    /// Identifier for [`crate::domain::SyncSession`] rows.
    SessionId
);

// ============================================================================
// ProviderKind
// ============================================================================

/// Cloud storage provider tag.
///
/// Selects the [`crate::ports::ProviderClient`] implementation for an
/// account and names the provider directory under the backup root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    GoogleDrive,
    OneDrive,
}

impl ProviderKind {
    /// Stable string form used in the catalog, the secrets file, and on disk.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::GoogleDrive => "google_drive",
            ProviderKind::OneDrive => "onedrive",
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_drive" => Ok(ProviderKind::GoogleDrive),
            "onedrive" => Ok(ProviderKind::OneDrive),
            other => Err(DomainError::UnknownProvider(other.to_string())),
        }
    }
}

// ============================================================================
// Digest
// ============================================================================

/// A content digest of the form `sha256:<64 lowercase hex>`.
///
/// The digest is the primary key of a blob: its on-disk location, its catalog
/// row, and every [`crate::domain::FileVersion`] reference are derived from
/// it. Construction validates the algorithm tag, length, and hex alphabet;
/// other algorithms are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

/// Algorithm prefix accepted by [`Digest::parse`].
const DIGEST_PREFIX: &str = "sha256:";

/// Hex length of a SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

impl Digest {
    /// Parse and validate a digest string.
    pub fn parse(s: impl Into<String>) -> Result<Self, DomainError> {
        let s = s.into();
        let hex = s
            .strip_prefix(DIGEST_PREFIX)
            .ok_or_else(|| DomainError::InvalidDigest(s.clone()))?;
        if hex.len() != DIGEST_HEX_LEN {
            return Err(DomainError::InvalidDigest(s));
        }
        if !hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(DomainError::InvalidDigest(s));
        }
        Ok(Self(s))
    }

    /// Wrap a raw 64-character lowercase hex SHA-256 value.
    pub fn from_sha256_hex(hex: &str) -> Result<Self, DomainError> {
        Self::parse(format!("{DIGEST_PREFIX}{hex}"))
    }

    /// Full digest string, `sha256:` prefix included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 64-character hex value without the algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.0[DIGEST_PREFIX.len()..]
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..DIGEST_PREFIX.len() + 12]
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn digest_parse_valid() {
        let digest = Digest::from_sha256_hex(EMPTY_SHA256).unwrap();
        assert_eq!(digest.hex(), EMPTY_SHA256);
        assert_eq!(digest.as_str(), format!("sha256:{EMPTY_SHA256}"));
        assert_eq!(digest.short(), "sha256:e3b0c44298fc");
    }

    #[test]
    fn digest_rejects_other_algorithms() {
        let err = Digest::parse(format!("md5:{EMPTY_SHA256}")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidDigest(_)));
    }

    #[test]
    fn digest_rejects_bad_length() {
        assert!(Digest::parse("sha256:abc123").is_err());
        assert!(Digest::parse(format!("sha256:{EMPTY_SHA256}ff")).is_err());
    }

    #[test]
    fn digest_rejects_non_hex_and_uppercase() {
        let upper = EMPTY_SHA256.to_uppercase();
        assert!(Digest::parse(format!("sha256:{upper}")).is_err());
        let bad = format!("sha256:{}zz", &EMPTY_SHA256[..62]);
        assert!(Digest::parse(bad).is_err());
    }

    #[test]
    fn digest_missing_prefix() {
        assert!(Digest::parse(EMPTY_SHA256).is_err());
    }

    #[test]
    fn provider_kind_round_trip() {
        for kind in [ProviderKind::GoogleDrive, ProviderKind::OneDrive] {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert!("dropbox".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn row_ids_display_as_integers() {
        assert_eq!(AccountId(7).to_string(), "7");
        assert_eq!(SyncRootId::from(3).as_i64(), 3);
    }
}
