//! Package item descriptor and identity types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable, globally unique identifier for a content package.
///
/// All membership and lookup operations in the pipeline key on this id.
/// Structural equality of descriptors is never used for identity, so two
/// descriptors with the same id are the same package as far as the queues
/// are concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(String);

impl PackageId {
    /// Creates a package id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Describes one downloadable content package from the remote catalogue.
///
/// Descriptors are created when a user requests a package and discarded once
/// installation completes or the operation ends cancelled/failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageItem {
    /// Stable identifier, unique across the catalogue.
    pub id: PackageId,
    /// Where to fetch the archive from.
    pub source_url: String,
    /// Size advertised by the catalogue; used for progress when the
    /// transport does not expose a content length. May be imprecise.
    pub declared_size_bytes: u64,
    /// Hex-encoded SHA-256 of the archive. Empty disables verification.
    #[serde(default)]
    pub checksum: String,
    /// Catalogue version of the package.
    #[serde(default)]
    pub version: String,
    /// Human-readable name shown in package lists.
    pub display_name: String,
}

impl PackageItem {
    /// Archive filename for this package (`{id}.zip`).
    #[must_use]
    pub fn archive_filename(&self) -> String {
        format!("{}.zip", self.id)
    }
}

impl fmt::Display for PackageItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}
