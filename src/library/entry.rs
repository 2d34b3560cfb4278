//! Library entry types and status definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::item::PackageId;

/// Status of a library entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Installed and ready to open.
    Installed,
    /// A newer version of the package is currently downloading.
    Updating,
}

impl EntryStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Updating => "updating",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "installed" => Ok(Self::Installed),
            "updating" => Ok(Self::Updating),
            _ => Err(format!("invalid entry status: {s}")),
        }
    }
}

/// One installed package in the library.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LibraryEntry {
    /// Package id, matching the catalogue descriptor.
    pub id: String,
    /// Display name at install time.
    pub name: String,
    /// Extraction folder holding the package content.
    pub local_folder: String,
    /// Catalogue version installed.
    pub version: String,
    /// Hex SHA-256 of the installed archive.
    pub checksum: String,
    /// Current status (stored as text, parsed via `status()`).
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// When the entry was created or last replaced.
    pub installed_at: String,
}

impl LibraryEntry {
    /// Returns the parsed status enum.
    ///
    /// Falls back to `Installed` if the status string is invalid.
    #[must_use]
    pub fn status(&self) -> EntryStatus {
        self.status_str.parse().unwrap_or(EntryStatus::Installed)
    }

    /// Returns the entry's id as a [`PackageId`].
    #[must_use]
    pub fn package_id(&self) -> PackageId {
        PackageId::new(&self.id)
    }
}

/// Fields for creating or replacing a library entry.
#[derive(Debug, Clone)]
pub struct NewLibraryEntry {
    /// Package id.
    pub id: PackageId,
    /// Display name.
    pub name: String,
    /// Extraction folder.
    pub local_folder: PathBuf,
    /// Catalogue version.
    pub version: String,
    /// Hex SHA-256 of the archive.
    pub checksum: String,
}
