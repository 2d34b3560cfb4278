//! Error types for the install module.

use std::path::PathBuf;

use thiserror::Error;

use crate::item::PackageId;
use crate::library::LibraryError;

/// Errors that can occur while extracting and registering a package.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The archive is corrupt or an entry could not be read.
    #[error("archive error in {path}: {source}")]
    Archive {
        /// The archive that failed to extract.
        path: PathBuf,
        /// The underlying zip error.
        #[source]
        source: zip::result::ZipError,
    },

    /// File system error while extracting or copying assets.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Extraction succeeded but the package manifest was not found, so
    /// there is no installable content to register.
    #[error("no package manifest found under {folder}")]
    ManifestNotFound {
        /// The extraction folder that was searched.
        folder: PathBuf,
    },

    /// The library store rejected the registration.
    #[error("library registration failed for {id}: {source}")]
    Registration {
        /// The package that could not be registered.
        id: PackageId,
        /// The underlying store error.
        #[source]
        source: LibraryError,
    },

    /// The blocking extraction task panicked or was aborted.
    #[error("install task failed: {reason}")]
    TaskFailed {
        /// Join error description.
        reason: String,
    },
}

impl InstallError {
    /// Creates an archive error.
    pub fn archive(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a manifest-not-found error.
    pub fn manifest_not_found(folder: impl Into<PathBuf>) -> Self {
        Self::ManifestNotFound {
            folder: folder.into(),
        }
    }

    /// Creates a registration error.
    pub fn registration(id: PackageId, source: LibraryError) -> Self {
        Self::Registration { id, source }
    }

    /// Creates a task-failure error.
    pub fn task_failed(reason: impl Into<String>) -> Self {
        Self::TaskFailed {
            reason: reason.into(),
        }
    }
}
