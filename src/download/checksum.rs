//! SHA-256 helpers for verifying downloaded archives.

use sha2::{Digest, Sha256};

/// Incrementally computes the SHA-256 digest of a streamed download.
///
/// Fed one chunk at a time by the transfer worker so verification adds no
/// second pass over the file.
#[derive(Default)]
pub(crate) struct StreamingChecksum {
    hasher: Sha256,
}

impl StreamingChecksum {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Finalizes the digest as lowercase hex.
    pub(crate) fn finalize(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

/// Compares two hex digests, ignoring case.
pub(crate) fn digests_match(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}
