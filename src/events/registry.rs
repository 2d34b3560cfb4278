//! Pull-style snapshot of in-flight package statuses.
//!
//! The registry tracks the last known status of every package currently in
//! the pipeline. Entries appear on admission and disappear on any terminal
//! phase, so a snapshot contains exactly the set of queued, downloading and
//! installing items a late subscriber needs to resynchronize its view.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;

use super::PackagePhase;
use crate::item::{PackageId, PackageItem};

/// Externally observable projection of one in-flight package.
#[derive(Debug, Clone, Serialize)]
pub struct PackageStatus {
    /// The package the status concerns.
    pub id: PackageId,
    /// Current stage in the pipeline.
    pub phase: PackagePhase,
    /// Bytes transferred so far (0 until downloading starts).
    pub bytes: u64,
    /// Expected total bytes (declared size until the transport reports one).
    pub total: u64,
}

/// Registry of in-flight package statuses, shared across both queue managers.
///
/// Admission doubles as the pipeline-wide duplicate check: an id is claimed
/// atomically on [`admit`](Self::admit) and released when a terminal phase
/// is recorded, which keeps every id in at most one pipeline stage at a time.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    statuses: DashMap<PackageId, PackageStatus>,
}

impl StatusRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims an id for admission into the pipeline.
    ///
    /// Returns `false` when the id is already anywhere in the pipeline, in
    /// which case the caller must treat the enqueue as a no-op.
    pub fn admit(&self, item: &PackageItem) -> bool {
        match self.statuses.entry(item.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(PackageStatus {
                    id: item.id.clone(),
                    phase: PackagePhase::Queued,
                    bytes: 0,
                    total: item.declared_size_bytes,
                });
                true
            }
        }
    }

    /// Whether the id is currently in the pipeline.
    #[must_use]
    pub fn contains(&self, id: &PackageId) -> bool {
        self.statuses.contains_key(id)
    }

    /// Records a phase transition. Terminal phases release the id.
    pub fn set_phase(&self, id: &PackageId, phase: PackagePhase) {
        if phase.is_terminal() {
            self.statuses.remove(id);
        } else if let Some(mut status) = self.statuses.get_mut(id) {
            status.phase = phase;
        }
    }

    /// Records transfer progress for an in-flight package.
    pub fn set_progress(&self, id: &PackageId, bytes: u64, total: u64) {
        if let Some(mut status) = self.statuses.get_mut(id) {
            status.bytes = bytes;
            status.total = total;
        }
    }

    /// Releases an id without recording a phase (e.g. a silently removed
    /// pending item).
    pub fn remove(&self, id: &PackageId) {
        self.statuses.remove(id);
    }

    /// Returns the status of every in-flight package.
    ///
    /// Order is unspecified; callers sort as needed for display.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PackageStatus> {
        self.statuses
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of in-flight packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Whether the pipeline has no in-flight packages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}
