//! Download queue manager: bounded-concurrency admission and cancellation.
//!
//! # Concurrency Model
//!
//! - Each transfer runs in its own Tokio task
//! - Admission is FIFO: the pending queue drains in arrival order whenever a
//!   slot frees up (completion, failure, or cancellation)
//! - At most `capacity` transfers run at once
//! - Pending queue and active map share one mutex, never held across await
//! - Cancellation is a per-transfer `CancellationToken`; pending items are
//!   removed before any worker observes them

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::client::Transport;
use super::error::DownloadError;
use super::worker;
use crate::config::MAX_CONCURRENCY;
use crate::events::{PackagePhase, PipelineEvent, StatusBus, StatusRegistry};
use crate::install::InstallManager;
use crate::item::{PackageId, PackageItem};
use crate::library::{EntryStatus, LibraryStore};

/// Download-side queue state. A single lock guards both structures so
/// admission and worker-completion callbacks never race.
struct QueueState {
    pending: VecDeque<PackageItem>,
    active: HashMap<PackageId, ActiveTransfer>,
}

struct ActiveTransfer {
    cancel: CancellationToken,
}

/// Admits package downloads, bounds concurrent transfer workers, and hands
/// completed archives to the install queue.
///
/// Cheap to clone; all clones share the same queue.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<QueueState>,
    capacity: usize,
    transport: Arc<dyn Transport>,
    library: Arc<dyn LibraryStore>,
    installs: InstallManager,
    bus: StatusBus,
    registry: Arc<StatusRegistry>,
    download_root: PathBuf,
}

impl DownloadManager {
    /// Creates a manager running at most `capacity` concurrent transfers
    /// (clamped to 1..=10), downloading into `download_root`.
    #[must_use]
    pub fn new(
        capacity: usize,
        download_root: PathBuf,
        transport: Arc<dyn Transport>,
        library: Arc<dyn LibraryStore>,
        installs: InstallManager,
        bus: StatusBus,
        registry: Arc<StatusRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    active: HashMap::new(),
                }),
                capacity: capacity.clamp(1, MAX_CONCURRENCY),
                transport,
                library,
                installs,
                bus,
                registry,
                download_root,
            }),
        }
    }

    /// Configured concurrency bound.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of items waiting for a slot.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    /// Number of transfers currently running.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.inner.lock_state().active.len()
    }

    /// Admits a package into the download queue.
    ///
    /// Returns `false` (no-op) when the id is already anywhere in the
    /// pipeline. Otherwise the item joins the pending queue, `Queued` is
    /// published, and a transfer starts immediately if a slot is free.
    #[instrument(skip(self, item), fields(id = %item.id))]
    pub fn enqueue(&self, item: PackageItem) -> bool {
        if !self.inner.registry.admit(&item) {
            debug!("package already in pipeline, ignoring enqueue");
            return false;
        }

        let id = item.id.clone();
        self.inner.lock_state().pending.push_back(item);
        self.inner.bus.publish(PipelineEvent::Queued { id });
        Inner::pump(&self.inner);
        true
    }

    /// Cancels one package.
    ///
    /// Pending items are removed before any worker observes them, so no
    /// `Downloading` event is ever seen; they still end `Cancelled`. Active
    /// transfers are signalled and emit `Cancelled` on acknowledgment.
    /// Returns `false` when the id is not in the download queue.
    #[instrument(skip(self))]
    pub fn cancel(&self, id: &PackageId) -> bool {
        enum Disposition {
            Pending,
            Active,
            Unknown,
        }

        let disposition = {
            let mut state = self.inner.lock_state();
            if let Some(index) = state.pending.iter().position(|item| &item.id == id) {
                state.pending.remove(index);
                Disposition::Pending
            } else if let Some(active) = state.active.get(id) {
                active.cancel.cancel();
                Disposition::Active
            } else {
                Disposition::Unknown
            }
        };

        match disposition {
            Disposition::Pending => {
                info!("cancelled pending download");
                self.inner.registry.set_phase(id, PackagePhase::Cancelled);
                self.inner
                    .bus
                    .publish(PipelineEvent::Cancelled { id: id.clone() });
                true
            }
            Disposition::Active => {
                info!("signalled active download to cancel");
                true
            }
            Disposition::Unknown => false,
        }
    }

    /// Cancels everything: clears the pending queue, then signals every
    /// active transfer.
    #[instrument(skip(self))]
    pub fn cancel_all(&self) {
        let (removed, tokens) = {
            let mut state = self.inner.lock_state();
            let removed: Vec<PackageItem> = state.pending.drain(..).collect();
            let tokens: Vec<CancellationToken> = state
                .active
                .values()
                .map(|active| active.cancel.clone())
                .collect();
            (removed, tokens)
        };

        info!(
            pending = removed.len(),
            active = tokens.len(),
            "cancelling all downloads"
        );

        for item in removed {
            self.inner
                .registry
                .set_phase(&item.id, PackagePhase::Cancelled);
            self.inner
                .bus
                .publish(PipelineEvent::Cancelled { id: item.id });
        }
        for token in tokens {
            token.cancel();
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts pending transfers while free slots remain.
    fn pump(inner: &Arc<Inner>) {
        loop {
            let (item, cancel) = {
                let mut state = inner.lock_state();
                if state.active.len() >= inner.capacity {
                    return;
                }
                let Some(item) = state.pending.pop_front() else {
                    return;
                };
                let cancel = CancellationToken::new();
                state.active.insert(
                    item.id.clone(),
                    ActiveTransfer {
                        cancel: cancel.clone(),
                    },
                );
                (item, cancel)
            };
            Inner::spawn_transfer(inner, item, cancel);
        }
    }

    fn spawn_transfer(inner: &Arc<Inner>, item: PackageItem, cancel: CancellationToken) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            inner.registry.set_phase(&item.id, PackagePhase::Downloading);
            inner.bus.publish(PipelineEvent::Downloading {
                id: item.id.clone(),
            });

            let result = worker::run_transfer(
                inner.transport.as_ref(),
                inner.library.as_ref(),
                &item,
                &inner.download_root,
                &cancel,
                &inner.bus,
                &inner.registry,
            )
            .await;

            Inner::finish_transfer(&inner, item, result).await;
        });
    }

    /// Handles a worker's terminal outcome: frees the slot, starts the next
    /// pending item, and on success hands the archive to the install queue.
    async fn finish_transfer(
        inner: &Arc<Inner>,
        item: PackageItem,
        result: Result<PathBuf, DownloadError>,
    ) {
        inner.lock_state().active.remove(&item.id);

        match result {
            Ok(archive) => {
                info!(id = %item.id, "download complete");
                inner.registry.set_phase(&item.id, PackagePhase::Downloaded);
                inner.bus.publish(PipelineEvent::Downloaded {
                    id: item.id.clone(),
                });
                Inner::pump(inner);
                inner.installs.submit(archive, item);
            }
            Err(DownloadError::Cancelled) => {
                info!(id = %item.id, "download cancelled");
                inner.restore_update_marker(&item.id).await;
                inner.registry.set_phase(&item.id, PackagePhase::Cancelled);
                inner.bus.publish(PipelineEvent::Cancelled { id: item.id });
                Inner::pump(inner);
            }
            Err(e) => {
                warn!(id = %item.id, error = %e, "download failed");
                inner.restore_update_marker(&item.id).await;
                inner.registry.set_phase(&item.id, PackagePhase::Failed);
                inner.bus.publish(PipelineEvent::Failed {
                    id: item.id,
                    error: e.to_string(),
                });
                Inner::pump(inner);
            }
        }
    }

    /// Reverts the `updating` marker set at transfer start so the library
    /// view doesn't show a stale update badge after a cancelled or failed
    /// re-download.
    async fn restore_update_marker(&self, id: &PackageId) {
        match self.library.get(id).await {
            Ok(Some(entry)) if entry.status() == EntryStatus::Updating => {
                if let Err(e) = self.library.update_status(id, EntryStatus::Installed).await {
                    warn!(id = %id, error = %e, "failed to restore library entry status");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(id = %id, error = %e, "library lookup failed after transfer"),
        }
    }
}
