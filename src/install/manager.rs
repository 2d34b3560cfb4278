//! Install queue manager: strictly serial extraction of completed downloads.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, instrument, warn};

use super::worker;
use crate::events::{PackagePhase, PipelineEvent, StatusBus, StatusRegistry};
use crate::item::{PackageId, PackageItem};
use crate::library::LibraryStore;

/// Install-side queue state. One lock guards both the queue and the active
/// marker.
struct InstallQueueState {
    queue: VecDeque<InstallRequest>,
    active: Option<PackageId>,
}

struct InstallRequest {
    archive: PathBuf,
    item: PackageItem,
}

/// Serial queue of completed downloads awaiting installation.
///
/// Exactly one install worker runs at a time, independent of how many
/// transfer workers complete concurrently. Requests run in FIFO submit
/// order. Cheap to clone; all clones share the same queue.
#[derive(Clone)]
pub struct InstallManager {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<InstallQueueState>,
    library: Arc<dyn LibraryStore>,
    bus: StatusBus,
    registry: Arc<StatusRegistry>,
    images_root: PathBuf,
    runtime_assets_dir: Option<PathBuf>,
}

impl InstallManager {
    /// Creates an install manager publishing on `bus` and registering
    /// installs with `library`.
    #[must_use]
    pub fn new(
        library: Arc<dyn LibraryStore>,
        bus: StatusBus,
        registry: Arc<StatusRegistry>,
        images_root: PathBuf,
        runtime_assets_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(InstallQueueState {
                    queue: VecDeque::new(),
                    active: None,
                }),
                library,
                bus,
                registry,
                images_root,
                runtime_assets_dir,
            }),
        }
    }

    /// Number of requests waiting behind the active install.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    /// Whether an install worker is currently running.
    #[must_use]
    pub fn is_installing(&self) -> bool {
        self.inner.lock_state().active.is_some()
    }

    /// Appends a completed download to the install queue.
    ///
    /// Duplicate submissions for an id already queued or installing are
    /// ignored. Starts the worker immediately when no install is active.
    #[instrument(skip(self, archive, item), fields(id = %item.id))]
    pub fn submit(&self, archive: PathBuf, item: PackageItem) {
        {
            let mut state = self.inner.lock_state();
            let already_submitted = state.active.as_ref() == Some(&item.id)
                || state.queue.iter().any(|request| request.item.id == item.id);
            if already_submitted {
                debug!("install already queued, ignoring submit");
                return;
            }
            state.queue.push_back(InstallRequest {
                archive,
                item: item.clone(),
            });
        }

        self.inner
            .registry
            .set_phase(&item.id, PackagePhase::InstallQueued);
        self.inner
            .bus
            .publish(PipelineEvent::InstallQueued { id: item.id });
        Inner::pump(&self.inner);
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, InstallQueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the next queued install when the worker slot is free.
    fn pump(inner: &Arc<Inner>) {
        let request = {
            let mut state = inner.lock_state();
            if state.active.is_some() {
                return;
            }
            let Some(request) = state.queue.pop_front() else {
                return;
            };
            state.active = Some(request.item.id.clone());
            request
        };

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            Inner::run_next(&inner, request).await;
        });
    }

    async fn run_next(inner: &Arc<Inner>, request: InstallRequest) {
        let id = request.item.id.clone();

        inner.registry.set_phase(&id, PackagePhase::Installing);
        inner
            .bus
            .publish(PipelineEvent::Installing { id: id.clone() });

        let result = worker::run_install(
            &request.archive,
            &request.item,
            &inner.images_root,
            inner.runtime_assets_dir.as_deref(),
            inner.library.as_ref(),
        )
        .await;

        match result {
            Ok(folder) => {
                info!(id = %id, folder = %folder.display(), "install complete");
                inner.registry.set_phase(&id, PackagePhase::Installed);
                inner.bus.publish(PipelineEvent::Installed { id });
            }
            Err(e) => {
                // Extraction and registration failures surface as a distinct
                // terminal event, never as success.
                warn!(id = %id, error = %e, "install failed");
                inner.registry.set_phase(&id, PackagePhase::Failed);
                inner.bus.publish(PipelineEvent::Failed {
                    id,
                    error: e.to_string(),
                });
            }
        }

        inner.lock_state().active = None;
        Inner::pump(inner);
    }
}
