//! The pipeline service: wiring, public operations, and the snapshot query.
//!
//! One [`Pipeline`] owns the whole download-and-install machinery. There are
//! no process-wide singletons: construct it once and pass it by reference
//! (or clone the cheap handles it exposes).

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::download::{DownloadManager, HttpClient, Transport};
use crate::events::{PackageStatus, PipelineEvent, StatusBus, StatusRegistry};
use crate::install::InstallManager;
use crate::item::{PackageId, PackageItem};
use crate::library::{LibraryError, LibraryStore};

/// The download-and-install pipeline.
///
/// Control flow: [`enqueue`](Self::enqueue) admits items → the download
/// manager runs up to `C` transfer workers → each completed transfer is
/// handed to the serial install queue → the install worker extracts and
/// registers with the library — with a status event published at every step
/// and [`snapshot`](Self::snapshot) available for late subscribers.
pub struct Pipeline {
    downloads: DownloadManager,
    bus: StatusBus,
    registry: Arc<StatusRegistry>,
    library: Arc<dyn LibraryStore>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Builds a pipeline over the real HTTP transport.
    #[must_use]
    pub fn new(config: PipelineConfig, library: Arc<dyn LibraryStore>) -> Self {
        let transport = Arc::new(HttpClient::with_timeouts(
            config.connect_timeout_secs,
            config.read_timeout_secs,
        ));
        Self::with_transport(config, library, transport)
    }

    /// Builds a pipeline over a custom transport (used by tests).
    #[must_use]
    pub fn with_transport(
        config: PipelineConfig,
        library: Arc<dyn LibraryStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let bus = StatusBus::new();
        let registry = Arc::new(StatusRegistry::new());

        let installs = InstallManager::new(
            Arc::clone(&library),
            bus.clone(),
            Arc::clone(&registry),
            config.images_root.clone(),
            config.runtime_assets_dir.clone(),
        );

        let downloads = DownloadManager::new(
            config.concurrency,
            config.download_root.clone(),
            transport,
            Arc::clone(&library),
            installs,
            bus.clone(),
            Arc::clone(&registry),
        );

        Self {
            downloads,
            bus,
            registry,
            library,
            config,
        }
    }

    /// Requests a package download. No-op (returns `false`) when the id is
    /// already in the pipeline.
    pub fn enqueue(&self, item: PackageItem) -> bool {
        self.downloads.enqueue(item)
    }

    /// Cancels one package, pending or actively downloading.
    pub fn cancel(&self, id: &PackageId) -> bool {
        self.downloads.cancel(id)
    }

    /// Cancels every pending and active download.
    pub fn cancel_all(&self) {
        self.downloads.cancel_all();
    }

    /// Subscribes to pipeline events. Only events published after this call
    /// are delivered; combine with [`snapshot`](Self::snapshot) to
    /// resynchronize.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.bus.subscribe()
    }

    /// Returns the status of every in-flight package (the pull-style query
    /// observers use after a restart).
    #[must_use]
    pub fn snapshot(&self) -> Vec<PackageStatus> {
        self.registry.snapshot()
    }

    /// The library store this pipeline registers installs with.
    #[must_use]
    pub fn library(&self) -> &Arc<dyn LibraryStore> {
        &self.library
    }

    /// The download queue manager (counts and capacity introspection).
    #[must_use]
    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    /// Deletes an installed package: removes the library entry, the
    /// extraction folder, the archive and the cached icon, then publishes
    /// `Reset` so views show the package as available again.
    ///
    /// Refused (returns `false`) while the id is in-flight; cancel first.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError`] when the store removal fails.
    #[instrument(skip(self))]
    pub async fn delete_package(&self, id: &PackageId) -> Result<bool, LibraryError> {
        if self.registry.contains(id) {
            warn!("refusing to delete in-flight package");
            return Ok(false);
        }

        let removed = self.library.remove(id).await?;
        if !removed {
            return Ok(false);
        }

        // Best-effort file cleanup; a missing file is not an error.
        let folder = self.config.download_root.join(id.as_str());
        let archive = self.config.download_root.join(format!("{id}.zip"));
        let icon = self.config.images_root.join(format!("{id}.png"));
        let _ = tokio::fs::remove_dir_all(&folder).await;
        let _ = tokio::fs::remove_file(&archive).await;
        let _ = tokio::fs::remove_file(&icon).await;

        info!("package deleted from library");
        self.bus.publish(PipelineEvent::Reset { id: id.clone() });
        Ok(true)
    }
}
