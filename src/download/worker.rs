//! Transfer worker: streams one package archive to disk.
//!
//! One worker handles one archive. It checks the cancellation token before
//! every chunk, reports progress as a monotonic, deduplicated percent
//! stream, and verifies the catalogue checksum incrementally while writing.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::checksum::{StreamingChecksum, digests_match};
use super::client::Transport;
use super::error::DownloadError;
use crate::events::{PipelineEvent, StatusBus, StatusRegistry};
use crate::item::PackageItem;
use crate::library::{EntryStatus, LibraryStore};

/// Downloads one package archive to `{download_root}/{id}.zip`.
///
/// Progress events are emitted only when the whole-number percent strictly
/// increases; when the stream ends short of the expected total (declared
/// sizes are often imprecise) one final 100% event is emitted so consumers
/// always observe completion. Partial files are removed on cancellation and
/// failure.
///
/// Side effect: an already-installed package is marked `updating` in the
/// library while its newer version downloads.
///
/// # Errors
///
/// Returns [`DownloadError::Cancelled`] when the token fires, or the
/// transfer error otherwise.
pub(crate) async fn run_transfer(
    transport: &dyn Transport,
    library: &dyn LibraryStore,
    item: &PackageItem,
    download_root: &Path,
    cancel: &CancellationToken,
    bus: &StatusBus,
    registry: &StatusRegistry,
) -> Result<PathBuf, DownloadError> {
    mark_update_in_progress(library, item).await;

    tokio::fs::create_dir_all(download_root)
        .await
        .map_err(|e| DownloadError::io(download_root, e))?;
    let path = download_root.join(item.archive_filename());

    let result = stream_archive(transport, item, &path, cancel, bus, registry).await;

    if result.is_err() {
        // No partial-file leak: cancelled and failed transfers clean up.
        debug!(path = %path.display(), "removing partial archive");
        let _ = tokio::fs::remove_file(&path).await;
    }

    result.map(|()| path)
}

/// Streams the response body into `path`, emitting progress along the way.
async fn stream_archive(
    transport: &dyn Transport,
    item: &PackageItem,
    path: &Path,
    cancel: &CancellationToken,
    bus: &StatusBus,
    registry: &StatusRegistry,
) -> Result<(), DownloadError> {
    // The token is honored at every IO suspension point, including while
    // waiting for the response headers.
    let source = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(DownloadError::Cancelled),
        source = transport.fetch(&item.source_url) => source?,
    };
    let total = source
        .content_length
        .filter(|len| *len > 0)
        .unwrap_or(item.declared_size_bytes);

    let file = File::create(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = source.stream;

    let mut digest = StreamingChecksum::new();
    let mut bytes_written: u64 = 0;
    let mut last_percent: Option<u8> = None;

    loop {
        // Cancellation is cooperative: the token is polled at every chunk
        // boundary, so latency is bounded by one chunk's IO time.
        let chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::Cancelled),
            next = stream.next() => match next {
                Some(chunk) => chunk?,
                None => break,
            },
        };

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        digest.update(&chunk);
        bytes_written += chunk.len() as u64;

        if total > 0 {
            let percent = percent_of(bytes_written, total);
            if last_percent.is_none_or(|last| percent > last) {
                last_percent = Some(percent);
                registry.set_progress(&item.id, bytes_written, total);
                bus.publish(PipelineEvent::Progress {
                    id: item.id.clone(),
                    percent,
                    bytes: bytes_written,
                    total,
                });
            }
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    // Declared sizes are frequently imprecise; guarantee consumers see
    // completion even when the stream ends short.
    if last_percent != Some(100) {
        let total = if total > 0 { total } else { bytes_written };
        registry.set_progress(&item.id, bytes_written, total);
        bus.publish(PipelineEvent::Progress {
            id: item.id.clone(),
            percent: 100,
            bytes: bytes_written,
            total,
        });
    }

    if !item.checksum.is_empty() {
        let actual = digest.finalize();
        if !digests_match(&item.checksum, &actual) {
            return Err(DownloadError::checksum_mismatch(
                path,
                item.checksum.clone(),
                actual,
            ));
        }
    }

    debug!(id = %item.id, bytes = bytes_written, "transfer complete");
    Ok(())
}

/// Whole percent of `bytes` out of `total`, clamped to 100.
#[allow(clippy::cast_possible_truncation)]
fn percent_of(bytes: u64, total: u64) -> u8 {
    ((u128::from(bytes) * 100) / u128::from(total)).min(100) as u8
}

/// Marks an already-installed package `updating` so library views can show
/// an update marker during the re-download. Library errors are logged, not
/// propagated; the marker is cosmetic.
async fn mark_update_in_progress(library: &dyn LibraryStore, item: &PackageItem) {
    match library.get(&item.id).await {
        Ok(Some(_)) => {
            if let Err(e) = library.update_status(&item.id, EntryStatus::Updating).await {
                warn!(id = %item.id, error = %e, "failed to mark library entry updating");
            }
        }
        Ok(None) => {}
        Err(e) => warn!(id = %item.id, error = %e, "library lookup failed before transfer"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream;

    use crate::download::client::TransferSource;
    use crate::item::PackageId;
    use crate::library::MemoryLibraryStore;

    struct StubTransport {
        chunks: Vec<Vec<u8>>,
        content_length: Option<u64>,
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn fetch(&self, _url: &str) -> Result<TransferSource, DownloadError> {
            let chunks: Vec<Result<Bytes, DownloadError>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from(c.clone())))
                .collect();
            Ok(TransferSource {
                stream: Box::pin(stream::iter(chunks)),
                content_length: self.content_length,
            })
        }
    }

    fn test_item(id: &str, declared: u64, checksum: &str) -> PackageItem {
        PackageItem {
            id: PackageId::new(id),
            source_url: format!("https://example.com/{id}.zip"),
            declared_size_bytes: declared,
            checksum: checksum.to_string(),
            version: "1.0".to_string(),
            display_name: id.to_string(),
        }
    }

    async fn collect_percents(
        rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>,
    ) -> Vec<u8> {
        let mut percents = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::Progress { percent, .. } = event {
                percents.push(percent);
            }
        }
        percents
    }

    #[tokio::test]
    async fn test_transfer_writes_archive_and_reports_completion() {
        let dir = tempfile::tempdir().unwrap();
        let transport = StubTransport {
            chunks: vec![vec![1u8; 500], vec![2u8; 500]],
            content_length: Some(1000),
        };
        let library = MemoryLibraryStore::new();
        let bus = StatusBus::new();
        let mut rx = bus.subscribe();
        let registry = StatusRegistry::new();
        let item = test_item("a", 1000, "");
        registry.admit(&item);

        let path = run_transfer(
            &transport,
            &library,
            &item,
            dir.path(),
            &CancellationToken::new(),
            &bus,
            &registry,
        )
        .await
        .unwrap();

        assert_eq!(path, dir.path().join("a.zip"));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1000);

        let percents = collect_percents(&mut rx).await;
        assert_eq!(*percents.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn test_progress_percents_strictly_increase() {
        let dir = tempfile::tempdir().unwrap();
        // 400 one-byte chunks against a 400-byte total: four chunks land on
        // each whole percent, so emissions must be deduplicated.
        let transport = StubTransport {
            chunks: vec![vec![0u8; 1]; 400],
            content_length: Some(400),
        };
        let library = MemoryLibraryStore::new();
        let bus = StatusBus::new();
        let mut rx = bus.subscribe();
        let registry = StatusRegistry::new();
        let item = test_item("a", 400, "");
        registry.admit(&item);

        run_transfer(
            &transport,
            &library,
            &item,
            dir.path(),
            &CancellationToken::new(),
            &bus,
            &registry,
        )
        .await
        .unwrap();

        let percents = collect_percents(&mut rx).await;
        assert!(!percents.is_empty());
        for pair in percents.windows(2) {
            assert!(pair[1] > pair[0], "percents must strictly increase: {percents:?}");
        }
    }

    #[tokio::test]
    async fn test_short_stream_still_ends_at_100() {
        let dir = tempfile::tempdir().unwrap();
        // Declared size says 1000 but the server only sends 600 bytes.
        let transport = StubTransport {
            chunks: vec![vec![0u8; 600]],
            content_length: None,
        };
        let library = MemoryLibraryStore::new();
        let bus = StatusBus::new();
        let mut rx = bus.subscribe();
        let registry = StatusRegistry::new();
        let item = test_item("a", 1000, "");
        registry.admit(&item);

        run_transfer(
            &transport,
            &library,
            &item,
            dir.path(),
            &CancellationToken::new(),
            &bus,
            &registry,
        )
        .await
        .unwrap();

        let percents = collect_percents(&mut rx).await;
        assert_eq!(*percents.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn test_cancelled_transfer_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = StubTransport {
            chunks: vec![vec![0u8; 100]; 10],
            content_length: Some(1000),
        };
        let library = MemoryLibraryStore::new();
        let bus = StatusBus::new();
        let registry = StatusRegistry::new();
        let item = test_item("a", 1000, "");
        registry.admit(&item);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run_transfer(
            &transport,
            &library,
            &item,
            dir.path(),
            &cancel,
            &bus,
            &registry,
        )
        .await;

        assert!(matches!(result, Err(DownloadError::Cancelled)));
        assert!(!dir.path().join("a.zip").exists());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let transport = StubTransport {
            chunks: vec![b"abc".to_vec()],
            content_length: Some(3),
        };
        let library = MemoryLibraryStore::new();
        let bus = StatusBus::new();
        let registry = StatusRegistry::new();
        let item = test_item("a", 3, "00000000deadbeef");
        registry.admit(&item);

        let result = run_transfer(
            &transport,
            &library,
            &item,
            dir.path(),
            &CancellationToken::new(),
            &bus,
            &registry,
        )
        .await;

        assert!(matches!(result, Err(DownloadError::ChecksumMismatch { .. })));
        assert!(!dir.path().join("a.zip").exists());
    }

    #[tokio::test]
    async fn test_matching_checksum_passes() {
        let dir = tempfile::tempdir().unwrap();
        let transport = StubTransport {
            chunks: vec![b"abc".to_vec()],
            content_length: Some(3),
        };
        let library = MemoryLibraryStore::new();
        let bus = StatusBus::new();
        let registry = StatusRegistry::new();
        // SHA-256 of "abc"
        let item = test_item(
            "a",
            3,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        );
        registry.admit(&item);

        let result = run_transfer(
            &transport,
            &library,
            &item,
            dir.path(),
            &CancellationToken::new(),
            &bus,
            &registry,
        )
        .await;

        assert!(result.is_ok());
    }

    #[test]
    fn test_percent_of_clamps_at_100() {
        assert_eq!(percent_of(0, 100), 0);
        assert_eq!(percent_of(50, 100), 50);
        assert_eq!(percent_of(999, 100), 100);
        assert_eq!(percent_of(1, 3), 33);
    }
}
