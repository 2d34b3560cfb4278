//! Integration tests for the install queue and worker against real archives.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use coursepack_core::{
    EntryStatus, InstallManager, LibraryStore, MemoryLibraryStore, PackageId, PackageItem,
    PipelineEvent, StatusBus, StatusRegistry,
};

// ==================== Helper Functions ====================

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

fn course_entries<'a>() -> Vec<(&'a str, &'a [u8])> {
    vec![
        ("package.xml", b"<package/>" as &[u8]),
        ("content/index.html", b"<html></html>"),
        ("icon.png", b"\x89PNG"),
    ]
}

fn test_item(id: &str, version: &str) -> PackageItem {
    PackageItem {
        id: PackageId::new(id),
        source_url: format!("https://example.com/{id}.zip"),
        declared_size_bytes: 0,
        checksum: "cafe".to_string(),
        version: version.to_string(),
        display_name: format!("Course {id}"),
    }
}

struct Harness {
    manager: InstallManager,
    library: Arc<MemoryLibraryStore>,
    bus: StatusBus,
}

fn build_harness(root: &TempDir, assets: Option<std::path::PathBuf>) -> Harness {
    let bus = StatusBus::new();
    let registry = Arc::new(StatusRegistry::new());
    let library = Arc::new(MemoryLibraryStore::new());
    let manager = InstallManager::new(
        Arc::clone(&library) as Arc<dyn LibraryStore>,
        bus.clone(),
        registry,
        root.path().join("images"),
        assets,
    );
    Harness {
        manager,
        library,
        bus,
    }
}

async fn wait_terminal(
    rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>,
    id: &str,
) -> PipelineEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if event.is_terminal() && event.package_id().as_str() == id {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for terminal event")
}

// ==================== Tests ====================

#[tokio::test]
async fn test_install_extracts_registers_and_copies_icon() {
    let root = TempDir::new().unwrap();
    let harness = build_harness(&root, None);
    let mut rx = harness.bus.subscribe();

    let archive = root.path().join("course-101.zip");
    write_zip(&archive, &course_entries());

    harness
        .manager
        .submit(archive, test_item("course-101", "1.0"));

    let event = wait_terminal(&mut rx, "course-101").await;
    assert!(matches!(event, PipelineEvent::Installed { .. }));

    // Extraction folder sits next to the archive, named by the id
    let folder = root.path().join("course-101");
    assert!(folder.join("package.xml").is_file());
    assert!(folder.join("content/index.html").is_file());
    assert!(root.path().join("images/course-101.png").is_file());

    let entry = harness
        .library
        .get(&PackageId::new("course-101"))
        .await
        .unwrap()
        .expect("entry must exist after install");
    assert_eq!(entry.name, "Course course-101");
    assert_eq!(entry.version, "1.0");
    assert_eq!(entry.checksum, "cafe");
    assert_eq!(entry.status(), EntryStatus::Installed);
    assert_eq!(entry.local_folder, folder.to_string_lossy());
}

#[tokio::test]
async fn test_missing_manifest_blocks_registration() {
    let root = TempDir::new().unwrap();
    let harness = build_harness(&root, None);
    let mut rx = harness.bus.subscribe();

    let archive = root.path().join("no-manifest.zip");
    write_zip(&archive, &[("content/index.html", b"<html></html>" as &[u8])]);

    harness
        .manager
        .submit(archive, test_item("no-manifest", "1.0"));

    let event = wait_terminal(&mut rx, "no-manifest").await;
    match event {
        PipelineEvent::Failed { error, .. } => {
            assert!(error.contains("manifest"), "got: {error}");
        }
        other => panic!("expected Failed, got {other:?}"),
    }

    assert!(
        harness
            .library
            .get(&PackageId::new("no-manifest"))
            .await
            .unwrap()
            .is_none(),
        "a package without installable content must not be registered"
    );
}

#[tokio::test]
async fn test_corrupt_archive_fails_distinctly() {
    let root = TempDir::new().unwrap();
    let harness = build_harness(&root, None);
    let mut rx = harness.bus.subscribe();

    let archive = root.path().join("corrupt.zip");
    std::fs::write(&archive, b"definitely not a zip").unwrap();

    harness.manager.submit(archive, test_item("corrupt", "1.0"));

    let event = wait_terminal(&mut rx, "corrupt").await;
    assert!(
        matches!(event, PipelineEvent::Failed { .. }),
        "extraction failure must never be reported as success"
    );
}

#[tokio::test]
async fn test_runtime_assets_copied_next_to_manifest() {
    let root = TempDir::new().unwrap();
    let assets = root.path().join("runtime");
    std::fs::create_dir_all(&assets).unwrap();
    std::fs::write(assets.join("bridge.js"), b"// bridge").unwrap();
    std::fs::write(assets.join("player.js"), b"// player").unwrap();

    let harness = build_harness(&root, Some(assets));
    let mut rx = harness.bus.subscribe();

    let archive = root.path().join("course.zip");
    write_zip(
        &archive,
        &[
            ("web/package.xml", b"<package/>" as &[u8]),
            ("web/index.html", b"<html></html>"),
        ],
    );

    harness.manager.submit(archive, test_item("course", "1.0"));
    wait_terminal(&mut rx, "course").await;

    let web = root.path().join("course/web");
    assert!(web.join("bridge.js").is_file());
    assert!(web.join("player.js").is_file());
}

#[tokio::test]
async fn test_reinstall_replaces_library_entry() {
    let root = TempDir::new().unwrap();
    let harness = build_harness(&root, None);
    let mut rx = harness.bus.subscribe();

    let archive = root.path().join("course.zip");
    write_zip(&archive, &course_entries());

    harness.manager.submit(archive.clone(), test_item("course", "1.0"));
    wait_terminal(&mut rx, "course").await;

    harness.manager.submit(archive, test_item("course", "2.0"));
    wait_terminal(&mut rx, "course").await;

    let entry = harness
        .library
        .get(&PackageId::new("course"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.version, "2.0", "reinstall must replace the prior entry");
}

#[tokio::test]
async fn test_queue_drains_in_submit_order() {
    let root = TempDir::new().unwrap();
    let harness = build_harness(&root, None);
    let mut rx = harness.bus.subscribe();

    for id in ["first", "second", "third"] {
        let archive = root.path().join(format!("{id}.zip"));
        write_zip(&archive, &course_entries());
        harness.manager.submit(archive, test_item(id, "1.0"));
    }

    let mut install_order = Vec::new();
    while install_order.len() < 3 {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out")
            .unwrap();
        if let PipelineEvent::Installing { id } = event {
            install_order.push(id.as_str().to_string());
        }
    }
    assert_eq!(install_order, vec!["first", "second", "third"]);
}
