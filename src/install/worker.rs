//! Install worker: extracts one archive and registers it with the library.
//!
//! Extraction is destructive: entries overwrite pre-existing files and
//! folders of the same name, with no merge semantics. Entry paths are
//! sanitized through `enclosed_name` so hostile archives cannot escape the
//! extraction folder.

use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::ZipArchive;

use super::error::InstallError;
use crate::item::{PackageId, PackageItem};
use crate::library::{LibraryStore, NewLibraryEntry};

/// Fixed manifest filename located by recursive search under the
/// extraction folder. First match wins.
pub const MANIFEST_FILENAME: &str = "package.xml";

/// Icon filename looked up inside the extracted tree and copied into the
/// shared images folder as `{id}.png`.
pub const ICON_FILENAME: &str = "icon.png";

/// Extracts `archive` and registers the package with the library.
///
/// Returns the extraction folder on success.
///
/// # Errors
///
/// Returns [`InstallError::ManifestNotFound`] when extraction succeeds but
/// no manifest exists — registration is blocked in that case. All other
/// extraction and registration failures surface as their respective
/// variants; none of them are reported as success.
pub(crate) async fn run_install(
    archive: &Path,
    item: &PackageItem,
    images_root: &Path,
    runtime_assets_dir: Option<&Path>,
    library: &dyn LibraryStore,
) -> Result<PathBuf, InstallError> {
    let archive = archive.to_path_buf();
    let id = item.id.clone();
    let images_root = images_root.to_path_buf();
    let assets_dir = runtime_assets_dir.map(Path::to_path_buf);

    // Zip decoding and the file walks are blocking work; keep them off the
    // async workers.
    let folder = tokio::task::spawn_blocking(move || {
        install_files(&archive, &id, &images_root, assets_dir.as_deref())
    })
    .await
    .map_err(|e| InstallError::task_failed(e.to_string()))??;

    library
        .create_or_replace(NewLibraryEntry {
            id: item.id.clone(),
            name: item.display_name.clone(),
            local_folder: folder.clone(),
            version: item.version.clone(),
            checksum: item.checksum.clone(),
        })
        .await
        .map_err(|e| InstallError::registration(item.id.clone(), e))?;

    info!(id = %item.id, folder = %folder.display(), "package registered");
    Ok(folder)
}

/// Blocking half of the install: extraction, icon, manifest, assets.
fn install_files(
    archive: &Path,
    id: &PackageId,
    images_root: &Path,
    assets_dir: Option<&Path>,
) -> Result<PathBuf, InstallError> {
    let folder = extraction_folder(archive);
    extract_archive(archive, &folder)?;
    copy_icon(&folder, images_root, id)?;

    let manifest = find_file(&folder, MANIFEST_FILENAME)
        .ok_or_else(|| InstallError::manifest_not_found(&folder))?;
    debug!(manifest = %manifest.display(), "located package manifest");

    if let Some(assets) = assets_dir {
        let target = manifest.parent().unwrap_or(&folder);
        copy_runtime_assets(assets, target)?;
    }

    Ok(folder)
}

/// Extraction folder named by stripping the archive's file extension:
/// `{root}/{id}.zip` → `{root}/{id}/`.
fn extraction_folder(archive: &Path) -> PathBuf {
    archive.with_extension("")
}

fn extract_archive(archive: &Path, folder: &Path) -> Result<(), InstallError> {
    let file = File::open(archive).map_err(|e| InstallError::io(archive, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| InstallError::archive(archive, e))?;

    std::fs::create_dir_all(folder).map_err(|e| InstallError::io(folder, e))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| InstallError::archive(archive, e))?;

        // Entries with hostile paths (absolute, `..`) are skipped outright.
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out_path = folder.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| InstallError::io(&out_path, e))?;
            continue;
        }

        // Destructive overwrite: a directory sitting where a file entry
        // lands is removed, and parent folders are created defensively when
        // the entry's path is otherwise obstructed.
        if out_path.is_dir() {
            std::fs::remove_dir_all(&out_path).map_err(|e| InstallError::io(&out_path, e))?;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| InstallError::io(parent, e))?;
        }

        let mut out = File::create(&out_path).map_err(|e| InstallError::io(&out_path, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| InstallError::io(&out_path, e))?;
    }

    Ok(())
}

/// Copies the package icon into the shared images folder as `{id}.png`.
/// A package without an icon is not an error.
fn copy_icon(folder: &Path, images_root: &Path, id: &PackageId) -> Result<(), InstallError> {
    let Some(icon) = find_file(folder, ICON_FILENAME) else {
        debug!(id = %id, "package has no icon");
        return Ok(());
    };

    std::fs::create_dir_all(images_root).map_err(|e| InstallError::io(images_root, e))?;
    let target = images_root.join(format!("{id}.png"));
    std::fs::copy(&icon, &target).map_err(|e| InstallError::io(&target, e))?;
    Ok(())
}

/// Copies every file from the runtime assets folder next to the manifest so
/// the extracted content is self-contained and runs offline.
fn copy_runtime_assets(assets_dir: &Path, target: &Path) -> Result<(), InstallError> {
    let entries = std::fs::read_dir(assets_dir).map_err(|e| InstallError::io(assets_dir, e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        let destination = target.join(name);
        std::fs::copy(&path, &destination).map_err(|e| InstallError::io(&destination, e))?;
    }
    Ok(())
}

/// Breadth-first search for `name` under `root`; first match wins.
fn find_file(root: &Path, name: &str) -> Option<PathBuf> {
    let mut folders = VecDeque::from([root.to_path_buf()]);
    while let Some(folder) = folders.pop_front() {
        let Ok(entries) = std::fs::read_dir(&folder) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                folders.push_back(path);
            } else if path.file_name().is_some_and(|file| file == name) {
                return Some(path);
            }
        }
    }
    None
}
