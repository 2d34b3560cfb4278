//! The library store trait and the in-memory implementation.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use super::entry::{EntryStatus, LibraryEntry, NewLibraryEntry};
use crate::item::PackageId;

/// Library store errors.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The underlying database operation failed.
    #[error("library database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistent catalogue of successfully installed packages.
///
/// The pipeline only creates entries on successful install, flips the
/// status while updates download, and removes entries on deletion; it never
/// mutates anything else.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Creates an entry, replacing any prior entry with the same id.
    async fn create_or_replace(&self, entry: NewLibraryEntry) -> Result<(), LibraryError>;

    /// Removes an entry. Returns whether an entry existed.
    async fn remove(&self, id: &PackageId) -> Result<bool, LibraryError>;

    /// Updates an entry's status. Returns whether an entry existed.
    async fn update_status(
        &self,
        id: &PackageId,
        status: EntryStatus,
    ) -> Result<bool, LibraryError>;

    /// Looks up an entry by id.
    async fn get(&self, id: &PackageId) -> Result<Option<LibraryEntry>, LibraryError>;

    /// Lists all entries.
    async fn list(&self) -> Result<Vec<LibraryEntry>, LibraryError>;
}

/// In-memory library store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryLibraryStore {
    entries: RwLock<HashMap<PackageId, LibraryEntry>>,
}

impl MemoryLibraryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}

#[async_trait]
impl LibraryStore for MemoryLibraryStore {
    async fn create_or_replace(&self, entry: NewLibraryEntry) -> Result<(), LibraryError> {
        let record = LibraryEntry {
            id: entry.id.as_str().to_string(),
            name: entry.name,
            local_folder: entry.local_folder.to_string_lossy().into_owned(),
            version: entry.version,
            checksum: entry.checksum,
            status_str: EntryStatus::Installed.as_str().to_string(),
            installed_at: unix_timestamp(),
        };
        self.entries.write().await.insert(entry.id, record);
        Ok(())
    }

    async fn remove(&self, id: &PackageId) -> Result<bool, LibraryError> {
        Ok(self.entries.write().await.remove(id).is_some())
    }

    async fn update_status(
        &self,
        id: &PackageId,
        status: EntryStatus,
    ) -> Result<bool, LibraryError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(id) {
            Some(entry) => {
                entry.status_str = status.as_str().to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: &PackageId) -> Result<Option<LibraryEntry>, LibraryError> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<LibraryEntry>, LibraryError> {
        let mut entries: Vec<LibraryEntry> =
            self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    fn new_entry(id: &str) -> NewLibraryEntry {
        NewLibraryEntry {
            id: PackageId::new(id),
            name: id.to_uppercase(),
            local_folder: PathBuf::from(format!("/data/{id}")),
            version: "1.0".to_string(),
            checksum: "abc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_get_remove() {
        let store = MemoryLibraryStore::new();
        let id = PackageId::new("a");

        assert!(store.get(&id).await.unwrap().is_none());

        store.create_or_replace(new_entry("a")).await.unwrap();
        let entry = store.get(&id).await.unwrap().unwrap();
        assert_eq!(entry.id, "a");
        assert_eq!(entry.status(), EntryStatus::Installed);

        assert!(store.remove(&id).await.unwrap());
        assert!(!store.remove(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_resets_status() {
        let store = MemoryLibraryStore::new();
        let id = PackageId::new("a");

        store.create_or_replace(new_entry("a")).await.unwrap();
        store
            .update_status(&id, EntryStatus::Updating)
            .await
            .unwrap();
        assert_eq!(
            store.get(&id).await.unwrap().unwrap().status(),
            EntryStatus::Updating
        );

        store.create_or_replace(new_entry("a")).await.unwrap();
        assert_eq!(
            store.get(&id).await.unwrap().unwrap().status(),
            EntryStatus::Installed
        );
    }

    #[tokio::test]
    async fn test_update_status_unknown_id_returns_false() {
        let store = MemoryLibraryStore::new();
        let updated = store
            .update_status(&PackageId::new("ghost"), EntryStatus::Updating)
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_list_sorts_by_name() {
        let store = MemoryLibraryStore::new();
        store.create_or_replace(new_entry("zeta")).await.unwrap();
        store.create_or_replace(new_entry("alpha")).await.unwrap();

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["ALPHA", "ZETA"]);
    }
}
