//! `SQLite`-backed library store.

use async_trait::async_trait;
use sqlx::Row;
use tracing::instrument;

use super::entry::{EntryStatus, LibraryEntry, NewLibraryEntry};
use super::store::{LibraryError, LibraryStore};
use crate::db::Database;
use crate::item::PackageId;

/// Library store persisted in the application database.
#[derive(Debug, Clone)]
pub struct SqliteLibraryStore {
    db: Database,
}

impl SqliteLibraryStore {
    /// Creates a store over an open database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Counts entries with the given status.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_by_status(&self, status: EntryStatus) -> Result<i64, LibraryError> {
        let result = sqlx::query(r"SELECT COUNT(*) as count FROM library WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(self.db.pool())
            .await?;

        Ok(result.get("count"))
    }
}

#[async_trait]
impl LibraryStore for SqliteLibraryStore {
    #[instrument(skip(self, entry), fields(id = %entry.id))]
    async fn create_or_replace(&self, entry: NewLibraryEntry) -> Result<(), LibraryError> {
        sqlx::query(
            r"INSERT INTO library (id, name, local_folder, version, checksum, status, installed_at)
              VALUES (?, ?, ?, ?, ?, ?, datetime('now'))
              ON CONFLICT(id) DO UPDATE SET
                  name = excluded.name,
                  local_folder = excluded.local_folder,
                  version = excluded.version,
                  checksum = excluded.checksum,
                  status = excluded.status,
                  installed_at = excluded.installed_at",
        )
        .bind(entry.id.as_str())
        .bind(&entry.name)
        .bind(entry.local_folder.to_string_lossy().as_ref())
        .bind(&entry.version)
        .bind(&entry.checksum)
        .bind(EntryStatus::Installed.as_str())
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, id: &PackageId) -> Result<bool, LibraryError> {
        let result = sqlx::query(r"DELETE FROM library WHERE id = ?")
            .bind(id.as_str())
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: &PackageId,
        status: EntryStatus,
    ) -> Result<bool, LibraryError> {
        let result = sqlx::query(r"UPDATE library SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.as_str())
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &PackageId) -> Result<Option<LibraryEntry>, LibraryError> {
        let entry = sqlx::query_as::<_, LibraryEntry>(r"SELECT * FROM library WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(self.db.pool())
            .await?;

        Ok(entry)
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<LibraryEntry>, LibraryError> {
        let entries =
            sqlx::query_as::<_, LibraryEntry>(r"SELECT * FROM library ORDER BY name ASC")
                .fetch_all(self.db.pool())
                .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    // Integration tests exercise SqliteLibraryStore against a real database -
    // see tests/library_integration.rs. The store methods are thin wrappers
    // around SQL, so unit tests here would only restate the queries.
}
