//! `SQLite` implementation of [`CallTreeRepository`].

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use vigil_app::ports::CallTreeRepository;
use vigil_domain::call_tree::{CallTree, CallTreeEntry};
use vigil_domain::error::VigilError;
use vigil_domain::id::{PersonId, PlaceId};

use crate::error::{StorageError, decode};

struct Wrapper(CallTreeEntry);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let person: String = row.try_get("person_id")?;
        let enabled: bool = row.try_get("enabled")?;
        let position: i64 = row.try_get("position")?;

        let person = PersonId::from_str(&person).map_err(decode)?;
        let position = u32::try_from(position).map_err(decode)?;

        Ok(Self(CallTreeEntry::new(person, enabled, position)))
    }
}

const SELECT: &str = r"
    SELECT person_id, enabled, position FROM call_tree_entries
    WHERE place_id = ? AND namespace = ?
    ORDER BY position
";

const DELETE: &str = "DELETE FROM call_tree_entries WHERE place_id = ? AND namespace = ?";

const INSERT: &str = r"
    INSERT INTO call_tree_entries (place_id, namespace, person_id, enabled, position)
    VALUES (?, ?, ?, ?, ?)
";

/// `SQLite`-backed call tree repository, one row per entry.
#[derive(Debug, Clone)]
pub struct SqliteCallTreeRepository {
    pool: SqlitePool,
}

impl SqliteCallTreeRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl CallTreeRepository for SqliteCallTreeRepository {
    async fn load(&self, place_id: PlaceId, namespace: &str) -> Result<CallTree, VigilError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT)
            .bind(place_id.to_string())
            .bind(namespace)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(CallTree::new(rows.into_iter().map(|w| w.0).collect())?)
    }

    async fn save(
        &self,
        place_id: PlaceId,
        namespace: &str,
        tree: CallTree,
    ) -> Result<CallTree, VigilError> {
        let place = place_id.to_string();
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        sqlx::query(DELETE)
            .bind(&place)
            .bind(namespace)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from)?;

        for entry in tree.entries() {
            sqlx::query(INSERT)
                .bind(&place)
                .bind(namespace)
                .bind(entry.person.to_string())
                .bind(entry.enabled)
                .bind(i64::from(entry.position))
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
        }

        tx.commit().await.map_err(StorageError::from)?;
        tracing::debug!(%place_id, namespace, entries = tree.entries().len(), "call tree saved");

        Ok(tree)
    }
}
