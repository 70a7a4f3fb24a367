//! `SQLite` implementation of [`PersonDirectory`].

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use vigil_app::ports::PersonDirectory;
use vigil_domain::call_tree::Person;
use vigil_domain::error::VigilError;
use vigil_domain::id::{PersonId, PlaceId};

use crate::error::{StorageError, decode};

struct Wrapper(Person);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let place_id: String = row.try_get("place_id")?;
        let first_name: String = row.try_get("first_name")?;
        let last_name: String = row.try_get("last_name")?;

        Ok(Self(Person {
            id: PersonId::from_str(&id).map_err(decode)?,
            place_id: PlaceId::from_str(&place_id).map_err(decode)?,
            first_name,
            last_name,
        }))
    }
}

const UPSERT: &str = r"
    INSERT INTO persons (id, place_id, first_name, last_name)
    VALUES (?, ?, ?, ?)
    ON CONFLICT (id) DO UPDATE SET
        place_id = excluded.place_id,
        first_name = excluded.first_name,
        last_name = excluded.last_name
";

const SELECT_BY_ID: &str = "SELECT * FROM persons WHERE id = ?";
const SELECT_BY_PLACE: &str = "SELECT * FROM persons WHERE place_id = ? ORDER BY last_name, first_name";

/// `SQLite`-backed person directory.
#[derive(Debug, Clone)]
pub struct SqlitePersonDirectory {
    pool: SqlitePool,
}

impl SqlitePersonDirectory {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a person or overwrite the stored one with the same id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn upsert(&self, person: &Person) -> Result<(), VigilError> {
        sqlx::query(UPSERT)
            .bind(person.id.to_string())
            .bind(person.place_id.to_string())
            .bind(&person.first_name)
            .bind(&person.last_name)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }
}

impl PersonDirectory for SqlitePersonDirectory {
    async fn find_by_id(&self, id: PersonId) -> Result<Option<Person>, VigilError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(row.map(|w| w.0))
    }

    async fn list_by_place(&self, place_id: PlaceId) -> Result<Vec<Person>, VigilError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_PLACE)
            .bind(place_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}
