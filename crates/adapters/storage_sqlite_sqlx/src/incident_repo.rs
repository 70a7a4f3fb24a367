//! `SQLite` implementation of [`IncidentRepository`].
//!
//! The full incident is stored as a JSON document; the columns next to it
//! only serve lookups and ordering.

use chrono::SecondsFormat;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use vigil_app::ports::IncidentRepository;
use vigil_domain::error::VigilError;
use vigil_domain::id::PlaceId;
use vigil_domain::incident::{AlarmIncident, IncidentKey};
use vigil_domain::time::Timestamp;

use crate::error::{StorageError, decode};

struct Wrapper(AlarmIncident);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let body: String = row.try_get("body")?;
        let incident: AlarmIncident = serde_json::from_str(&body).map_err(decode)?;
        Ok(Self(incident))
    }
}

// fixed width so that text order is time order
fn format_timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

const UPSERT: &str = r"
    INSERT INTO incidents (id, place_id, alarm_type, state, opened_at, closed_at, body)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (id) DO UPDATE SET
        state = excluded.state,
        closed_at = excluded.closed_at,
        body = excluded.body
";

const SELECT_ACTIVE: &str = r"
    SELECT body FROM incidents
    WHERE place_id = ? AND alarm_type = ? AND closed_at IS NULL
    ORDER BY opened_at DESC
    LIMIT 1
";

const SELECT_BY_PLACE: &str =
    "SELECT body FROM incidents WHERE place_id = ? ORDER BY opened_at DESC";

/// `SQLite`-backed incident repository.
#[derive(Debug, Clone)]
pub struct SqliteIncidentRepository {
    pool: SqlitePool,
}

impl SqliteIncidentRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl IncidentRepository for SqliteIncidentRepository {
    async fn find_active(&self, key: IncidentKey) -> Result<Option<AlarmIncident>, VigilError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_ACTIVE)
            .bind(key.place_id.to_string())
            .bind(key.alarm_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(row.map(|w| w.0))
    }

    async fn save(&self, incident: AlarmIncident) -> Result<AlarmIncident, VigilError> {
        let body = serde_json::to_string(&incident).map_err(StorageError::from)?;

        sqlx::query(UPSERT)
            .bind(incident.id.to_string())
            .bind(incident.place_id.to_string())
            .bind(incident.alarm_type.as_str())
            .bind(incident.state.as_str())
            .bind(format_timestamp(incident.opened_at))
            .bind(incident.closed_at.map(format_timestamp))
            .bind(&body)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(incident)
    }

    async fn list_by_place(&self, place_id: PlaceId) -> Result<Vec<AlarmIncident>, VigilError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_PLACE)
            .bind(place_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}
