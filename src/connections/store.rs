use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::connections::error::ConnectionError;
use crate::connections::model::{
    Connection, ConnectionMetadata, ConnectionStatus, ConnectionType, IntakeMessage,
};

/// Fields for a brand-new connection row.
pub struct NewConnection {
    pub from_profile_id: Uuid,
    pub to_profile_id: Uuid,
    pub connection_type: ConnectionType,
    pub message: IntakeMessage,
    pub metadata: ConnectionMetadata,
}

/// Outcome of `create`: either a fresh row or the already-pending
/// duplicate (idempotent creation).
pub struct CreateOutcome {
    pub connection: Connection,
    pub created: bool,
}

/// Persistence for connection records. Every mutation goes through a
/// versioned compare-and-swap so concurrent writers cannot silently
/// clobber each other; retry policy lives in the service layer.
pub struct ConnectionStore {
    pool: PgPool,
}

impl ConnectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new connection, or return the existing pending one for
    /// the same (from, to, type) triple. The partial unique index makes
    /// the dedup atomic under concurrent creates.
    pub async fn create(&self, new: NewConnection) -> Result<CreateOutcome, ConnectionError> {
        let id = Uuid::new_v4();
        let message = serde_json::to_value(&new.message)
            .map_err(|e| ConnectionError::Corrupt(e.to_string()))?;
        let metadata = serde_json::to_value(&new.metadata)
            .map_err(|e| ConnectionError::Corrupt(e.to_string()))?;

        let inserted = sqlx::query(
            "INSERT INTO connections
                (id, connection_type, status, from_profile_id, to_profile_id, message, metadata)
             VALUES ($1, $2, 'pending', $3, $4, $5, $6)
             ON CONFLICT (from_profile_id, to_profile_id, connection_type)
                WHERE status = 'pending'
             DO NOTHING",
        )
        .bind(id)
        .bind(new.connection_type.as_str())
        .bind(new.from_profile_id)
        .bind(new.to_profile_id)
        .bind(&message)
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            let (connection, _) = self.fetch_required(id).await?;
            return Ok(CreateOutcome {
                connection,
                created: true,
            });
        }

        // Lost to an existing pending row; hand that one back.
        let row = sqlx::query(
            "SELECT * FROM connections
             WHERE from_profile_id = $1 AND to_profile_id = $2
               AND connection_type = $3 AND status = 'pending'",
        )
        .bind(new.from_profile_id)
        .bind(new.to_profile_id)
        .bind(new.connection_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        let (connection, _) = row_to_connection(&row)?;
        Ok(CreateOutcome {
            connection,
            created: false,
        })
    }

    /// Fetch a connection along with its version stamp.
    pub async fn fetch(&self, id: Uuid) -> Result<Option<(Connection, i64)>, ConnectionError> {
        let row = sqlx::query("SELECT * FROM connections WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_connection).transpose()
    }

    pub async fn fetch_required(&self, id: Uuid) -> Result<(Connection, i64), ConnectionError> {
        self.fetch(id).await?.ok_or(ConnectionError::NotFound)
    }

    /// Write back a mutated record if nobody else has committed since the
    /// read. Returns false on a version mismatch (stale write rejected).
    pub async fn try_update(
        &self,
        connection: &Connection,
        expected_version: i64,
    ) -> Result<bool, ConnectionError> {
        let message = serde_json::to_value(&connection.message)
            .map_err(|e| ConnectionError::Corrupt(e.to_string()))?;
        let metadata = serde_json::to_value(&connection.metadata)
            .map_err(|e| ConnectionError::Corrupt(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE connections
             SET status = $1, message = $2, metadata = $3,
                 updated_at = now(), version = version + 1
             WHERE id = $4 AND version = $5",
        )
        .bind(connection.status.as_str())
        .bind(&message)
        .bind(&metadata)
        .bind(connection.id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn row_to_connection(row: &PgRow) -> Result<(Connection, i64), ConnectionError> {
    let status: String = row.try_get("status")?;
    let connection_type: String = row.try_get("connection_type")?;
    let message: serde_json::Value = row.try_get("message")?;
    let metadata: serde_json::Value = row.try_get("metadata")?;
    let version: i64 = row.try_get("version")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    let connection = Connection {
        id: row.try_get("id")?,
        connection_type: ConnectionType::parse(&connection_type)?,
        status: ConnectionStatus::parse(&status)?,
        from_profile_id: row.try_get("from_profile_id")?,
        to_profile_id: row.try_get("to_profile_id")?,
        message: serde_json::from_value(message)
            .map_err(|e| ConnectionError::Corrupt(format!("message: {}", e)))?,
        metadata: serde_json::from_value(metadata)
            .map_err(|e| ConnectionError::Corrupt(format!("metadata: {}", e)))?,
        created_at,
        updated_at,
    };
    Ok((connection, version))
}
