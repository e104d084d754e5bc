use sqlx::PgPool;
use tracing::info;

use crate::database::manager::DatabaseError;

/// Idempotent startup DDL. The partial unique index enforces the
/// duplicate-pending-connection invariant at the store's serialization
/// point, so concurrent creates cannot both insert.
pub async fn run(pool: &PgPool) -> Result<(), DatabaseError> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS profiles (
            id              UUID PRIMARY KEY,
            account_id      UUID NOT NULL,
            display_name    TEXT NOT NULL,
            kind            TEXT NOT NULL,
            care_types      TEXT[] NOT NULL DEFAULT '{}',
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "CREATE TABLE IF NOT EXISTS connections (
            id              UUID PRIMARY KEY,
            connection_type TEXT NOT NULL,
            status          TEXT NOT NULL,
            from_profile_id UUID NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            to_profile_id   UUID NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            message         JSONB NOT NULL DEFAULT '{}',
            metadata        JSONB NOT NULL DEFAULT '{}',
            version         BIGINT NOT NULL DEFAULT 1,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
            CHECK (from_profile_id <> to_profile_id)
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_connections_pending_pair
            ON connections(from_profile_id, to_profile_id, connection_type)
            WHERE status = 'pending'",
        "CREATE INDEX IF NOT EXISTS idx_connections_from
            ON connections(from_profile_id, updated_at)",
        "CREATE INDEX IF NOT EXISTS idx_connections_to
            ON connections(to_profile_id, updated_at)",
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;
    }

    info!("Database migrations complete");
    Ok(())
}
