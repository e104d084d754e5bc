use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Which side of the marketplace a profile sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    CareSeeker,
    Provider,
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileKind::CareSeeker => "care_seeker",
            ProfileKind::Provider => "provider",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ProfileError> {
        match s {
            "care_seeker" => Ok(ProfileKind::CareSeeker),
            "provider" => Ok(ProfileKind::Provider),
            other => Err(ProfileError::UnknownKind(other.to_string())),
        }
    }
}

/// The slice of a profile the connection engine needs: identity for
/// authorization, display name and care types for intro generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub account_id: Uuid,
    pub display_name: String,
    pub kind: ProfileKind,
    pub care_types: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Unknown profile kind: {0}")]
    UnknownKind(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Directory lookup seam. Profile storage itself is an external
/// collaborator; the engine only reads summaries through this trait.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn get(&self, profile_id: Uuid) -> Result<Option<ProfileSummary>, ProfileError>;
}

pub struct PgProfileDirectory {
    pool: PgPool,
}

impl PgProfileDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileDirectory for PgProfileDirectory {
    async fn get(&self, profile_id: Uuid) -> Result<Option<ProfileSummary>, ProfileError> {
        let row = sqlx::query(
            "SELECT id, account_id, display_name, kind, care_types FROM profiles WHERE id = $1",
        )
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ProfileSummary {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            display_name: row.try_get("display_name")?,
            kind: ProfileKind::parse(row.try_get::<String, _>("kind")?.as_str())?,
            care_types: row.try_get("care_types")?,
        }))
    }
}
