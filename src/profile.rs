use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Profile, VerificationStatus};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile store query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

/// ProfileStore Trait
///
/// Read-only access to application profiles keyed by provider user id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, ProfileError>;
}

/// ProfileState
///
/// Shared profile store handle stored in the application state.
pub type ProfileState = Arc<dyn ProfileStore>;

#[derive(FromRow)]
struct ProfileRow {
    id: Uuid,
    email: String,
    verification_status: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: row.id,
            email: row.email,
            verification_status: VerificationStatus::from_db(row.verification_status.as_deref()),
        }
    }
}

/// PostgresProfileStore
///
/// Reads `public.profiles` directly from the backend's Postgres.
pub struct PostgresProfileStore {
    pool: PgPool,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, ProfileError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT id, email, verification_status
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Profile::from))
    }
}

/// MockProfileStore
///
/// In-memory store for tests.
#[derive(Clone, Default)]
pub struct MockProfileStore {
    pub profiles: HashMap<Uuid, Profile>,
    pub should_fail: bool,
}

impl MockProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profiles.insert(profile.id, profile);
        self
    }
}

#[async_trait]
impl ProfileStore for MockProfileStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, ProfileError> {
        if self.should_fail {
            return Err(ProfileError::Unavailable(
                "Mock Profile Error: Simulation requested".to_string(),
            ));
        }
        Ok(self.profiles.get(&user_id).cloned())
    }
}
