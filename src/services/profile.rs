//! Profile store: the `profiles` table keyed by auth identity id.

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::model::Profile;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Partial update applied by the admin edit flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
}

/// Storage seam for profile rows. Enables an in-memory store in tests.
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_profile(&self, id: Uuid) -> Result<Option<Profile>, ProfileError>;

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), ProfileError>;

    async fn list_profiles(&self) -> Result<Vec<Profile>, ProfileError>;

    /// Apply `update` and return the resulting row.
    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<Profile, ProfileError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn profile_from_row(row: &sqlx::postgres::PgRow) -> Profile {
    Profile {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: row.get("role"),
        department: row.get("department"),
        profile_image: row.get("profile_image"),
    }
}

#[async_trait::async_trait]
impl ProfileStore for PgProfileStore {
    async fn fetch_profile(&self, id: Uuid) -> Result<Option<Profile>, ProfileError> {
        let row = sqlx::query("SELECT id, name, email, role, department, profile_image FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(profile_from_row))
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), ProfileError> {
        sqlx::query(
            r"INSERT INTO profiles (id, name, email, role, department, profile_image)
              VALUES ($1, $2, $3, $4, $5, $6)
              ON CONFLICT (id) DO UPDATE SET
                  name = EXCLUDED.name,
                  email = EXCLUDED.email,
                  role = EXCLUDED.role,
                  department = EXCLUDED.department,
                  profile_image = COALESCE(EXCLUDED.profile_image, profiles.profile_image),
                  updated_at = now()",
        )
        .bind(profile.id)
        .bind(&profile.name)
        .bind(&profile.email)
        .bind(&profile.role)
        .bind(&profile.department)
        .bind(&profile.profile_image)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, ProfileError> {
        let rows = sqlx::query(
            "SELECT id, name, email, role, department, profile_image FROM profiles ORDER BY name, email",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(profile_from_row).collect())
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<Profile, ProfileError> {
        let row = sqlx::query(
            r"UPDATE profiles SET
                  name = COALESCE($2, name),
                  role = COALESCE($3, role),
                  department = COALESCE($4, department),
                  updated_at = now()
              WHERE id = $1
              RETURNING id, name, email, role, department, profile_image",
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.role)
        .bind(&update.department)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ProfileError::NotFound(id))?;
        Ok(profile_from_row(&row))
    }
}

#[cfg(test)]
#[path = "profile_test.rs"]
mod tests;
