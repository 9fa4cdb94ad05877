use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use crate::dialogue::{AgeRange, Gender, Position};
use crate::errors::StoreError;
use crate::store::{
    CandidateRecord, CriteriaUpdate, DialogPosition, PreferenceStore, StoreResult, UserName,
    UserProfile,
};

const MAX_POOL_CONNECTIONS: u32 = 10;

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> StoreResult<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            vk_id BIGINT PRIMARY KEY,
            first_name TEXT,
            last_name TEXT,
            age_from INTEGER,
            age_to INTEGER,
            target_gender SMALLINT,
            city_id BIGINT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_positions (
            vk_id BIGINT PRIMARY KEY REFERENCES users(vk_id) ON DELETE CASCADE,
            position SMALLINT NOT NULL DEFAULT 1,
            search_offset INTEGER NOT NULL DEFAULT 0 CHECK (search_offset >= 0)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS candidates (
            id BIGSERIAL PRIMARY KEY,
            vk_id BIGINT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            owner_vk_id BIGINT NOT NULL REFERENCES users(vk_id) ON DELETE CASCADE
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_candidates_owner ON candidates(owner_vk_id, id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS favorites (
            id BIGSERIAL PRIMARY KEY,
            vk_id BIGINT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            owner_vk_id BIGINT NOT NULL REFERENCES users(vk_id) ON DELETE CASCADE,
            UNIQUE (owner_vk_id, vk_id)
        )",
    )
    .execute(pool)
    .await?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Postgres-backed [`PreferenceStore`]
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to Postgres and make sure the schema exists
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .connect(database_url)
            .await?;
        init_database_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

type ProfileRow = (
    i64,
    Option<String>,
    Option<String>,
    Option<i32>,
    Option<i32>,
    Option<i16>,
    Option<i64>,
);

fn profile_from_row(row: ProfileRow) -> UserProfile {
    let (user_id, first_name, last_name, age_from, age_to, gender, city_id) = row;
    UserProfile {
        user_id,
        first_name,
        last_name,
        age_range: age_from
            .zip(age_to)
            .map(|(min, max)| AgeRange { min, max }),
        gender: gender.and_then(Gender::from_code),
        city_id,
    }
}

fn candidate_from_row(row: (i64, String, String)) -> CandidateRecord {
    CandidateRecord {
        candidate_id: row.0,
        first_name: row.1,
        last_name: row.2,
    }
}

#[async_trait]
impl PreferenceStore for PgStore {
    async fn create_profile(&self, user_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("INSERT INTO users (vk_id) VALUES ($1) ON CONFLICT (vk_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        let created = result.rows_affected() > 0;
        debug!(user_id, created, "Profile creation requested");
        Ok(created)
    }

    async fn get_profile(&self, user_id: i64) -> StoreResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT vk_id, first_name, last_name, age_from, age_to, target_gender, city_id
             FROM users WHERE vk_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(profile_from_row))
    }

    async fn set_name(&self, user_id: i64, name: &UserName) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET first_name = $1, last_name = $2 WHERE vk_id = $3")
            .bind(&name.first_name)
            .bind(&name.last_name)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "profile",
                user_id,
            });
        }
        Ok(())
    }

    async fn update_criteria(&self, user_id: i64, update: CriteriaUpdate) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let query = match update {
            CriteriaUpdate::City(city_id) => {
                sqlx::query("UPDATE users SET city_id = $1 WHERE vk_id = $2").bind(city_id)
            }
            CriteriaUpdate::AgeRange(range) => {
                sqlx::query("UPDATE users SET age_from = $1, age_to = $2 WHERE vk_id = $3")
                    .bind(range.min)
                    .bind(range.max)
            }
            CriteriaUpdate::Gender(gender) => {
                sqlx::query("UPDATE users SET target_gender = $1 WHERE vk_id = $2")
                    .bind(gender.code())
            }
        };
        let result = query.bind(user_id).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "profile",
                user_id,
            });
        }

        sqlx::query("UPDATE user_positions SET search_offset = 0 WHERE vk_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(user_id, update = ?update, "Search criteria updated, offset reset");
        Ok(())
    }

    async fn register_position(&self, user_id: i64) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO user_positions (vk_id, position, search_offset) VALUES ($1, $2, 0)
             ON CONFLICT (vk_id) DO UPDATE SET position = EXCLUDED.position",
        )
        .bind(user_id)
        .bind(Position::AwaitingStart.code())
        .execute(&self.pool)
        .await?;

        debug!(user_id, "Dialogue position registered");
        Ok(())
    }

    async fn get_position(&self, user_id: i64) -> StoreResult<Option<DialogPosition>> {
        let row = sqlx::query_as::<_, (i16, i32)>(
            "SELECT position, search_offset FROM user_positions WHERE vk_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((code, offset)) => {
                let position = Position::from_code(code).ok_or(StoreError::InvalidPosition(code))?;
                Ok(Some(DialogPosition {
                    user_id,
                    position,
                    offset,
                }))
            }
            None => Ok(None),
        }
    }

    async fn set_position(&self, user_id: i64, position: Position) -> StoreResult<()> {
        sqlx::query("UPDATE user_positions SET position = $1 WHERE vk_id = $2")
            .bind(position.code())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_offset(&self, user_id: i64, offset: i32) -> StoreResult<()> {
        sqlx::query("UPDATE user_positions SET search_offset = $1 WHERE vk_id = $2")
            .bind(offset)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn restart(&self, user_id: i64, position: Position) -> StoreResult<()> {
        sqlx::query("UPDATE user_positions SET position = $1, search_offset = 0 WHERE vk_id = $2")
            .bind(position.code())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_candidate(&self, owner_id: i64, candidate: &CandidateRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO candidates (vk_id, first_name, last_name, owner_vk_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(candidate.candidate_id)
        .bind(&candidate.first_name)
        .bind(&candidate.last_name)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        debug!(user_id = owner_id, candidate_id = candidate.candidate_id, "Candidate logged");
        Ok(())
    }

    async fn latest_candidate(&self, owner_id: i64) -> StoreResult<Option<CandidateRecord>> {
        let row = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT vk_id, first_name, last_name FROM candidates
             WHERE owner_vk_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(candidate_from_row))
    }

    async fn avoid_list(&self, owner_id: i64) -> StoreResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT vk_id FROM candidates WHERE owner_vk_id = $1")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn add_favorite(&self, owner_id: i64, candidate: &CandidateRecord) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO favorites (vk_id, first_name, last_name, owner_vk_id) VALUES ($1, $2, $3, $4)
             ON CONFLICT (owner_vk_id, vk_id) DO NOTHING",
        )
        .bind(candidate.candidate_id)
        .bind(&candidate.first_name)
        .bind(&candidate.last_name)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_favorite(&self, owner_id: i64, candidate_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM favorites WHERE owner_vk_id = $1 AND vk_id = $2")
            .bind(owner_id)
            .bind(candidate_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn favorites(&self, owner_id: i64) -> StoreResult<Vec<CandidateRecord>> {
        let rows = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT vk_id, first_name, last_name FROM favorites WHERE owner_vk_id = $1 ORDER BY id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(candidate_from_row).collect())
    }

    async fn favorite_ids(&self, owner_id: i64) -> StoreResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT vk_id FROM favorites WHERE owner_vk_id = $1 ORDER BY id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
