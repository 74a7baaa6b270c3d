//! SQLite implementation of [`UserStore`] and [`RequestStore`].
//!
//! Migrations are embedded at compile time by `sqlx::migrate!` and run on
//! every connect. Queries use the runtime-checked `sqlx::query` form so no
//! `DATABASE_URL` is needed to build.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use super::{RequestStore, UserStore, decode_time, encode_time};
use crate::i18n::Language;
use crate::model::{RequestRecord, RequestStatus, Role, User, UserProfile};

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

type UserRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    bool,
    Option<String>,
    String,
    String,
    String,
    Option<String>,
);

const USER_COLUMNS: &str = "id, first_name, last_name, username, language, is_telegram_premium, \
     premium_expires_at, role, created_at, updated_at, last_active_at";

impl SqliteStore {
    /// Open (or create) the database at `url` and run pending migrations.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::migrated(pool).await
    }

    /// A private in-memory database. All queries share one connection, which
    /// is never recycled, so the data lives as long as the store.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Set a user's role and bot-premium expiry.
    #[cfg(test)]
    pub(crate) async fn grant_premium(
        &self,
        id: i64,
        role: Role,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET role = ?1, premium_expires_at = ?2, updated_at = ?3 WHERE id = ?4")
            .bind(role.to_string())
            .bind(expires_at.map(encode_time))
            .bind(encode_time(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn user_from_row(row: UserRow) -> Result<User, sqlx::Error> {
    let (
        id,
        first_name,
        last_name,
        username,
        language,
        is_telegram_premium,
        premium_expires_at,
        role,
        created_at,
        updated_at,
        last_active_at,
    ) = row;

    Ok(User {
        id,
        first_name,
        last_name,
        username,
        // An unknown stored code behaves like an unset language.
        language: language.and_then(|l| Language::from_str(&l).ok()),
        is_telegram_premium,
        premium_expires_at: premium_expires_at.as_deref().map(decode_time).transpose()?,
        role: Role::from_str(&role).unwrap_or_default(),
        created_at: decode_time(&created_at)?,
        updated_at: decode_time(&updated_at)?,
        last_active_at: last_active_at.as_deref().map(decode_time).transpose()?,
    })
}

impl UserStore for SqliteStore {
    async fn get_user(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(user_from_row).transpose()
    }

    async fn upsert_user(&self, profile: &UserProfile, now: DateTime<Utc>) -> Result<User, sqlx::Error> {
        let now = encode_time(now);
        sqlx::query(
            "INSERT INTO users (id, first_name, last_name, username, is_telegram_premium, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) \
             ON CONFLICT (id) DO UPDATE SET \
                 first_name = excluded.first_name, \
                 last_name = excluded.last_name, \
                 username = excluded.username, \
                 is_telegram_premium = excluded.is_telegram_premium, \
                 updated_at = excluded.updated_at",
        )
        .bind(profile.id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.username)
        .bind(profile.is_telegram_premium)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_user(profile.id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    async fn touch_activity(&self, id: i64, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_active_at = ?1 WHERE id = ?2")
            .bind(encode_time(at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_language(&self, id: i64, language: Language) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET language = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(language.to_string())
            .bind(encode_time(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl RequestStore for SqliteStore {
    async fn insert_request(&self, record: RequestRecord) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO downloads (user_id, input, status, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(record.user_id)
        .bind(&record.input)
        .bind(record.status.to_string())
        .bind(encode_time(record.created_at))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn count_requests_since(
        &self,
        user_id: i64,
        status: RequestStatus,
        since: DateTime<Utc>,
    ) -> Result<u32, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM downloads WHERE user_id = ?1 AND status = ?2 AND created_at >= ?3",
        )
        .bind(user_id)
        .bind(status.to_string())
        .bind(encode_time(since))
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}
