//! Database abstraction layer.
//!
//! [`UserStore`] and [`RequestStore`] are everything the engine needs from
//! persistence; it never issues SQL itself. The default implementation is
//! [`sqlite::SqliteStore`].
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required.

pub mod sqlite;

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::i18n::Language;
use crate::model::{RequestRecord, RequestStatus, User, UserProfile};

pub use sqlite::SqliteStore;

pub trait UserStore: Send + Sync + 'static {
    fn get_user(&self, id: i64) -> impl Future<Output = Result<Option<User>, sqlx::Error>> + Send;

    /// Insert the user or refresh their profile fields.
    ///
    /// Language, role, premium expiry and last activity are never touched by
    /// an upsert.
    fn upsert_user(
        &self,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<User, sqlx::Error>> + Send;

    fn touch_activity(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn set_language(
        &self,
        id: i64,
        language: Language,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

pub trait RequestStore: Send + Sync + 'static {
    /// Append one ledger row, returning its id.
    fn insert_request(
        &self,
        record: RequestRecord,
    ) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;

    /// Count `user_id`'s rows with `status` created at or after `since`.
    fn count_requests_since(
        &self,
        user_id: i64,
        status: RequestStatus,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<u32, sqlx::Error>> + Send;
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub(crate) fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_time(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
