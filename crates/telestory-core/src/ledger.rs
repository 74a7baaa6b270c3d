//! Append-only record of completed requests, read back for quota counting.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};

use crate::model::{RequestRecord, RequestStatus};
use crate::store::RequestStore;

/// Start of the UTC calendar day containing `now`.
pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub struct Ledger<S> {
    store: Arc<S>,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<S: RequestStore> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record one completed request. Called once per request, never per item.
    pub async fn record(&self, user_id: i64, input: &str, now: DateTime<Utc>) -> Result<i64, sqlx::Error> {
        let id = self
            .store
            .insert_request(RequestRecord {
                user_id,
                input: input.to_owned(),
                status: RequestStatus::Success,
                created_at: now,
            })
            .await?;
        tracing::debug!(user_id, input, id, "request recorded");
        Ok(id)
    }

    /// Successful requests by `user_id` since UTC midnight.
    pub async fn count_today(&self, user_id: i64, now: DateTime<Utc>) -> Result<u32, sqlx::Error> {
        self.store
            .count_requests_since(user_id, RequestStatus::Success, day_start(now))
            .await
    }
}
