use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::i18n::Language;
use crate::model::{User, UserProfile};
use crate::store::UserStore;

/// Registration and preference updates for bot users.
pub struct UserService<S> {
    store: Arc<S>,
}

impl<S> Clone for UserService<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<S: UserStore> UserService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Upsert the profile reported with an interaction and return the stored user.
    pub async fn register(&self, profile: &UserProfile, now: DateTime<Utc>) -> Result<User, sqlx::Error> {
        let user = self.store.upsert_user(profile, now).await?;
        if user.created_at == now {
            info!(user_id = user.id, username = %user.username, "new user registered");
        } else {
            debug!(user_id = user.id, "user profile refreshed");
        }
        Ok(user)
    }

    pub async fn record_activity(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        self.store.touch_activity(user_id, at).await
    }

    pub async fn update_language(&self, user_id: i64, language: Language) -> Result<(), sqlx::Error> {
        self.store.set_language(user_id, language).await?;
        info!(user_id, %language, "language updated");
        Ok(())
    }
}
