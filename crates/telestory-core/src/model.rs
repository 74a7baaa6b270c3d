use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use crate::i18n::Language;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Premium,
    Admin,
}

/// Profile fields the transport reports with every interaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub is_telegram_premium: bool,
}

/// A row in the `users` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    /// `None` until the user picks a language.
    pub language: Option<Language>,
    pub is_telegram_premium: bool,
    /// Bot premium subscription end.
    pub premium_expires_at: Option<DateTime<Utc>>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }

    /// Premium users skip the daily quota (the cooldown still applies).
    pub fn is_premium(&self, now: DateTime<Utc>) -> bool {
        matches!(self.role, Role::Premium | Role::Admin)
            || self.premium_expires_at.is_some_and(|until| until > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    Success,
    Failed,
}

/// A row in the `downloads` ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub user_id: i64,
    /// The identifier exactly as the user typed it.
    pub input: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn user(role: Role, premium_expires_at: Option<DateTime<Utc>>) -> User {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        User {
            id: 1,
            first_name: "Ada".to_owned(),
            last_name: String::new(),
            username: "ada".to_owned(),
            language: None,
            is_telegram_premium: false,
            premium_expires_at,
            role,
            created_at: t,
            updated_at: t,
            last_active_at: None,
        }
    }

    #[test]
    fn premium_by_role_or_unexpired_subscription() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        assert!(!user(Role::User, None).is_premium(now));
        assert!(user(Role::Admin, None).is_premium(now));
        assert!(user(Role::Premium, None).is_premium(now));
        assert!(user(Role::User, Some(now + chrono::Duration::days(1))).is_premium(now));
        assert!(!user(Role::User, Some(now - chrono::Duration::days(1))).is_premium(now));
    }

    #[test]
    fn display_name_skips_missing_last_name() {
        assert_eq!(user(Role::User, None).display_name(), "Ada");
        let mut u = user(Role::User, None);
        u.last_name = "Lovelace".to_owned();
        assert_eq!(u.display_name(), "Ada Lovelace");
    }
}
